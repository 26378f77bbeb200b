//! Content-addressed artifact store
//!
//! Layout under the cache root:
//!
//! ```text
//! objects/<xx>/<checksum>        published, immutable artifacts
//! tmp/<checksum>.<id>.partial    downloads in flight (or crashed)
//! locks/<checksum>.lock          cross-process writer locks
//! ```

use crate::cache::entry::{CacheEntry, CacheState};
use crate::cache::lock::{FileLock, KeyedLocks};
use crate::cache::{is_valid_checksum, sha256_file, Downloader};
use crate::error::{NodepackError, NodepackResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const OBJECTS_DIR: &str = "objects";
const TMP_DIR: &str = "tmp";
const LOCKS_DIR: &str = "locks";
const PARTIAL_EXT: &str = "partial";

/// Whether a cache miss may go to the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    NetworkAllowed,
    /// Never open a socket; a miss is an error
    AirGapped,
}

impl FetchPolicy {
    pub fn from_air_gapped(air_gapped: bool) -> Self {
        if air_gapped {
            Self::AirGapped
        } else {
            Self::NetworkAllowed
        }
    }
}

impl fmt::Display for FetchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkAllowed => write!(f, "network-allowed"),
            Self::AirGapped => write!(f, "air-gapped"),
        }
    }
}

/// Where a fetched artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// Already present in the cache
    Reused,
    /// Downloaded and published by this call
    Downloaded,
}

/// Result of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub checksum: String,
    pub path: PathBuf,
    pub size: u64,
    pub source: FetchSource,
}

/// Shared, checksum-keyed artifact cache
pub struct ArtifactCache {
    root: PathBuf,
    downloader: Arc<dyn Downloader>,
    locks: KeyedLocks,
}

impl ArtifactCache {
    /// Create a cache rooted at `root`; directories are created lazily
    pub fn new(root: impl Into<PathBuf>, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            root: root.into(),
            downloader,
            locks: KeyedLocks::default(),
        }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Obtain the artifact with `checksum`, downloading `locator` on a miss
    /// when `policy` allows it.
    pub async fn fetch(
        &self,
        locator: &str,
        checksum: &str,
        policy: FetchPolicy,
    ) -> NodepackResult<FetchOutcome> {
        if !is_valid_checksum(checksum) {
            return Err(NodepackError::InvalidChecksum(checksum.to_string()));
        }

        let object = self.object_path(checksum);
        if let Some(outcome) = self.lookup(checksum, &object).await {
            debug!("Cache hit for {} ({})", locator, &checksum[..12]);
            return Ok(outcome);
        }

        if policy == FetchPolicy::AirGapped {
            return Err(NodepackError::OfflineMiss {
                locator: locator.to_string(),
            });
        }

        if matches!(self.state(checksum).await, Ok(CacheState::Downloading)) {
            debug!("{} is being downloaded by another writer", &checksum[..12]);
        }
        let _task_guard = self.locks.acquire(checksum).await;
        let file_lock = FileLock::acquire(&self.lock_path(checksum)).await?;
        debug!("Holding {}", file_lock.path().display());

        // Another writer may have published while we waited
        if let Some(outcome) = self.lookup(checksum, &object).await {
            debug!("{} was published by another writer", &checksum[..12]);
            return Ok(outcome);
        }

        let tmp = self.tmp_path(checksum);
        let result = self.download_and_publish(locator, checksum, &tmp, &object).await;
        if result.is_err() && fs::try_exists(&tmp).await.unwrap_or(false) {
            if let Err(e) = fs::remove_file(&tmp).await {
                warn!("Failed to remove partial download {}: {}", tmp.display(), e);
            }
        }
        let size = result?;

        Ok(FetchOutcome {
            checksum: checksum.to_string(),
            path: object,
            size,
            source: FetchSource::Downloaded,
        })
    }

    /// Current state of the entry for `checksum`
    pub async fn state(&self, checksum: &str) -> NodepackResult<CacheState> {
        if !is_valid_checksum(checksum) {
            return Err(NodepackError::InvalidChecksum(checksum.to_string()));
        }
        if fs::try_exists(self.object_path(checksum)).await.unwrap_or(false) {
            return Ok(CacheState::Present);
        }

        let prefix = format!("{checksum}.");
        let partials = self.partials().await?;
        if partials.iter().any(|p| file_name(p).starts_with(&prefix)) {
            Ok(CacheState::Downloading)
        } else {
            Ok(CacheState::Absent)
        }
    }

    /// All published entries, sorted by checksum
    pub async fn list(&self) -> NodepackResult<Vec<CacheEntry>> {
        let objects = self.root.join(OBJECTS_DIR);
        let mut entries = Vec::new();

        for shard in read_dir_paths(&objects).await? {
            for path in read_dir_paths(&shard).await? {
                let checksum = file_name(&path).to_string();
                if !is_valid_checksum(&checksum) {
                    continue;
                }
                let meta = fs::metadata(&path)
                    .await
                    .map_err(|e| NodepackError::io(format!("reading {}", path.display()), e))?;
                entries.push(CacheEntry {
                    checksum,
                    path,
                    size: meta.len(),
                    state: CacheState::Present,
                    modified: meta.modified().ok().map(DateTime::<Utc>::from),
                });
            }
        }

        entries.sort_by(|a, b| a.checksum.cmp(&b.checksum));
        Ok(entries)
    }

    /// Remove every published artifact and partial download
    pub async fn clear(&self) -> NodepackResult<usize> {
        let count = self.list().await?.len();
        for dir in [OBJECTS_DIR, TMP_DIR] {
            let path = self.root.join(dir);
            if fs::try_exists(&path).await.unwrap_or(false) {
                fs::remove_dir_all(&path)
                    .await
                    .map_err(|e| NodepackError::io(format!("removing {}", path.display()), e))?;
            }
        }
        Ok(count)
    }

    /// Remove partial downloads older than `grace`, left behind by crashed runs
    pub async fn sweep_partials(&self, grace: Duration) -> NodepackResult<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(grace)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        for path in self.partials().await? {
            let stale = fs::metadata(&path)
                .await
                .and_then(|m| m.modified())
                .map(|modified| modified <= cutoff)
                .unwrap_or(false);
            if stale {
                debug!("Removing stale partial {}", path.display());
                fs::remove_file(&path)
                    .await
                    .map_err(|e| NodepackError::io(format!("removing {}", path.display()), e))?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn lookup(&self, checksum: &str, object: &Path) -> Option<FetchOutcome> {
        let meta = fs::metadata(object).await.ok()?;
        meta.is_file().then(|| FetchOutcome {
            checksum: checksum.to_string(),
            path: object.to_path_buf(),
            size: meta.len(),
            source: FetchSource::Reused,
        })
    }

    async fn download_and_publish(
        &self,
        locator: &str,
        checksum: &str,
        tmp: &Path,
        object: &Path,
    ) -> NodepackResult<u64> {
        for dir in [tmp.parent(), object.parent()].into_iter().flatten() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| NodepackError::io(format!("creating {}", dir.display()), e))?;
        }

        let size = self.downloader.download(locator, tmp).await?;

        let tmp_owned = tmp.to_path_buf();
        let actual = tokio::task::spawn_blocking(move || sha256_file(&tmp_owned))
            .await
            .map_err(|e| NodepackError::Internal(format!("hash task failed: {e}")))?
            .map_err(|e| NodepackError::io(format!("hashing {}", tmp.display()), e))?;

        if actual != checksum {
            return Err(NodepackError::ChecksumMismatch {
                locator: locator.to_string(),
                expected: checksum.to_string(),
                actual,
            });
        }

        fs::rename(tmp, object).await.map_err(|e| {
            NodepackError::io(
                format!("publishing {} -> {}", tmp.display(), object.display()),
                e,
            )
        })?;

        debug!("Published {} ({} bytes)", object.display(), size);
        Ok(size)
    }

    async fn partials(&self) -> NodepackResult<Vec<PathBuf>> {
        Ok(read_dir_paths(&self.root.join(TMP_DIR))
            .await?
            .into_iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == PARTIAL_EXT))
            .collect())
    }

    fn object_path(&self, checksum: &str) -> PathBuf {
        self.root
            .join(OBJECTS_DIR)
            .join(&checksum[..2])
            .join(checksum)
    }

    fn lock_path(&self, checksum: &str) -> PathBuf {
        self.root.join(LOCKS_DIR).join(format!("{checksum}.lock"))
    }

    fn tmp_path(&self, checksum: &str) -> PathBuf {
        self.root
            .join(TMP_DIR)
            .join(format!("{checksum}.{}.{PARTIAL_EXT}", Uuid::new_v4().simple()))
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// List a directory's children; a missing directory is empty
async fn read_dir_paths(dir: &Path) -> NodepackResult<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(NodepackError::io(format!("reading {}", dir.display()), e)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| NodepackError::io(format!("reading {}", dir.display()), e))?
    {
        paths.push(entry.path());
    }
    Ok(paths)
}
