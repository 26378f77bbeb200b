//! Per-checksum writer exclusion
//!
//! Two layers: a keyed async mutex serializes tasks in this process, and an
//! advisory lock file serializes separate staging processes sharing one
//! cache directory.

use crate::error::{NodepackError, NodepackResult};
use fs4::fs_std::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// In-process map of per-key async mutexes
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    /// Wait for exclusive ownership of `key`.
    /// Other keys are never blocked.
    pub(crate) async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Drop mutexes nobody holds or waits on
            map.retain(|_, m| Arc::strong_count(m) > 1);
            map.entry(key.to_string()).or_default().clone()
        };
        mutex.lock_owned().await
    }
}

/// Exclusive advisory lock on `locks/<checksum>.lock`, released on drop
#[derive(Debug)]
pub(crate) struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block (on the blocking pool) until the lock file is ours
    pub(crate) async fn acquire(path: &Path) -> NodepackResult<Self> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> NodepackResult<Self> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    NodepackError::io(format!("creating lock directory {}", parent.display()), e)
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|e| NodepackError::io(format!("opening lock {}", path.display()), e))?;
            file.lock_exclusive()
                .map_err(|e| NodepackError::io(format!("locking {}", path.display()), e))?;
            Ok(Self { _file: file, path })
        })
        .await
        .map_err(|e| NodepackError::Internal(format!("lock task failed: {e}")))?
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::default());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("abc").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::default();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_secs(1), locks.acquire("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_keys_are_pruned() {
        let locks = KeyedLocks::default();
        drop(locks.acquire("a").await);
        drop(locks.acquire("b").await);
        let len = locks.inner.lock().unwrap().len();
        assert_eq!(len, 1);
    }

    #[tokio::test]
    async fn file_lock_creates_lock_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("locks").join("abc.lock");
        let lock = FileLock::acquire(&path).await.unwrap();
        assert!(lock.path().exists());
        drop(lock);

        // Re-acquirable once released
        FileLock::acquire(&path).await.unwrap();
    }
}
