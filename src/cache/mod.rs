//! Shared artifact cache
//!
//! Provides content-addressed storage for downloaded runtime and
//! package-manager artifacts, keyed by their sha256 checksum rather than
//! their locator. Entries are immutable once published.
//!
//! # Concurrency Model
//!
//! - Writers for one checksum are serialized by an in-process keyed mutex
//!   and a cross-process lock file (`locks/<checksum>.lock`)
//! - Downloads land in `tmp/` and are renamed into `objects/` only after the
//!   checksum verifies, so readers never observe partial artifacts
//! - Readers of published entries take no locks
//!
//! # Entry States
//!
//! | State | On disk | Description |
//! |-------|---------|-------------|
//! | Absent | nothing | Never fetched, or a previous download failed |
//! | Downloading | `tmp/<checksum>.<id>.partial` | In flight or crashed |
//! | Present | `objects/<xx>/<checksum>` | Verified and immutable |

pub mod download;
pub mod entry;
mod lock;
pub mod store;

pub use download::{Downloader, HttpDownloader};
pub use entry::{format_bytes, CacheEntry, CacheState};
pub use store::{ArtifactCache, FetchOutcome, FetchPolicy, FetchSource};

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

/// Whether `checksum` is a lowercase hex sha256 digest
pub fn is_valid_checksum(checksum: &str) -> bool {
    checksum.len() == 64
        && checksum
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Stream a file through sha256, returning the lowercase hex digest
pub(crate) fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
