//! Cache entry state
//!
//! Tracks the lifecycle of one content-addressed artifact
//! (absent, downloading, present).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// State of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Nothing published for this checksum
    Absent,
    /// A temp file exists; a download is in flight or crashed
    Downloading,
    /// Verified and immutable
    Present,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Downloading => write!(f, "downloading"),
            Self::Present => write!(f, "present"),
        }
    }
}

/// Information about one cached artifact
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    /// sha256 checksum (the cache key)
    pub checksum: String,
    /// Canonical path of the published artifact
    pub path: PathBuf,
    /// Size in bytes (0 unless present)
    pub size: u64,
    /// Current state
    pub state: CacheState,
    /// When the artifact was published
    pub modified: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Short checksum prefix for display
    pub fn short_checksum(&self) -> &str {
        &self.checksum[..self.checksum.len().min(12)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn state_display() {
        assert_eq!(CacheState::Present.to_string(), "present");
        assert_eq!(CacheState::Downloading.to_string(), "downloading");
    }

    #[test]
    fn short_checksum() {
        let entry = CacheEntry {
            checksum: "ab".repeat(32),
            path: PathBuf::from("/cache/objects/ab/abab"),
            size: 10,
            state: CacheState::Present,
            modified: Some(Utc::now()),
        };
        assert_eq!(entry.short_checksum(), "abababababab");
    }
}
