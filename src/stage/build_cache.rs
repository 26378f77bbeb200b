//! Directories carried between builds through the staging cache dir
//!
//! Package-manager caches (`.npm`, `.cache/yarn`) are kept by default; an
//! app can replace the list with `cacheDirectories` in `package.json`.

use crate::deps::vendored::copy_dir;
use crate::error::{NodepackError, NodepackResult};
use std::fs;
use std::path::{Component, Path};
use tracing::{debug, warn};

/// Used when `package.json` lists no `cacheDirectories`
pub const DEFAULT_CACHE_DIRS: [&str; 3] = [".npm", ".cache/yarn", "bower_components"];

/// Subdirectory of the staging cache dir holding carried directories
const CACHE_SUBDIR: &str = "node";

/// Which directories to carry and where the list came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDirs {
    pub dirs: Vec<String>,
    /// `package.json` or `default`
    pub source: &'static str,
}

impl CacheDirs {
    pub fn from_package(declared: &[String]) -> Self {
        let dirs: Vec<String> = declared
            .iter()
            .filter(|d| is_carryable(d))
            .cloned()
            .collect();
        if dirs.is_empty() {
            Self {
                dirs: DEFAULT_CACHE_DIRS.iter().map(|d| d.to_string()).collect(),
                source: "default",
            }
        } else {
            Self {
                dirs,
                source: "package.json",
            }
        }
    }

    /// Copy cached directories into the app where the app has none.
    /// Returns the directories restored.
    pub fn restore(&self, cache_dir: &Path, build_dir: &Path) -> NodepackResult<Vec<String>> {
        let root = cache_dir.join(CACHE_SUBDIR);
        let mut restored = Vec::new();
        for dir in &self.dirs {
            let cached = root.join(dir);
            let target = build_dir.join(dir);
            if !cached.is_dir() || target.exists() {
                continue;
            }
            copy_dir(&cached, &target)?;
            restored.push(dir.clone());
        }
        debug!("Restored {} cached directories", restored.len());
        Ok(restored)
    }

    /// Replace the cached copies with the app's current directories.
    /// Returns the directories saved.
    pub fn save(&self, build_dir: &Path, cache_dir: &Path) -> NodepackResult<Vec<String>> {
        let root = cache_dir.join(CACHE_SUBDIR);
        if root.exists() {
            fs::remove_dir_all(&root)
                .map_err(|e| NodepackError::io(format!("clearing {}", root.display()), e))?;
        }

        let mut saved = Vec::new();
        for dir in &self.dirs {
            let source = build_dir.join(dir);
            if !source.is_dir() {
                continue;
            }
            copy_dir(&source, &root.join(dir))?;
            saved.push(dir.clone());
        }
        Ok(saved)
    }
}

/// Relative, non-escaping, and not `node_modules`
fn is_carryable(dir: &str) -> bool {
    let path = Path::new(dir);
    let safe = !dir.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        warn!("Ignoring cache directory '{}'", dir);
        return false;
    }
    // Restored modules would be indistinguishable from vendored ones
    match path.components().find(|c| *c != Component::CurDir) {
        Some(first) => first != Component::Normal("node_modules".as_ref()),
        None => {
            warn!("Ignoring cache directory '{}'", dir);
            false
        }
    }
}
