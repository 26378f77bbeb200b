//! Scanner for dependencies vendored into the app's `node_modules`

use crate::catalog::Constraint;
use crate::error::{NodepackError, NodepackResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const NODE_MODULES: &str = "node_modules";

#[derive(Debug, Deserialize)]
struct InstalledManifest {
    name: Option<String>,
    version: Option<String>,
}

/// Top-level packages present in a `node_modules` directory
#[derive(Debug, Clone, Default)]
pub struct VendoredTree {
    root: PathBuf,
    packages: BTreeMap<String, String>,
}

impl VendoredTree {
    /// Scan `<dir>/node_modules`, including `@scope/` directories.
    /// A missing directory is an empty tree.
    pub fn scan(dir: &Path) -> NodepackResult<Self> {
        let root = dir.join(NODE_MODULES);
        let mut packages = BTreeMap::new();

        for entry in package_dirs(&root)? {
            let manifest_path = entry.join("package.json");
            let content = match fs::read_to_string(&manifest_path) {
                Ok(c) => c,
                Err(_) => continue,
            };
            let manifest: InstalledManifest = match serde_json::from_str(&content) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Ignoring unreadable {}: {}", manifest_path.display(), e);
                    continue;
                }
            };

            let name = manifest
                .name
                .unwrap_or_else(|| dir_package_name(&root, &entry));
            packages.insert(name, manifest.version.unwrap_or_default());
        }

        debug!("Found {} packages in {}", packages.len(), root.display());
        Ok(Self { root, packages })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Installed version of `name`, if present
    pub fn version(&self, name: &str) -> Option<&str> {
        self.packages.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// Whether `name` is present at a version satisfying `range`.
    ///
    /// Specifiers that are not semver ranges (git URLs, tarballs, `file:`
    /// paths, dist-tags) are satisfied by any installed version.
    pub fn satisfies(&self, name: &str, range: &str) -> bool {
        let Some(installed) = self.version(name) else {
            return false;
        };
        let Ok(constraint) = Constraint::parse(name, range) else {
            return true;
        };
        match semver::Version::parse(installed.trim_start_matches('v')) {
            Ok(version) => constraint.matches(&version),
            Err(_) => false,
        }
    }
}

/// Package directories under `root`: `name/` and `@scope/name/`
fn package_dirs(root: &Path) -> NodepackResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for path in subdirs(root)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if name.starts_with('@') {
            dirs.extend(subdirs(&path)?);
        } else {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

fn subdirs(dir: &Path) -> NodepackResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(NodepackError::io(format!("reading {}", dir.display()), e)),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| NodepackError::io(format!("reading {}", dir.display()), e))?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_package_name(root: &Path, dir: &Path) -> String {
    dir.strip_prefix(root)
        .unwrap_or(dir)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Recursive copy that recreates symlinks instead of following them
pub(crate) fn copy_dir(from: &Path, to: &Path) -> NodepackResult<()> {
    let wrap = |e: std::io::Error| {
        NodepackError::io(format!("copying {} to {}", from.display(), to.display()), e)
    };

    fs::create_dir_all(to).map_err(wrap)?;
    for entry in fs::read_dir(from).map_err(wrap)? {
        let entry = entry.map_err(wrap)?;
        let file_type = entry.file_type().map_err(wrap)?;
        let target = to.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            #[cfg(unix)]
            {
                let link = fs::read_link(entry.path()).map_err(wrap)?;
                std::os::unix::fs::symlink(link, &target).map_err(wrap)?;
            }
        } else {
            fs::copy(entry.path(), &target).map_err(wrap)?;
        }
    }
    Ok(())
}
