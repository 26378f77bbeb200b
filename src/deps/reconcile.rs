//! Merge vendored and declared dependencies into one complete tree
//!
//! Packages the app ships in `node_modules` are kept as shipped unless the
//! manifest declares them at a version they do not satisfy. Anything missing
//! or mismatched is installed into a scratch directory inside the app; the
//! mismatched entries are replaced and the rest of the scratch tree is moved
//! across only where the app tree has nothing by that name.

use crate::cache::FetchPolicy;
use crate::deps::installer::{InstallMode, InstallRequest, Installer, ToolEnv};
use crate::deps::lockfile::{Lockfile, PackageManager};
use crate::deps::vendored::{copy_dir, VendoredTree, NODE_MODULES};
use crate::error::{NodepackError, NodepackResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Yarn offline mirror directory shipped with the app
pub const OFFLINE_MIRROR: &str = "npm-packages-offline-cache";

const SCRATCH_PREFIX: &str = ".nodepack-scratch-";

/// Something the user should see about dependency reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// The lockfile was generated for a different manifest
    LockfileOutdated {
        lockfile: String,
        drift: Vec<String>,
    },
    LockfileMatches {
        lockfile: String,
    },
    /// Nothing needs installing; `count` declared dependencies are vendored
    VendoredSatisfied {
        count: usize,
    },
    /// Vendored at a version outside the declared range; replaced by the install
    VendoredMismatch {
        name: String,
        installed: String,
        range: String,
    },
    InstallMode {
        manager: PackageManager,
        mode: InstallMode,
        source: String,
    },
    Installed {
        packages: Vec<String>,
    },
    /// A fresh install happened and nothing was vendored
    VendoringAdvisory,
}

/// Outcome of a successful reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub manager: PackageManager,
    /// Mode of the install that ran; `None` when nothing was installed
    pub mode: Option<InstallMode>,
    /// Packages moved into the app's `node_modules`
    pub installed: Vec<String>,
    /// Number of packages the app shipped with
    pub vendored: usize,
    pub events: Vec<ReconcileEvent>,
}

impl ReconcileReport {
    pub fn install_ran(&self) -> bool {
        self.mode.is_some()
    }
}

/// Inputs for one reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileRequest<'a> {
    pub app_dir: &'a Path,
    /// `dependencies` from `package.json`
    pub declared: &'a BTreeMap<String, String>,
    pub manager: PackageManager,
    pub policy: FetchPolicy,
    pub tools: ToolEnv,
}

pub struct Reconciler {
    installer: Arc<dyn Installer>,
}

impl Reconciler {
    pub fn new(installer: Arc<dyn Installer>) -> Self {
        Self { installer }
    }

    pub async fn reconcile(&self, request: ReconcileRequest<'_>) -> NodepackResult<ReconcileReport> {
        let app_dir = request.app_dir;
        let manager = request.manager;
        let mut events = Vec::new();

        let vendored = VendoredTree::scan(app_dir)?;
        let lockfile = Lockfile::load(app_dir)?.filter(|l| {
            let usable = l.manager == manager;
            if !usable {
                debug!("Ignoring {} for {}", l.file_name(), manager);
            }
            usable
        });

        if let Some(ref lockfile) = lockfile {
            let drift = lockfile.drift(request.declared);
            if drift.is_empty() {
                events.push(ReconcileEvent::LockfileMatches {
                    lockfile: lockfile.file_name(),
                });
            } else {
                warn!("{} is outdated: {}", lockfile.file_name(), drift.join(", "));
                events.push(ReconcileEvent::LockfileOutdated {
                    lockfile: lockfile.file_name(),
                    drift,
                });
            }
        }

        debug!(
            "Vendored packages: {}",
            vendored.names().collect::<Vec<_>>().join(", ")
        );
        let mut missing = BTreeMap::new();
        let mut replace = BTreeSet::new();
        let mut satisfied = 0;
        for (name, range) in request.declared {
            if vendored.satisfies(name, range) {
                satisfied += 1;
                continue;
            }
            if let Some(installed) = vendored.version(name) {
                warn!("Vendored {}@{} does not satisfy {}", name, installed, range);
                events.push(ReconcileEvent::VendoredMismatch {
                    name: name.clone(),
                    installed: installed.to_string(),
                    range: range.clone(),
                });
                replace.insert(name.clone());
            }
            missing.insert(name.clone(), range.clone());
        }

        if missing.is_empty() {
            debug!("{} declared dependencies satisfied by vendoring", satisfied);
            events.push(ReconcileEvent::VendoredSatisfied { count: satisfied });
            return Ok(ReconcileReport {
                manager,
                mode: None,
                installed: Vec::new(),
                vendored: vendored.len(),
                events,
            });
        }

        let (mode, offline_mirror) = install_mode(app_dir, lockfile.as_ref());
        if mode == InstallMode::Online && request.policy == FetchPolicy::AirGapped {
            return Err(NodepackError::NetworkUnavailable {
                manager: manager.to_string(),
            });
        }
        events.push(ReconcileEvent::InstallMode {
            manager,
            mode,
            source: lockfile
                .as_ref()
                .map(|l| format!("package.json + {}", l.file_name()))
                .unwrap_or_else(|| "package.json".to_string()),
        });

        info!(
            "Installing {} missing packages with {} ({} mode)",
            missing.len(),
            manager,
            mode
        );
        let scratch = ScratchDir::create(app_dir, &missing, lockfile.as_ref())?;
        self.installer
            .install(&InstallRequest {
                manager,
                app_dir: app_dir.to_path_buf(),
                work_dir: scratch.path().to_path_buf(),
                mode,
                offline_mirror,
                tools: request.tools.clone(),
            })
            .await?;

        let installed = merge_installed(
            &scratch.path().join(NODE_MODULES),
            vendored.root(),
            &replace,
        )?;
        drop(scratch);

        let tree = VendoredTree::scan(app_dir)?;
        let incomplete: Vec<String> = request
            .declared
            .keys()
            .filter(|name| {
                !tree.contains(name) || (replace.contains(*name) && !installed.contains(*name))
            })
            .cloned()
            .collect();
        if !incomplete.is_empty() {
            return Err(NodepackError::IncompleteInstall {
                missing: incomplete,
            });
        }

        events.push(ReconcileEvent::Installed {
            packages: installed.clone(),
        });
        if vendored.is_empty() {
            events.push(ReconcileEvent::VendoringAdvisory);
        }

        Ok(ReconcileReport {
            manager,
            mode: Some(mode),
            installed,
            vendored: vendored.len(),
            events,
        })
    }
}

/// Offline when a yarn lockfile pins everything and the app's mirror holds
/// every pinned tarball
fn install_mode(app_dir: &Path, lockfile: Option<&Lockfile>) -> (InstallMode, Option<PathBuf>) {
    let mirror = app_dir.join(OFFLINE_MIRROR);
    let Some(lockfile) = lockfile else {
        return (InstallMode::Online, None);
    };
    if lockfile.manager != PackageManager::Yarn || !mirror.is_dir() || !lockfile.is_fully_pinned() {
        return (InstallMode::Online, None);
    }

    let absent: Vec<&str> = lockfile
        .packages
        .iter()
        .filter(|p| {
            !mirror.join(p.mirror_file_name()).is_file()
                && !p
                    .resolved_file_name()
                    .is_some_and(|f| mirror.join(f).is_file())
        })
        .map(|p| p.name.as_str())
        .collect();
    if !absent.is_empty() {
        debug!("Offline mirror is missing: {}", absent.join(", "));
        return (InstallMode::Online, None);
    }

    (InstallMode::Offline, Some(mirror))
}

/// Scratch install prefix, removed on drop
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(
        app_dir: &Path,
        dependencies: &BTreeMap<String, String>,
        lockfile: Option<&Lockfile>,
    ) -> NodepackResult<Self> {
        let path = app_dir.join(format!("{SCRATCH_PREFIX}{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&path)
            .map_err(|e| NodepackError::io(format!("creating {}", path.display()), e))?;
        let scratch = Self { path };

        let manifest = serde_json::json!({
            "name": "nodepack-scratch",
            "private": true,
            "dependencies": dependencies,
        });
        let manifest_path = scratch.path.join("package.json");
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
            .map_err(|e| NodepackError::io(format!("writing {}", manifest_path.display()), e))?;

        let mut carried: Vec<PathBuf> = vec![app_dir.join(".yarnrc")];
        if let Some(lockfile) = lockfile {
            carried.push(lockfile.path.clone());
        }
        for source in carried.into_iter().filter(|p| p.is_file()) {
            if let Some(name) = source.file_name() {
                let target = scratch.path.join(name);
                fs::copy(&source, &target).map_err(|e| {
                    NodepackError::io(format!("copying {}", source.display()), e)
                })?;
            }
        }

        Ok(scratch)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

/// Move the scratch install's packages from `from` into `into`.
///
/// Names in `replace` take the place of the app's copy. Other names already
/// taken in `into` stay as shipped; the scratch copy is nested under each
/// moved package that depends on it so those resolve the version the package
/// manager chose. Returns the moved package names.
fn merge_installed(
    from: &Path,
    into: &Path,
    replace: &BTreeSet<String>,
) -> NodepackResult<Vec<String>> {
    let mut moved = Vec::new();
    if !from.is_dir() {
        return Ok(moved);
    }

    let mut taken = Vec::new();
    for path in sorted_children(from)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if name == ".bin" {
            // Bin links are relative (`../pkg/bin/x`) and stay valid after the move
            move_absent_children(&path, &into.join(".bin"))?;
            continue;
        }
        if name.starts_with('.') {
            continue;
        }

        let packages = if name.starts_with('@') {
            scoped_packages(&name, &path)?
        } else {
            vec![(name, path)]
        };
        for (package, source) in packages {
            let target = into.join(&package);
            if replace.contains(&package) {
                remove_entry(&target)?;
            }
            if move_if_absent(&source, &target)? {
                moved.push(package);
            } else {
                taken.push((package, source));
            }
        }
    }

    for (package, source) in taken {
        nest_under_dependents(&package, &source, into, &moved)?;
    }

    Ok(moved)
}

fn scoped_packages(scope: &str, dir: &Path) -> NodepackResult<Vec<(String, PathBuf)>> {
    Ok(sorted_children(dir)?
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            Some((format!("{scope}/{name}"), path))
        })
        .collect())
}

fn nest_under_dependents(
    package: &str,
    source: &Path,
    into: &Path,
    moved: &[String],
) -> NodepackResult<()> {
    let dependents: Vec<&String> = moved
        .iter()
        .filter(|m| depends_on(&into.join(m.as_str()), package))
        .collect();
    if dependents.is_empty() {
        debug!("Keeping vendored {}; nothing installed depends on it", package);
        return Ok(());
    }

    for dependent in dependents {
        let target = into.join(dependent.as_str()).join(NODE_MODULES).join(package);
        if fs::symlink_metadata(&target).is_ok() {
            continue;
        }
        debug!("Nesting {} under {}", package, dependent);
        copy_dir(source, &target)?;
    }
    Ok(())
}

/// Whether the package at `dir` lists `name` among its runtime dependencies
fn depends_on(dir: &Path, name: &str) -> bool {
    let Ok(content) = fs::read_to_string(dir.join("package.json")) else {
        return false;
    };
    let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&content) else {
        return false;
    };
    ["dependencies", "optionalDependencies"].iter().any(|field| {
        manifest
            .get(field)
            .and_then(serde_json::Value::as_object)
            .is_some_and(|deps| deps.contains_key(name))
    })
}

fn remove_entry(path: &Path) -> NodepackResult<()> {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return Ok(());
    };
    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| NodepackError::io(format!("removing {}", path.display()), e))
}

fn move_absent_children(from: &Path, into: &Path) -> NodepackResult<Vec<String>> {
    let mut moved = Vec::new();
    for path in sorted_children(from)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if move_if_absent(&path, &into.join(&name))? {
            moved.push(name);
        }
    }
    Ok(moved)
}

fn move_if_absent(from: &Path, to: &Path) -> NodepackResult<bool> {
    if fs::symlink_metadata(to).is_ok() {
        return Ok(false);
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| NodepackError::io(format!("creating {}", parent.display()), e))?;
    }
    fs::rename(from, to).map_err(|e| {
        NodepackError::io(format!("moving {} -> {}", from.display(), to.display()), e)
    })?;
    Ok(true)
}

fn sorted_children(dir: &Path) -> NodepackResult<Vec<PathBuf>> {
    let mut children = Vec::new();
    let entries =
        fs::read_dir(dir).map_err(|e| NodepackError::io(format!("reading {}", dir.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| NodepackError::io(format!("reading {}", dir.display()), e))?;
        children.push(entry.path());
    }
    children.sort();
    Ok(children)
}
