//! Dependency reconciliation
//!
//! Reads the app's `package.json`, lockfile and vendored `node_modules`, then
//! installs whatever the vendored tree does not already provide.

pub mod installer;
pub mod lockfile;
pub mod package_json;
pub mod reconcile;
pub mod vendored;

pub use installer::{CommandInstaller, InstallMode, InstallRequest, Installer, ToolEnv};
pub use lockfile::{LockedPackage, Lockfile, PackageManager};
pub use package_json::PackageJson;
pub use reconcile::{ReconcileEvent, ReconcileReport, ReconcileRequest, Reconciler, OFFLINE_MIRROR};
pub use vendored::VendoredTree;
