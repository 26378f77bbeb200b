//! CLI command implementations

pub mod cache;
pub mod config;
pub mod resolve;
pub mod stage;

pub use cache::execute as cache;
pub use config::execute as config;
pub use resolve::execute as resolve;
pub use stage::execute as stage;

use crate::catalog::Catalog;
use crate::config::{Config, ConfigManager};
use crate::error::NodepackResult;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Catalog from `--catalog`, then `catalog.path`, then the buildpack root
pub(crate) async fn load_catalog(flag: Option<&Path>, config: &Config) -> NodepackResult<Catalog> {
    let path = flag
        .map(Path::to_path_buf)
        .or_else(|| config.catalog.path.clone())
        .unwrap_or_else(ConfigManager::default_catalog_path);
    let catalog = Catalog::from_file(&path).await?;
    debug!("Loaded {} catalog from {}", catalog.language(), path.display());
    Ok(catalog)
}

/// Artifact cache root from `--artifact-dir`, then `cache.dir`, then `fallback`
pub(crate) fn artifact_root(flag: Option<PathBuf>, config: &Config, fallback: PathBuf) -> PathBuf {
    flag.or_else(|| config.cache.dir.clone()).unwrap_or(fallback)
}
