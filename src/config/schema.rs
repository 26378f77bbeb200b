//! Configuration schema for nodepack
//!
//! Configuration is stored at `~/.config/nodepack/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Artifact cache settings
    pub cache: CacheConfig,

    /// HTTP client settings
    pub network: NetworkConfig,

    /// Version catalog settings
    pub catalog: CatalogConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Artifact cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Shared cache directory; the staging cache dir is used when unset
    pub dir: Option<PathBuf>,

    /// Never touch the network; every artifact must already be cached
    pub air_gapped: bool,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Proxy endpoint passed through to the HTTP client
    pub proxy: Option<String>,

    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Overall request timeout in seconds
    pub timeout_secs: u64,

    /// User-Agent header
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout_secs: 30,
            timeout_secs: 600,
            user_agent: concat!("nodepack/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Catalog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path to the catalog; defaults to `manifest.toml` in the buildpack root
    pub path: Option<PathBuf>,
}
