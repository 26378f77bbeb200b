//! Configuration management for nodepack

pub mod schema;

pub use schema::Config;

use crate::catalog::CATALOG_FILE;
use crate::error::{NodepackError, NodepackResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nodepack")
            .join("config.toml")
    }

    /// Catalog shipped next to the buildpack: `<root>/manifest.toml`, where
    /// the binary lives in `<root>/bin/`
    pub fn default_catalog_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().and_then(Path::parent).map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CATALOG_FILE)
    }

    /// Load configuration, falling back to defaults if the file is missing
    pub async fn load(&self) -> NodepackResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> NodepackResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| NodepackError::io(format!("reading config from {}", path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| NodepackError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        validate(&config, path)?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> NodepackResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            NodepackError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> NodepackResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| NodepackError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(config: &Config, path: &Path) -> NodepackResult<()> {
    let invalid = |reason: String| NodepackError::ConfigInvalid {
        path: path.to_path_buf(),
        reason,
    };

    match config.general.log_format.as_str() {
        "text" | "json" => {}
        other => {
            return Err(invalid(format!(
                "general.log_format must be \"text\" or \"json\", got \"{other}\""
            )))
        }
    }
    if config.network.connect_timeout_secs == 0 || config.network.timeout_secs == 0 {
        return Err(invalid("network timeouts must be greater than zero".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.general.log_format, "text");
        assert!(config.cache.dir.is_none());
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.cache.air_gapped = true;
        config.network.proxy = Some("http://proxy.internal:3128".to_string());

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert!(loaded.cache.air_gapped);
        assert_eq!(
            loaded.network.proxy.as_deref(),
            Some("http://proxy.internal:3128")
        );
    }

    #[tokio::test]
    async fn invalid_toml_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[cache\nair_gapped = ").unwrap();

        let err = ConfigManager::with_path(path.clone()).load().await.unwrap_err();
        match err {
            NodepackError::ConfigInvalid { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unknown_log_format_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[general]\nlog_format = \"xml\"\n").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn default_catalog_is_manifest_toml() {
        let path = ConfigManager::default_catalog_path();
        assert_eq!(path.file_name().unwrap(), CATALOG_FILE);
    }
}
