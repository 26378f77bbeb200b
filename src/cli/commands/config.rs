//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{NodepackError, NodepackResult};
use crate::ui::{self, UiContext};
use std::path::PathBuf;

const VALID_KEYS: [&str; 8] = [
    "general.log_format",
    "cache.dir",
    "cache.air_gapped",
    "network.proxy",
    "network.connect_timeout_secs",
    "network.timeout_secs",
    "network.user_agent",
    "catalog.path",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> NodepackResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => {
            let mut config = config.clone();
            set_value(&mut config, &key, &value)?;
            manager.save(&config).await?;
            ui::step_ok(&UiContext::detect(), &format!("Set {} = {}", key, value));
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> NodepackResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> NodepackResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok(&ctx, &format!("Configuration initialized ({})", path.display()));
    Ok(())
}

/// Apply a dot-separated key to `config`
fn set_value(config: &mut Config, key: &str, value: &str) -> NodepackResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => match value {
            "text" | "json" => config.general.log_format = value.to_string(),
            _ => {
                return Err(NodepackError::User(format!(
                    "Invalid log format: {value}. Use text/json"
                )))
            }
        },

        ["cache", "dir"] => config.cache.dir = optional(value).map(PathBuf::from),
        ["cache", "air_gapped"] => config.cache.air_gapped = parse_bool(value)?,

        ["network", "proxy"] => config.network.proxy = optional(value).map(str::to_string),
        ["network", "connect_timeout_secs"] => {
            config.network.connect_timeout_secs = parse_secs(value)?
        }
        ["network", "timeout_secs"] => config.network.timeout_secs = parse_secs(value)?,
        ["network", "user_agent"] => config.network.user_agent = value.to_string(),

        ["catalog", "path"] => config.catalog.path = optional(value).map(PathBuf::from),

        _ => {
            return Err(NodepackError::User(format!(
                "Unknown config key: {key} (valid keys: {})",
                VALID_KEYS.join(", ")
            )))
        }
    }

    Ok(())
}

/// Empty string unsets an optional value
fn optional(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> NodepackResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(NodepackError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_secs(value: &str) -> NodepackResult<u64> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(NodepackError::User(format!(
            "Invalid timeout: {}. Use a positive number of seconds",
            value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_known_keys() {
        let mut config = Config::default();
        set_value(&mut config, "cache.air_gapped", "yes").unwrap();
        set_value(&mut config, "network.timeout_secs", "120").unwrap();
        set_value(&mut config, "catalog.path", "/buildpack/manifest.toml").unwrap();

        assert!(config.cache.air_gapped);
        assert_eq!(config.network.timeout_secs, 120);
        assert_eq!(
            config.catalog.path,
            Some(PathBuf::from("/buildpack/manifest.toml"))
        );
    }

    #[test]
    fn empty_value_unsets() {
        let mut config = Config::default();
        config.network.proxy = Some("http://proxy:3128".to_string());
        set_value(&mut config, "network.proxy", "").unwrap();
        assert!(config.network.proxy.is_none());
    }

    #[test]
    fn rejects_unknown_key_and_bad_values() {
        let mut config = Config::default();
        assert!(set_value(&mut config, "vm.name", "x")
            .unwrap_err()
            .to_string()
            .contains("cache.air_gapped"));
        assert!(set_value(&mut config, "network.timeout_secs", "0").is_err());
        assert!(set_value(&mut config, "general.log_format", "xml").is_err());
        assert!(set_value(&mut config, "cache.air_gapped", "maybe").is_err());
    }

    #[tokio::test]
    async fn init_writes_defaults_once() {
        let temp = tempfile::TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join("config.toml"));

        init_config(&manager, false).await.unwrap();
        let mut edited = manager.load().await.unwrap();
        edited.cache.air_gapped = true;
        manager.save(&edited).await.unwrap();

        init_config(&manager, false).await.unwrap();
        assert!(manager.load().await.unwrap().cache.air_gapped);

        init_config(&manager, true).await.unwrap();
        assert!(!manager.load().await.unwrap().cache.air_gapped);
    }
}
