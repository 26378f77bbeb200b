//! `package.json` reader
//!
//! Only the fields staging cares about are parsed; everything else is ignored.

use crate::error::{NodepackError, NodepackResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

pub const PACKAGE_JSON: &str = "package.json";

/// Declared engine constraints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Engines {
    pub node: Option<String>,
    pub npm: Option<String>,
    pub yarn: Option<String>,
}

/// Lifecycle scripts the buildpack knows about
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scripts {
    #[serde(rename = "heroku-prebuild")]
    pub prebuild: Option<String>,
    #[serde(rename = "heroku-postbuild")]
    pub postbuild: Option<String>,
    pub start: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackageJson {
    pub name: Option<String>,
    pub engines: Engines,
    pub dependencies: BTreeMap<String, String>,
    pub scripts: Scripts,
    #[serde(rename = "cacheDirectories")]
    cache_directories_camel: Vec<String>,
    #[serde(rename = "cache_directories")]
    cache_directories_snake: Vec<String>,
}

impl PackageJson {
    /// Read `<app_dir>/package.json`; `Ok(None)` when the file does not exist
    pub fn load(app_dir: &Path) -> NodepackResult<Option<Self>> {
        let path = app_dir.join(PACKAGE_JSON);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No package.json in {}", app_dir.display());
                return Ok(None);
            }
            Err(e) => return Err(NodepackError::io(format!("reading {}", path.display()), e)),
        };

        Self::parse(&content)
            .map(Some)
            .map_err(|e| NodepackError::ManifestInvalid {
                path,
                reason: e.to_string(),
            })
    }

    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Directories to carry between builds; `cacheDirectories` wins over
    /// `cache_directories`
    pub fn cache_directories(&self) -> &[String] {
        if self.cache_directories_camel.is_empty() {
            &self.cache_directories_snake
        } else {
            &self.cache_directories_camel
        }
    }

    /// Whether the app declares any way to start
    pub fn has_start_script(&self) -> bool {
        self.scripts.start.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "name": "simple_app",
        "version": "0.0.1",
        "engines": { "node": "~>4", "yarn": "0.19.1" },
        "dependencies": { "logfmt": "~1.1.2", "express": "^4.14.0" },
        "devDependencies": { "mocha": "*" },
        "scripts": {
            "heroku-prebuild": "echo pre",
            "start": "node server.js"
        },
        "cache_directories": ["bower_components"]
    }"#;

    #[test]
    fn parses_relevant_fields() {
        let pkg = PackageJson::parse(SAMPLE).unwrap();
        assert_eq!(pkg.name.as_deref(), Some("simple_app"));
        assert_eq!(pkg.engines.node.as_deref(), Some("~>4"));
        assert_eq!(pkg.engines.yarn.as_deref(), Some("0.19.1"));
        assert!(pkg.engines.npm.is_none());
        assert_eq!(pkg.dependencies.len(), 2);
        assert_eq!(pkg.dependencies["logfmt"], "~1.1.2");
        assert_eq!(pkg.scripts.prebuild.as_deref(), Some("echo pre"));
        assert!(pkg.scripts.postbuild.is_none());
        assert!(pkg.has_start_script());
    }

    #[test]
    fn cache_directories_prefers_camel_case() {
        let pkg = PackageJson::parse(SAMPLE).unwrap();
        assert_eq!(pkg.cache_directories(), ["bower_components"]);

        let both = PackageJson::parse(
            r#"{"cacheDirectories": ["a"], "cache_directories": ["b"]}"#,
        )
        .unwrap();
        assert_eq!(both.cache_directories(), ["a"]);
    }

    #[test]
    fn empty_object_is_valid() {
        let pkg = PackageJson::parse("{}").unwrap();
        assert!(pkg.dependencies.is_empty());
        assert!(!pkg.has_start_script());
    }

    #[test]
    fn load_missing_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(PackageJson::load(temp.path()).unwrap().is_none());
    }

    #[test]
    fn load_malformed_is_manifest_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(PACKAGE_JSON), "{ not json").unwrap();
        let err = PackageJson::load(temp.path()).unwrap_err();
        assert!(matches!(err, NodepackError::ManifestInvalid { .. }));
        assert!(err.to_string().starts_with("Failed parsing"));
    }
}
