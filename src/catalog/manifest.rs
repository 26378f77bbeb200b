//! Catalog manifest parsing
//!
//! The buildpack ships a `manifest.toml` at its root listing installable
//! artifacts:
//!
//! ```toml
//! language = "nodejs"
//!
//! [[default_versions]]
//! name = "node"
//! version = "4.x"
//!
//! [[dependencies]]
//! name = "node"
//! kind = "runtime"
//! version = "4.8.4"
//! uri = "https://nodejs.org/dist/v4.8.4/node-v4.8.4-linux-x64.tar.gz"
//! sha256 = "..."
//! ```

use crate::error::{NodepackError, NodepackResult};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// File name of the catalog inside the buildpack root
pub const CATALOG_FILE: &str = "manifest.toml";

/// Which role a cataloged artifact plays in staging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    /// The language runtime (node)
    Runtime,
    /// A package manager installed alongside the runtime (yarn, npm)
    PackageManager,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runtime => write!(f, "runtime"),
            Self::PackageManager => write!(f, "package-manager"),
        }
    }
}

/// One installable artifact version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Component name (node, yarn, npm)
    pub name: String,
    /// Runtime or package manager
    pub kind: ComponentKind,
    /// Concrete semver version
    pub version: Version,
    /// Download locator
    pub uri: String,
    /// Lowercase hex sha256 of the artifact bytes
    pub sha256: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    language: String,
    #[serde(default)]
    default_versions: Vec<DefaultVersion>,
    #[serde(default)]
    dependencies: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct DefaultVersion {
    name: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    kind: ComponentKind,
    version: String,
    uri: String,
    sha256: String,
}

/// Immutable, indexed set of catalog entries
#[derive(Debug, Clone)]
pub struct Catalog {
    language: String,
    /// Entries per component, sorted ascending by version
    entries: BTreeMap<String, Vec<CatalogEntry>>,
    /// Default constraint per component
    defaults: BTreeMap<String, String>,
}

impl Catalog {
    /// Load the catalog from a TOML file on disk
    pub async fn from_file(path: &Path) -> NodepackResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| NodepackError::io(format!("reading catalog {}", path.display()), e))?;
        Self::parse(&content).map_err(|e| match e {
            NodepackError::CatalogInvalid { reason, .. } => NodepackError::CatalogInvalid {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse a catalog from a TOML string
    pub fn parse(content: &str) -> NodepackResult<Self> {
        let invalid = |reason: String| NodepackError::CatalogInvalid {
            path: CATALOG_FILE.into(),
            reason,
        };

        let file: CatalogFile = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;

        let mut entries: BTreeMap<String, Vec<CatalogEntry>> = BTreeMap::new();
        for raw in file.dependencies {
            let version = Version::parse(raw.version.trim_start_matches('v')).map_err(|e| {
                invalid(format!("{} has invalid version '{}': {}", raw.name, raw.version, e))
            })?;
            let sha256 = raw.sha256.to_ascii_lowercase();
            if !crate::cache::is_valid_checksum(&sha256) {
                return Err(invalid(format!(
                    "{} {} has invalid sha256 '{}'",
                    raw.name, version, raw.sha256
                )));
            }

            let list = entries.entry(raw.name.clone()).or_default();
            if list.iter().any(|e| e.version == version) {
                return Err(NodepackError::CatalogDuplicate {
                    component: raw.name,
                    version: version.to_string(),
                });
            }
            if let Some(first) = list.first() {
                if first.kind != raw.kind {
                    return Err(invalid(format!(
                        "{} is listed as both {} and {}",
                        raw.name, first.kind, raw.kind
                    )));
                }
            }
            list.push(CatalogEntry {
                name: raw.name,
                kind: raw.kind,
                version,
                uri: raw.uri,
                sha256,
            });
        }

        for list in entries.values_mut() {
            list.sort_by(|a, b| a.version.cmp(&b.version));
        }

        let defaults = file
            .default_versions
            .into_iter()
            .map(|d| (d.name, d.version))
            .collect();

        Ok(Self {
            language: file.language,
            entries,
            defaults,
        })
    }

    /// Language this catalog serves (e.g., "nodejs")
    pub fn language(&self) -> &str {
        &self.language
    }

    /// All entries for a component, ascending by version
    pub fn entries(&self, component: &str) -> &[CatalogEntry] {
        self.entries
            .get(component)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Designated default constraint for a component
    pub fn default_for(&self, component: &str) -> Option<&str> {
        self.defaults.get(component).map(String::as_str)
    }

    /// Names of all cataloged components
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Space-separated version list, used in resolution diagnostics
    pub fn versions_display(&self, component: &str) -> String {
        self.entries(component)
            .iter()
            .map(|e| e.version.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sha(c: char) -> String {
        std::iter::repeat(c).take(64).collect()
    }

    pub(crate) fn catalog_toml(node_versions: &[&str], default: Option<&str>) -> String {
        let mut out = String::from("language = \"nodejs\"\n");
        if let Some(d) = default {
            out.push_str(&format!(
                "\n[[default_versions]]\nname = \"node\"\nversion = \"{d}\"\n"
            ));
        }
        for (i, v) in node_versions.iter().enumerate() {
            let c = char::from_digit((i % 10) as u32, 10).unwrap();
            out.push_str(&format!(
                "\n[[dependencies]]\nname = \"node\"\nkind = \"runtime\"\nversion = \"{v}\"\nuri = \"https://example.com/node-v{v}.tgz\"\nsha256 = \"{}\"\n",
                sha(c)
            ));
        }
        out
    }

    #[test]
    fn parse_sorts_versions() {
        let catalog = Catalog::parse(&catalog_toml(&["6.11.0", "4.8.4", "4.2.0"], None)).unwrap();
        let versions: Vec<String> = catalog
            .entries("node")
            .iter()
            .map(|e| e.version.to_string())
            .collect();
        assert_eq!(versions, vec!["4.2.0", "4.8.4", "6.11.0"]);
        assert_eq!(catalog.language(), "nodejs");
        assert_eq!(catalog.versions_display("node"), "4.2.0 4.8.4 6.11.0");
    }

    #[test]
    fn parse_defaults() {
        let catalog = Catalog::parse(&catalog_toml(&["4.8.4"], Some("4.x"))).unwrap();
        assert_eq!(catalog.default_for("node"), Some("4.x"));
        assert_eq!(catalog.default_for("yarn"), None);
    }

    #[test]
    fn duplicate_versions_rejected() {
        let result = Catalog::parse(&catalog_toml(&["4.8.4", "4.8.4"], None));
        assert!(matches!(
            result,
            Err(NodepackError::CatalogDuplicate { .. })
        ));
    }

    #[test]
    fn invalid_version_rejected() {
        let result = Catalog::parse(&catalog_toml(&["four"], None));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("invalid version 'four'"));
    }

    #[test]
    fn invalid_checksum_rejected() {
        let toml = r#"
language = "nodejs"

[[dependencies]]
name = "node"
kind = "runtime"
version = "4.8.4"
uri = "https://example.com/node.tgz"
sha256 = "abc"
"#;
        let err = Catalog::parse(toml).unwrap_err().to_string();
        assert!(err.contains("invalid sha256"));
    }

    #[test]
    fn unknown_component_is_empty() {
        let catalog = Catalog::parse(&catalog_toml(&["4.8.4"], None)).unwrap();
        assert!(catalog.entries("python").is_empty());
        assert_eq!(catalog.components().collect::<Vec<_>>(), vec!["node"]);
    }

    #[tokio::test]
    async fn from_file_reports_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(CATALOG_FILE);
        std::fs::write(&path, "language = 3").unwrap();

        let err = Catalog::from_file(&path).await.unwrap_err();
        match err {
            NodepackError::CatalogInvalid { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
