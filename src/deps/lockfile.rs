//! Lockfile detection and parsing
//!
//! Detects which package manager an app uses from its lockfile and extracts
//! what reconciliation needs: the pinned packages and the set of manifest
//! specifiers the lockfile was generated for.

use crate::catalog::Constraint;
use crate::error::{NodepackError, NodepackResult};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supported package managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    /// npm (package-lock.json, npm-shrinkwrap.json)
    Npm,
    /// Yarn (yarn.lock)
    Yarn,
}

impl PackageManager {
    /// Executable name
    pub fn program(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
        }
    }

    /// Catalog component name for this manager's own artifact
    pub fn component(&self) -> &'static str {
        self.program()
    }

    /// Lockfile names, in detection priority order
    fn lockfile_patterns(&self) -> &'static [&'static str] {
        match self {
            Self::Npm => &["npm-shrinkwrap.json", "package-lock.json"],
            Self::Yarn => &["yarn.lock"],
        }
    }

    /// Managers in detection priority order
    fn all() -> &'static [Self] {
        &[Self::Yarn, Self::Npm]
    }

    /// Pick the manager for an app: `yarn.lock` means yarn, anything else npm
    pub fn detect(app_dir: &Path) -> Self {
        find_lockfile(app_dir)
            .map(|(manager, _)| manager)
            .unwrap_or(Self::Npm)
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program())
    }
}

/// One resolved package recorded in a lockfile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedPackage {
    pub name: String,
    /// Pinned version; empty when the lockfile does not pin it
    pub version: String,
    pub resolved: Option<String>,
}

impl LockedPackage {
    /// File name of this package in a yarn offline mirror
    /// (`left-pad-1.1.3.tgz`, `@types-node-7.0.5.tgz`)
    pub fn mirror_file_name(&self) -> String {
        format!("{}-{}.tgz", self.name.replace('/', "-"), self.version)
    }

    /// Last path segment of the resolved URL, without any `#hash` suffix
    pub fn resolved_file_name(&self) -> Option<&str> {
        let resolved = self.resolved.as_deref()?;
        let without_hash = resolved.split('#').next().unwrap_or(resolved);
        without_hash.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

/// What the lockfile records about the manifest it was generated from
#[derive(Debug, Clone)]
enum Fingerprint {
    /// yarn.lock keys; transitive specifiers are mixed in, so only coverage
    /// of the declared ones can be checked
    Specifiers(BTreeSet<String>),
    /// Root `dependencies` of package-lock v2/v3
    Root(BTreeMap<String, String>),
    /// package-lock v1: hoisted name -> pinned version, and the hoisted
    /// non-dev packages nothing else requires
    TopLevel {
        pinned: BTreeMap<String, String>,
        unrequired: BTreeSet<String>,
    },
}

/// A parsed lockfile
#[derive(Debug, Clone)]
pub struct Lockfile {
    pub manager: PackageManager,
    pub path: PathBuf,
    pub packages: Vec<LockedPackage>,
    /// SHA256 of the lockfile contents (first 12 hex chars)
    pub hash: String,
    fingerprint: Fingerprint,
}

impl Lockfile {
    /// Detect and parse the app's lockfile, if it has one
    pub fn load(app_dir: &Path) -> NodepackResult<Option<Self>> {
        let Some((manager, path)) = find_lockfile(app_dir) else {
            debug!("No lockfile in {}", app_dir.display());
            return Ok(None);
        };

        let contents = fs::read_to_string(&path)
            .map_err(|e| NodepackError::io(format!("reading lockfile {}", path.display()), e))?;
        let lockfile = Self::parse(manager, path, &contents)?;
        debug!(
            "Detected {} lockfile {} ({} packages, hash {})",
            lockfile.manager,
            lockfile.path.display(),
            lockfile.packages.len(),
            lockfile.hash
        );
        Ok(Some(lockfile))
    }

    /// Parse lockfile contents for `manager`
    pub fn parse(manager: PackageManager, path: PathBuf, contents: &str) -> NodepackResult<Self> {
        let (packages, fingerprint) = match manager {
            PackageManager::Yarn => parse_yarn_lock(contents),
            PackageManager::Npm => parse_package_lock(contents).map_err(|reason| {
                NodepackError::LockfileRead {
                    path: path.clone(),
                    reason,
                }
            })?,
        };

        Ok(Self {
            manager,
            path,
            packages,
            hash: hash_contents(contents.as_bytes()),
            fingerprint,
        })
    }

    /// Lockfile file name for display
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Whether every recorded package carries a pinned version
    pub fn is_fully_pinned(&self) -> bool {
        self.packages.iter().all(|p| !p.version.is_empty())
    }

    /// Where the lockfile and the declared dependencies disagree: declared
    /// `name@range` specifiers it does not cover, then packages it records as
    /// direct dependencies that are no longer declared
    pub fn drift(&self, declared: &BTreeMap<String, String>) -> Vec<String> {
        let mut drift: Vec<String> = declared
            .iter()
            .filter(|(name, range)| !self.covers(name, range))
            .map(|(name, range)| format!("{name}@{range}"))
            .collect();

        let recorded: Vec<&String> = match &self.fingerprint {
            Fingerprint::Specifiers(_) => Vec::new(),
            Fingerprint::Root(root) => root.keys().collect(),
            Fingerprint::TopLevel { unrequired, .. } => unrequired.iter().collect(),
        };
        drift.extend(
            recorded
                .into_iter()
                .filter(|name| !declared.contains_key(*name))
                .map(|name| format!("{name} (not in package.json)")),
        );
        drift
    }

    fn covers(&self, name: &str, range: &str) -> bool {
        match &self.fingerprint {
            Fingerprint::Specifiers(specifiers) => {
                specifiers.contains(&format!("{name}@{range}"))
            }
            Fingerprint::Root(root) => root.get(name).is_some_and(|r| r == range),
            Fingerprint::TopLevel { pinned, .. } => match pinned.get(name) {
                None => false,
                Some(version) => match (
                    Constraint::parse(name, range),
                    semver::Version::parse(version),
                ) {
                    (Ok(constraint), Ok(version)) => constraint.matches(&version),
                    _ => true,
                },
            },
        }
    }
}

/// Find the first lockfile present, in priority order
fn find_lockfile(app_dir: &Path) -> Option<(PackageManager, PathBuf)> {
    PackageManager::all().iter().find_map(|manager| {
        manager
            .lockfile_patterns()
            .iter()
            .map(|pattern| app_dir.join(pattern))
            .find(|path| path.is_file())
            .map(|path| (*manager, path))
    })
}

/// Hash lockfile contents using SHA256, returning first 12 hex chars
fn hash_contents(contents: &[u8]) -> String {
    let digest = Sha256::digest(contents);
    hex::encode(&digest[..6])
}

/// Split `name@range`, keeping the leading `@` of scoped names
fn split_specifier(spec: &str) -> Option<(&str, &str)> {
    let (at, _) = spec.char_indices().skip(1).find(|(_, c)| *c == '@')?;
    Some((&spec[..at], &spec[at + 1..]))
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"')
}

/// yarn.lock v1:
///
/// ```text
/// "@scope/a@^1.0.0", "@scope/a@^1.1.0":
///   version "1.1.2"
///   resolved "https://registry.yarnpkg.com/@scope/a/-/a-1.1.2.tgz#abc"
/// ```
fn parse_yarn_lock(contents: &str) -> (Vec<LockedPackage>, Fingerprint) {
    let mut packages = Vec::new();
    let mut specifiers = BTreeSet::new();
    let mut current: Option<LockedPackage> = None;

    for line in contents.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        if !line.starts_with(' ') {
            if let Some(done) = current.take() {
                packages.push(done);
            }
            let header = line.trim_end().trim_end_matches(':');
            let mut name = None;
            for spec in header.split(',').map(unquote) {
                if let Some((n, _)) = split_specifier(spec) {
                    name.get_or_insert_with(|| n.to_string());
                    specifiers.insert(spec.to_string());
                }
            }
            current = name.map(|name| LockedPackage {
                name,
                version: String::new(),
                resolved: None,
            });
            continue;
        }

        // Only the block's own fields sit at two spaces of indentation
        let Some(field) = line.strip_prefix("  ").filter(|f| !f.starts_with(' ')) else {
            continue;
        };
        let Some(package) = current.as_mut() else {
            continue;
        };
        if let Some((key, value)) = field.split_once(' ') {
            match key {
                "version" => package.version = unquote(value).to_string(),
                "resolved" => package.resolved = Some(unquote(value).to_string()),
                _ => {}
            }
        }
    }
    if let Some(done) = current.take() {
        packages.push(done);
    }

    (packages, Fingerprint::Specifiers(specifiers))
}

fn locked_from_value(name: &str, value: &Value) -> LockedPackage {
    LockedPackage {
        name: name.to_string(),
        version: value
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        resolved: value
            .get("resolved")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// package-lock.json / npm-shrinkwrap.json, lockfileVersion 1 through 3
fn parse_package_lock(contents: &str) -> Result<(Vec<LockedPackage>, Fingerprint), String> {
    let root: Value = serde_json::from_str(contents).map_err(|e| e.to_string())?;

    // v2 and v3 carry a flat "packages" map keyed by install path
    if let Some(entries) = root.get("packages").and_then(Value::as_object) {
        let mut packages = Vec::new();
        let mut root_deps = BTreeMap::new();

        for (key, value) in entries {
            if key.is_empty() {
                if let Some(deps) = value.get("dependencies").and_then(Value::as_object) {
                    for (name, range) in deps {
                        if let Some(range) = range.as_str() {
                            root_deps.insert(name.clone(), range.to_string());
                        }
                    }
                }
                continue;
            }
            if value.get("link").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            let name = key.rsplit("node_modules/").next().unwrap_or(key);
            packages.push(locked_from_value(name, value));
        }
        return Ok((packages, Fingerprint::Root(root_deps)));
    }

    // v1 nests "dependencies" recursively and lists `requires` per package
    let mut packages = Vec::new();
    let mut pinned = BTreeMap::new();
    let mut required = BTreeSet::new();
    let mut candidates = BTreeSet::new();
    if let Some(deps) = root.get("dependencies").and_then(Value::as_object) {
        for (name, value) in deps {
            let package = locked_from_value(name, value);
            pinned.insert(name.clone(), package.version.clone());
            if !is_flagged(value, "dev") && !is_flagged(value, "optional") {
                candidates.insert(name.clone());
            }
            packages.push(package);
            collect_requires(value, &mut required);
            collect_nested(value, &mut packages, &mut required);
        }
    }
    let unrequired = candidates.difference(&required).cloned().collect();
    Ok((packages, Fingerprint::TopLevel { pinned, unrequired }))
}

fn is_flagged(value: &Value, flag: &str) -> bool {
    value.get(flag).and_then(Value::as_bool).unwrap_or(false)
}

fn collect_requires(value: &Value, required: &mut BTreeSet<String>) {
    if let Some(requires) = value.get("requires").and_then(Value::as_object) {
        required.extend(requires.keys().cloned());
    }
}

fn collect_nested(value: &Value, packages: &mut Vec<LockedPackage>, required: &mut BTreeSet<String>) {
    if let Some(deps) = value.get("dependencies").and_then(Value::as_object) {
        for (name, child) in deps {
            packages.push(locked_from_value(name, child));
            collect_requires(child, required);
            collect_nested(child, packages, required);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const YARN_LOCK: &str = r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


"@types/node@^7.0.0":
  version "7.0.5"
  resolved "https://registry.yarnpkg.com/@types/node/-/node-7.0.5.tgz#96a0f0a618b7b606f1ec547403c00650210bfbb7"

left-pad@^1.1.0, left-pad@^1.1.3:
  version "1.1.3"
  resolved "https://registry.yarnpkg.com/left-pad/-/left-pad-1.1.3.tgz#612f61c033f3a9e08e939f1caebeea41b6f3199a"
  dependencies:
    nested "1.0.0"
"#;

    const PACKAGE_LOCK_V2: &str = r#"{
        "name": "app",
        "lockfileVersion": 2,
        "packages": {
            "": { "name": "app", "dependencies": { "express": "^4.14.0" } },
            "node_modules/express": { "version": "4.15.2", "resolved": "https://registry.npmjs.org/express/-/express-4.15.2.tgz" },
            "node_modules/express/node_modules/debug": { "version": "2.6.1" },
            "node_modules/local": { "resolved": "../local", "link": true }
        }
    }"#;

    const PACKAGE_LOCK_V1: &str = r#"{
        "name": "app",
        "lockfileVersion": 1,
        "dependencies": {
            "express": {
                "version": "4.15.2",
                "requires": { "debug": "2.6.1", "ms": "0.7.2" },
                "dependencies": { "debug": { "version": "2.6.1" } }
            },
            "ms": { "version": "0.7.2" },
            "mocha": { "version": "3.2.0", "dev": true }
        }
    }"#;

    fn declared(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(n, r)| (n.to_string(), r.to_string()))
            .collect()
    }

    #[test]
    fn test_detect_defaults_to_npm() {
        let temp = TempDir::new().unwrap();
        assert_eq!(PackageManager::detect(temp.path()), PackageManager::Npm);
    }

    #[test]
    fn test_detect_yarn_wins() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("yarn.lock"), YARN_LOCK).unwrap();
        fs::write(temp.path().join("package-lock.json"), PACKAGE_LOCK_V2).unwrap();
        assert_eq!(PackageManager::detect(temp.path()), PackageManager::Yarn);
    }

    #[test]
    fn test_detect_shrinkwrap() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("npm-shrinkwrap.json"), PACKAGE_LOCK_V1).unwrap();
        let lockfile = Lockfile::load(temp.path()).unwrap().unwrap();
        assert_eq!(lockfile.manager, PackageManager::Npm);
        assert_eq!(lockfile.file_name(), "npm-shrinkwrap.json");
    }

    #[test]
    fn test_parse_yarn_lock() {
        let lockfile =
            Lockfile::parse(PackageManager::Yarn, PathBuf::from("yarn.lock"), YARN_LOCK).unwrap();
        assert_eq!(lockfile.packages.len(), 2);
        assert_eq!(lockfile.packages[0].name, "@types/node");
        assert_eq!(lockfile.packages[0].version, "7.0.5");
        assert_eq!(lockfile.packages[1].name, "left-pad");
        assert_eq!(lockfile.packages[1].version, "1.1.3");
        assert!(lockfile.is_fully_pinned());
        assert_eq!(lockfile.hash.len(), 12);
    }

    #[test]
    fn test_yarn_coverage() {
        let lockfile =
            Lockfile::parse(PackageManager::Yarn, PathBuf::from("yarn.lock"), YARN_LOCK).unwrap();
        assert!(lockfile.drift(&declared(&[("left-pad", "^1.1.3")])).is_empty());
        assert!(lockfile.drift(&declared(&[("@types/node", "^7.0.0")])).is_empty());
        assert_eq!(
            lockfile.drift(&declared(&[("left-pad", "^1.1.3"), ("express", "^4.0.0")])),
            vec!["express@^4.0.0".to_string()]
        );
        // Changing a range also makes the lockfile stale
        assert!(!lockfile.drift(&declared(&[("left-pad", "^1.2.0")])).is_empty());
    }

    #[test]
    fn test_mirror_file_names() {
        let lockfile =
            Lockfile::parse(PackageManager::Yarn, PathBuf::from("yarn.lock"), YARN_LOCK).unwrap();
        assert_eq!(lockfile.packages[0].mirror_file_name(), "@types-node-7.0.5.tgz");
        assert_eq!(lockfile.packages[0].resolved_file_name(), Some("node-7.0.5.tgz"));
        assert_eq!(lockfile.packages[1].mirror_file_name(), "left-pad-1.1.3.tgz");
    }

    #[test]
    fn test_parse_package_lock_v2() {
        let lockfile = Lockfile::parse(
            PackageManager::Npm,
            PathBuf::from("package-lock.json"),
            PACKAGE_LOCK_V2,
        )
        .unwrap();
        let names: Vec<_> = lockfile.packages.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"express"));
        assert!(names.contains(&"debug"));
        assert!(!names.contains(&"local"));
        assert!(lockfile.is_fully_pinned());
        assert!(lockfile.drift(&declared(&[("express", "^4.14.0")])).is_empty());
        assert!(!lockfile.drift(&declared(&[("express", "^5.0.0")])).is_empty());
    }

    #[test]
    fn test_package_lock_v2_dependency_removed_from_manifest() {
        let contents = r#"{
            "lockfileVersion": 3,
            "packages": {
                "": { "dependencies": { "express": "^4.14.0", "lodash": "^4.17.0" } },
                "node_modules/express": { "version": "4.15.2" },
                "node_modules/lodash": { "version": "4.17.4" }
            }
        }"#;
        let lockfile =
            Lockfile::parse(PackageManager::Npm, PathBuf::from("package-lock.json"), contents)
                .unwrap();

        assert_eq!(
            lockfile.drift(&declared(&[("express", "^4.14.0")])),
            vec!["lodash (not in package.json)".to_string()]
        );
        assert!(lockfile
            .drift(&declared(&[("express", "^4.14.0"), ("lodash", "^4.17.0")]))
            .is_empty());
    }

    #[test]
    fn test_parse_package_lock_v1() {
        let lockfile = Lockfile::parse(
            PackageManager::Npm,
            PathBuf::from("package-lock.json"),
            PACKAGE_LOCK_V1,
        )
        .unwrap();
        assert_eq!(lockfile.packages.len(), 4);
        // Hoisted `ms` is required by express and `mocha` is a dev dependency
        assert!(lockfile.drift(&declared(&[("express", "^4.14.0")])).is_empty());
        assert!(!lockfile.drift(&declared(&[("express", "^5.0.0")])).is_empty());
        assert_eq!(
            lockfile.drift(&declared(&[("express", "^4.14.0"), ("lodash", "*")])),
            vec!["lodash@*".to_string()]
        );
    }

    #[test]
    fn test_package_lock_v1_dependency_removed_from_manifest() {
        let lockfile = Lockfile::parse(
            PackageManager::Npm,
            PathBuf::from("package-lock.json"),
            PACKAGE_LOCK_V1,
        )
        .unwrap();
        assert_eq!(
            lockfile.drift(&declared(&[("ms", "0.7.x")])),
            vec!["express (not in package.json)".to_string()]
        );
    }

    #[test]
    fn test_unpinned_entry() {
        let yarn = "foo@^1.0.0:\n  resolved \"https://example.com/foo.tgz\"\n";
        let lockfile =
            Lockfile::parse(PackageManager::Yarn, PathBuf::from("yarn.lock"), yarn).unwrap();
        assert!(!lockfile.is_fully_pinned());
    }

    #[test]
    fn test_malformed_package_lock() {
        let err = Lockfile::parse(
            PackageManager::Npm,
            PathBuf::from("package-lock.json"),
            "{ nope",
        )
        .unwrap_err();
        assert!(matches!(err, NodepackError::LockfileRead { .. }));
    }

    #[test]
    fn test_split_specifier() {
        assert_eq!(split_specifier("left-pad@^1.1.3"), Some(("left-pad", "^1.1.3")));
        assert_eq!(
            split_specifier("@types/node@^7.0.0"),
            Some(("@types/node", "^7.0.0"))
        );
        assert_eq!(split_specifier("nope"), None);
    }
}
