//! Error types for nodepack
//!
//! All modules use `NodepackResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for nodepack operations
pub type NodepackResult<T> = Result<T, NodepackError>;

/// All errors that can occur while staging an application
#[derive(Error, Debug)]
pub enum NodepackError {
    // Resolution errors
    #[error("no match found for {constraint} in [{available}]")]
    NoMatch {
        component: String,
        constraint: String,
        available: String,
    },

    #[error("Invalid version constraint for {component}: '{constraint}': {reason}")]
    InvalidConstraint {
        component: String,
        constraint: String,
        reason: String,
    },

    #[error("No default version configured for {0}")]
    NoDefaultVersion(String),

    // Catalog errors
    #[error("Invalid catalog at {path}: {reason}")]
    CatalogInvalid { path: PathBuf, reason: String },

    #[error("Duplicate catalog entry: {component} {version}")]
    CatalogDuplicate { component: String, version: String },

    // Cache errors
    #[error("Artifact not cached and network access is disabled: {locator}")]
    OfflineMiss { locator: String },

    #[error("Failed to download {locator}: {reason}")]
    Download { locator: String, reason: String },

    #[error("Checksum mismatch for {locator}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        locator: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid checksum '{0}': expected 64 lowercase hex characters")]
    InvalidChecksum(String),

    // Dependency errors
    #[error("Network is unavailable but {manager} needs to install packages online")]
    NetworkUnavailable { manager: String },

    #[error("Failed to install dependencies with {manager}: {reason}")]
    Reconcile { manager: String, reason: String },

    #[error("Dependencies missing after install: {}", .missing.join(", "))]
    IncompleteInstall { missing: Vec<String> },

    #[error("Failed parsing {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Failed to read lockfile {path}: {reason}")]
    LockfileRead { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, exit code: {code}")]
    CommandExecution { command: String, code: i32 },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // Staging errors
    #[error("Unable to {step}: {source}")]
    Staging {
        step: String,
        #[source]
        source: Box<NodepackError>,
    },

    // General errors
    #[error("{0}")]
    User(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NodepackError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a download error
    pub fn download(locator: impl Into<String>, reason: impl ToString) -> Self {
        Self::Download {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a later staging attempt could succeed without user changes
    pub fn is_retryable(&self) -> bool {
        if let Self::Staging { source, .. } = self {
            return source.is_retryable();
        }
        matches!(
            self,
            Self::Download { .. } | Self::ChecksumMismatch { .. } | Self::Io { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NoMatch { .. } => {
                Some("Set engines.node in package.json to a version listed by: nodepack resolve node")
            }
            Self::OfflineMiss { .. } => {
                Some("Populate the cache with a networked run, or disable cache.air_gapped")
            }
            Self::NetworkUnavailable { .. } => {
                Some("Vendor node_modules or commit an offline mirror (npm-packages-offline-cache)")
            }
            Self::ChecksumMismatch { .. } => Some("The upstream artifact changed; update the catalog"),
            Self::Staging { source, .. } => source.hint(),
            _ => None,
        }
    }
}
