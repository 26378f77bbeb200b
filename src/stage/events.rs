//! Staging events and their buildpack log rendering

use crate::cache::FetchSource;
use crate::catalog::Provenance;
use crate::deps::{InstallMode, PackageManager, ReconcileEvent};
use crate::error::NodepackError;
use std::fmt;

pub const VENDORING_DOCS: &str = "http://docs.cloudfoundry.org/buildpacks/node/index.html#vendoring";
pub const START_DOCS: &str = "https://docs.cloudfoundry.org/buildpacks/node/node-tips.html#start";
pub const OFFLINE_MIRROR_DOCS: &str = "https://yarnpkg.com/blog/2016/11/24/offline-mirror";
pub const PRODUCTION_DOCS: &str = "https://docs.npmjs.com/misc/config#production";

/// How a line is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    /// `-----> ` step header
    Step,
    Info,
    Warning,
    ProTip,
}

/// One user-visible staging occurrence, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingEvent {
    Step(String),
    /// Constraint read from `package.json`
    EngineRequested {
        component: String,
        constraint: Option<String>,
    },
    Installing {
        component: String,
        version: String,
        provenance: Provenance,
    },
    Fetched {
        locator: String,
        checksum: String,
        source: FetchSource,
    },
    Reconcile(ReconcileEvent),
    ScriptRun {
        script: String,
        manager: PackageManager,
    },
    /// `NPM_CONFIG_*`, `YARN_*` or `NODE_*` variable present at staging
    NodeConfig(String),
    ProductionOverride {
        node_env: String,
    },
    /// Build directories copied back from the staging cache
    CacheRestored {
        dirs: Vec<String>,
        source: &'static str,
    },
    CacheSaved {
        dirs: Vec<String>,
    },
    NoPackageJson,
    NoStartCommand,
}

impl StagingEvent {
    pub fn level(&self) -> EventLevel {
        match self {
            Self::Step(_) => EventLevel::Step,
            Self::NoPackageJson | Self::NoStartCommand => EventLevel::Warning,
            Self::Reconcile(ReconcileEvent::LockfileOutdated { .. })
            | Self::Reconcile(ReconcileEvent::VendoredMismatch { .. }) => EventLevel::Warning,
            Self::Reconcile(ReconcileEvent::VendoringAdvisory) => EventLevel::ProTip,
            _ => EventLevel::Info,
        }
    }
}

impl fmt::Display for StagingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(title) => write!(f, "{title}"),
            Self::EngineRequested {
                component,
                constraint,
            } => {
                let label = format!("engines.{component} (package.json):");
                match constraint {
                    Some(c) => write!(f, "{label:<28}{c}"),
                    None => write!(f, "{label:<28}unspecified (use default)"),
                }
            }
            Self::Installing {
                component, version, ..
            } => write!(f, "Installing {component} {version}"),
            Self::Fetched {
                locator,
                source: FetchSource::Downloaded,
                ..
            } => write!(f, "Downloaded [{locator}]"),
            Self::Fetched {
                checksum,
                source: FetchSource::Reused,
                ..
            } => write!(f, "Copy [{checksum}]"),
            Self::Reconcile(event) => write_reconcile(f, event),
            Self::ScriptRun { script, manager } => write!(f, "Running {script} ({manager})"),
            Self::NodeConfig(line) => write!(f, "{line}"),
            Self::ProductionOverride { node_env } => write!(
                f,
                "npm scripts will see NODE_ENV=production (not '{node_env}')\n{PRODUCTION_DOCS}"
            ),
            Self::CacheRestored { dirs, source } => {
                write!(f, "Loading {} from cacheDirectories ({source}):", dirs.len())?;
                for dir in dirs {
                    write!(f, "\n- {dir}")?;
                }
                Ok(())
            }
            Self::CacheSaved { dirs } => {
                write!(f, "Saving {} cacheDirectories", dirs.len())?;
                for dir in dirs {
                    write!(f, "\n- {dir}")?;
                }
                Ok(())
            }
            Self::NoPackageJson => write!(f, "No package.json found"),
            Self::NoStartCommand => write!(
                f,
                "This app may not specify any way to start a node process\nSee: {START_DOCS}"
            ),
        }
    }
}

fn write_reconcile(f: &mut fmt::Formatter<'_>, event: &ReconcileEvent) -> fmt::Result {
    match event {
        ReconcileEvent::LockfileOutdated { lockfile, .. } => write!(f, "{lockfile} is outdated"),
        ReconcileEvent::LockfileMatches { lockfile } => {
            write!(f, "{lockfile} and package.json match")
        }
        ReconcileEvent::VendoredSatisfied { count } => {
            write!(f, "Using {count} vendored dependencies (node_modules)")
        }
        ReconcileEvent::VendoredMismatch {
            name,
            installed,
            range,
        } => write!(
            f,
            "Vendored {name}@{installed} does not satisfy {range}; replacing it"
        ),
        ReconcileEvent::InstallMode {
            manager,
            mode,
            source,
        } => {
            writeln!(f, "Installing node modules ({source})")?;
            write!(f, "Running {manager} in {mode} mode")?;
            if *manager == PackageManager::Yarn && *mode == InstallMode::Online {
                write!(f, "\nTo run yarn in offline mode, see: {OFFLINE_MIRROR_DOCS}")?;
            }
            Ok(())
        }
        ReconcileEvent::Installed { packages } => {
            write!(f, "Installed {} packages", packages.len())
        }
        ReconcileEvent::VendoringAdvisory => write!(
            f,
            "It is recommended to vendor the application's Node.js dependencies\nVisit {VENDORING_DOCS}"
        ),
    }
}

/// The pipeline step that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingStep {
    ReadApp,
    Install(String),
    BuildDependencies,
    BindEnvironment,
}

impl fmt::Display for StagingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadApp => write!(f, "read application"),
            Self::Install(component) => write!(f, "install {component}"),
            Self::BuildDependencies => write!(f, "build dependencies"),
            Self::BindEnvironment => write!(f, "write environment"),
        }
    }
}

/// Tagged staging failure; renders as `Unable to <step>: <reason>`
#[derive(Debug)]
pub struct StagingFailure {
    pub step: StagingStep,
    pub error: NodepackError,
}

impl StagingFailure {
    pub fn new(step: StagingStep, error: NodepackError) -> Self {
        Self { step, error }
    }
}

impl fmt::Display for StagingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unable to {}: {}", self.step, self.error)
    }
}

impl From<StagingFailure> for NodepackError {
    fn from(failure: StagingFailure) -> Self {
        Self::Staging {
            step: failure.step.to_string(),
            source: Box::new(failure.error),
        }
    }
}
