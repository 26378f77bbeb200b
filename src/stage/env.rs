//! Environment bindings for later buildpacks and the running app

use crate::deps::PackageJson;
use crate::error::{NodepackError, NodepackResult};
use crate::stage::events::StagingEvent;
use std::fs;
use std::path::{Path, PathBuf};

pub const PROFILE_SCRIPT: &str = "node.sh";

/// Variables a staged runtime exposes, relative to the dependency dir
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvBindings {
    /// `NODE_HOME`, e.g. `node`
    pub node_home: Option<PathBuf>,
    /// `PATH` additions in priority order, e.g. `yarn/bin`, `node/bin`
    pub path: Vec<PathBuf>,
}

impl EnvBindings {
    /// Prepend a `PATH` entry
    pub fn prepend_path(&mut self, entry: impl Into<PathBuf>) {
        self.path.insert(0, entry.into());
    }

    /// Absolute `PATH` additions for processes run during staging
    pub fn absolute_path(&self, dep_dir: &Path) -> Vec<PathBuf> {
        self.path.iter().map(|p| dep_dir.join(p)).collect()
    }

    /// Write `env/NODE_HOME` and `profile.d/node.sh` under `dep_dir`.
    ///
    /// With a deps index the profile script refers to `$DEPS_DIR/<idx>`.
    pub fn write(&self, dep_dir: &Path, deps_idx: Option<&str>) -> NodepackResult<()> {
        let Some(ref node_home) = self.node_home else {
            return Ok(());
        };

        let env_dir = dep_dir.join("env");
        create_dir(&env_dir)?;
        let env_file = env_dir.join("NODE_HOME");
        fs::write(&env_file, dep_dir.join(node_home).to_string_lossy().as_bytes())
            .map_err(|e| NodepackError::io(format!("writing {}", env_file.display()), e))?;

        let runtime_root = match deps_idx {
            Some(idx) => format!("$DEPS_DIR/{idx}"),
            None => dep_dir.display().to_string(),
        };
        let join = |p: &Path| format!("{runtime_root}/{}", p.display());

        let mut script = format!("export NODE_HOME=\"{}\"\n", join(node_home));
        let path = self
            .path
            .iter()
            .map(|p| join(p))
            .collect::<Vec<_>>()
            .join(":");
        if !path.is_empty() {
            script.push_str(&format!("export PATH=\"{path}:$PATH\"\n"));
        }
        script.push_str("export NODE_ENV=${NODE_ENV:-production}\n");

        let profile_dir = dep_dir.join("profile.d");
        create_dir(&profile_dir)?;
        let profile = profile_dir.join(PROFILE_SCRIPT);
        fs::write(&profile, script)
            .map_err(|e| NodepackError::io(format!("writing {}", profile.display()), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&profile, fs::Permissions::from_mode(0o755))
                .map_err(|e| NodepackError::io(format!("setting permissions on {}", profile.display()), e))?;
        }

        Ok(())
    }
}

fn create_dir(dir: &Path) -> NodepackResult<()> {
    fs::create_dir_all(dir).map_err(|e| NodepackError::io(format!("creating {}", dir.display()), e))
}

/// List `NPM_CONFIG_*`, `YARN_*` and `NODE_*` variables, plus a note when
/// `NPM_CONFIG_PRODUCTION=true` overrides a non-production `NODE_ENV`
pub fn node_config_events(environ: &[(String, String)]) -> Vec<StagingEvent> {
    let mut events = Vec::new();
    let mut production = false;
    let mut node_env = "production";

    for (key, value) in environ {
        if ["NPM_CONFIG_", "YARN_", "NODE_"]
            .iter()
            .any(|prefix| key.starts_with(prefix))
        {
            events.push(StagingEvent::NodeConfig(format!("{key}={value}")));
        }
        if key == "NPM_CONFIG_PRODUCTION" && value == "true" {
            production = true;
        }
        if key == "NODE_ENV" {
            node_env = value.as_str();
        }
    }

    if production && node_env != "production" {
        events.push(StagingEvent::ProductionOverride {
            node_env: node_env.to_string(),
        });
    }
    events
}

/// Whether the app has a Procfile, a `server.js` or a start script
pub fn has_start_command(app_dir: &Path, package: Option<&PackageJson>) -> bool {
    app_dir.join("Procfile").is_file()
        || app_dir.join("server.js").is_file()
        || package.is_some_and(PackageJson::has_start_script)
}
