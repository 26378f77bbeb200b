//! Staging pipeline
//!
//! resolve runtime -> fetch -> extract -> package manager (if needed) ->
//! reconcile dependencies -> bind environment. The first failure ends the
//! run; there is no partial success.

use crate::cache::{ArtifactCache, FetchPolicy};
use crate::catalog::{resolve, Catalog, ResolvedVersion};
use crate::deps::{
    Installer, PackageJson, PackageManager, ReconcileReport, ReconcileRequest, Reconciler, ToolEnv,
};
use crate::error::NodepackError;
use crate::stage::build_cache::CacheDirs;
use crate::stage::env::{has_start_command, node_config_events, EnvBindings};
use crate::stage::events::{StagingEvent, StagingFailure, StagingStep};
use crate::stage::extract::extract_tarball;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const PREBUILD_SCRIPT: &str = "heroku-prebuild";
const POSTBUILD_SCRIPT: &str = "heroku-postbuild";

/// Directories handed to the buildpack
#[derive(Debug, Clone)]
pub struct StageDirs {
    pub build_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub deps_dir: Option<PathBuf>,
    pub deps_idx: Option<String>,
}

impl StageDirs {
    pub fn new(build_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            cache_dir: cache_dir.into(),
            deps_dir: None,
            deps_idx: None,
        }
    }

    pub fn with_deps(mut self, deps_dir: impl Into<PathBuf>, deps_idx: impl Into<String>) -> Self {
        self.deps_dir = Some(deps_dir.into());
        self.deps_idx = Some(deps_idx.into());
        self
    }

    /// `<deps>/<idx>`, or `<build>/.nodepack` when staging without a deps dir
    pub fn dep_dir(&self) -> PathBuf {
        match (&self.deps_dir, &self.deps_idx) {
            (Some(dir), Some(idx)) => dir.join(idx),
            _ => self.build_dir.join(".nodepack"),
        }
    }
}

/// Terminal outcome of a staging run
#[derive(Debug)]
pub struct StagingResult {
    pub outcome: Result<(), StagingFailure>,
    pub bindings: EnvBindings,
    pub events: Vec<StagingEvent>,
    pub runtime: Option<ResolvedVersion>,
    pub reconcile: Option<ReconcileReport>,
}

impl StagingResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Default)]
struct RunState<'a> {
    observer: Option<&'a Observer>,
    events: Vec<StagingEvent>,
    bindings: EnvBindings,
    runtime: Option<ResolvedVersion>,
    reconcile: Option<ReconcileReport>,
}

type Observer = dyn Fn(&StagingEvent) + Send + Sync;

impl RunState<'_> {
    fn emit(&mut self, event: StagingEvent) {
        if let Some(observer) = self.observer {
            observer(&event);
        }
        self.events.push(event);
    }
}

pub struct Orchestrator {
    catalog: Catalog,
    cache: Arc<ArtifactCache>,
    installer: Arc<dyn Installer>,
    reconciler: Reconciler,
    policy: FetchPolicy,
    observer: Option<Box<Observer>>,
}

impl Orchestrator {
    pub fn new(
        catalog: Catalog,
        cache: Arc<ArtifactCache>,
        installer: Arc<dyn Installer>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            catalog,
            cache,
            reconciler: Reconciler::new(installer.clone()),
            installer,
            policy,
            observer: None,
        }
    }

    /// Call `observer` with each event as it happens
    pub fn with_observer(mut self, observer: impl Fn(&StagingEvent) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Stage the app in `dirs`. `environ` is the staging environment, used
    /// for the node configuration listing.
    pub async fn stage(&self, dirs: &StageDirs, environ: &[(String, String)]) -> StagingResult {
        let mut state = RunState {
            observer: self.observer.as_deref(),
            ..RunState::default()
        };
        let outcome = self.run(dirs, environ, &mut state).await;
        if let Err(ref failure) = outcome {
            info!("Staging failed: {}", failure);
        }

        StagingResult {
            outcome,
            bindings: state.bindings,
            events: state.events,
            runtime: state.runtime,
            reconcile: state.reconcile,
        }
    }

    async fn run(
        &self,
        dirs: &StageDirs,
        environ: &[(String, String)],
        state: &mut RunState<'_>,
    ) -> Result<(), StagingFailure> {
        let app_dir = dirs.build_dir.as_path();
        let dep_dir = dirs.dep_dir();

        let package = PackageJson::load(app_dir)
            .map_err(|e| StagingFailure::new(StagingStep::ReadApp, e))?;
        if package.is_none() {
            state.emit(StagingEvent::NoPackageJson);
        }
        let engines = package
            .as_ref()
            .map(|p| p.engines.clone())
            .unwrap_or_default();
        let manager = PackageManager::detect(app_dir);

        state.emit(StagingEvent::Step("Installing binaries".into()));
        state.emit(StagingEvent::EngineRequested {
            component: "node".into(),
            constraint: engines.node.clone(),
        });
        state.emit(StagingEvent::EngineRequested {
            component: "npm".into(),
            constraint: engines.npm.clone(),
        });
        if manager == PackageManager::Yarn {
            state.emit(StagingEvent::EngineRequested {
                component: "yarn".into(),
                constraint: engines.yarn.clone(),
            });
        }
        for event in node_config_events(environ) {
            state.emit(event);
        }

        let runtime = self
            .install_component("node", engines.node.as_deref(), &dep_dir, state)
            .await?;
        state.runtime = Some(runtime);
        state.bindings.node_home = Some(PathBuf::from("node"));
        state.bindings.prepend_path(Path::new("node").join("bin"));

        // npm ships with node; it is only replaced when pinned
        let manager_constraint = match manager {
            PackageManager::Yarn => Some(engines.yarn.as_deref()),
            PackageManager::Npm => engines.npm.as_deref().map(Some),
        };
        if let Some(constraint) = manager_constraint {
            let component = manager.component();
            self.install_component(component, constraint, &dep_dir, state)
                .await?;
            state.bindings.prepend_path(Path::new(component).join("bin"));
        }

        state.emit(StagingEvent::Step("Building dependencies".into()));
        let build = |e: NodepackError| StagingFailure::new(StagingStep::BuildDependencies, e);
        let tools = ToolEnv {
            node_home: Some(dep_dir.join("node")),
            bin_dirs: state.bindings.absolute_path(&dep_dir),
        };

        let cache_dirs = CacheDirs::from_package(
            package
                .as_ref()
                .map(PackageJson::cache_directories)
                .unwrap_or_default(),
        );
        let restored = cache_dirs.restore(&dirs.cache_dir, app_dir).map_err(build)?;
        if !restored.is_empty() {
            state.emit(StagingEvent::CacheRestored {
                dirs: restored,
                source: cache_dirs.source,
            });
        }

        let scripts = package.as_ref().map(|p| p.scripts.clone()).unwrap_or_default();
        if has_script(scripts.prebuild.as_deref()) {
            self.run_script(manager, app_dir, PREBUILD_SCRIPT, &tools, state)
                .await
                .map_err(build)?;
        }

        let empty = BTreeMap::new();
        let declared = package.as_ref().map(|p| &p.dependencies).unwrap_or(&empty);
        let report = self
            .reconciler
            .reconcile(ReconcileRequest {
                app_dir,
                declared,
                manager,
                policy: self.policy,
                tools: tools.clone(),
            })
            .await
            .map_err(build)?;
        debug!(
            "Reconciled {} dependencies ({} vendored, install ran: {})",
            declared.len(),
            report.vendored,
            report.install_ran()
        );
        for event in &report.events {
            state.emit(StagingEvent::Reconcile(event.clone()));
        }
        state.reconcile = Some(report);

        if has_script(scripts.postbuild.as_deref()) {
            self.run_script(manager, app_dir, POSTBUILD_SCRIPT, &tools, state)
                .await
                .map_err(build)?;
        }

        let saved = cache_dirs.save(app_dir, &dirs.cache_dir).map_err(build)?;
        if !saved.is_empty() {
            state.emit(StagingEvent::CacheSaved { dirs: saved });
        }

        state
            .bindings
            .write(&dep_dir, dirs.deps_idx.as_deref())
            .map_err(|e| StagingFailure::new(StagingStep::BindEnvironment, e))?;

        if !has_start_command(app_dir, package.as_ref()) {
            state.emit(StagingEvent::NoStartCommand);
        }
        Ok(())
    }

    /// Resolve, fetch and extract one component into `<dep_dir>/<component>`
    async fn install_component(
        &self,
        component: &str,
        constraint: Option<&str>,
        dep_dir: &Path,
        state: &mut RunState<'_>,
    ) -> Result<ResolvedVersion, StagingFailure> {
        let fail = |e: NodepackError| StagingFailure::new(StagingStep::Install(component.to_string()), e);

        let resolved = resolve(&self.catalog, component, constraint).map_err(fail)?;
        debug!(
            "Resolved {} {:?} to {} ({})",
            component, constraint, resolved.entry.version, resolved.provenance
        );
        state.emit(StagingEvent::Installing {
            component: component.to_string(),
            version: resolved.entry.version.to_string(),
            provenance: resolved.provenance,
        });

        let entry = &resolved.entry;
        let fetched = self
            .cache
            .fetch(&entry.uri, &entry.sha256, self.policy)
            .await
            .map_err(fail)?;
        state.emit(StagingEvent::Fetched {
            locator: entry.uri.clone(),
            checksum: fetched.checksum.clone(),
            source: fetched.source,
        });

        let archive = fetched.path.clone();
        let dest = dep_dir.join(component);
        tokio::task::spawn_blocking(move || extract_tarball(&archive, &dest))
            .await
            .map_err(|e| fail(NodepackError::Internal(format!("extract task failed: {e}"))))?
            .map_err(fail)?;

        Ok(resolved)
    }

    async fn run_script(
        &self,
        manager: PackageManager,
        app_dir: &Path,
        script: &str,
        tools: &ToolEnv,
        state: &mut RunState<'_>,
    ) -> Result<(), NodepackError> {
        state.emit(StagingEvent::ScriptRun {
            script: script.to_string(),
            manager,
        });
        self.installer.run_script(manager, app_dir, script, tools).await
    }
}

fn has_script(script: Option<&str>) -> bool {
    script.is_some_and(|s| !s.trim().is_empty())
}
