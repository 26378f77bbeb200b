//! Stage command - buildpack supply for one application

use crate::cache::{ArtifactCache, FetchPolicy, HttpDownloader};
use crate::cli::args::StageArgs;
use crate::cli::commands::{artifact_root, load_catalog};
use crate::config::Config;
use crate::deps::CommandInstaller;
use crate::error::{NodepackError, NodepackResult};
use crate::stage::{Orchestrator, StageDirs};
use crate::ui::{self, UiContext};
use std::sync::Arc;
use tracing::info;

/// Execute the stage command
pub async fn execute(args: StageArgs, config: &Config) -> NodepackResult<()> {
    if !args.build_dir.is_dir() {
        return Err(NodepackError::PathNotFound(args.build_dir));
    }

    let catalog = load_catalog(args.catalog.as_deref(), config).await?;
    let policy = FetchPolicy::from_air_gapped(args.air_gapped || config.cache.air_gapped);
    let root = artifact_root(args.artifact_dir, config, args.cache_dir.join("artifacts"));
    info!("Artifact cache at {} ({})", root.display(), policy);

    let downloader = Arc::new(HttpDownloader::new(&config.network)?);
    let cache = Arc::new(ArtifactCache::new(root, downloader));
    let installer = Arc::new(CommandInstaller::new(true));

    let ctx = UiContext::detect();
    let orchestrator = Orchestrator::new(catalog, cache, installer, policy)
        .with_observer(move |event| ui::event(&ctx, event));

    let mut dirs = StageDirs::new(args.build_dir, args.cache_dir);
    if let (Some(deps_dir), Some(deps_idx)) = (args.deps_dir, args.deps_idx) {
        dirs = dirs.with_deps(deps_dir, deps_idx);
    }

    let environ: Vec<(String, String)> = std::env::vars().collect();
    let result = orchestrator.stage(&dirs, &environ).await;

    if let Some(ref runtime) = result.runtime {
        info!(
            "Staged node {} ({})",
            runtime.entry.version, runtime.provenance
        );
    }
    result.outcome.map_err(NodepackError::from)
}
