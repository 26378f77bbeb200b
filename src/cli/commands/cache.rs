//! Cache command - inspect and prune the shared artifact cache

use crate::cache::{format_bytes, ArtifactCache, CacheEntry, HttpDownloader};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::cli::commands::artifact_root;
use crate::config::Config;
use crate::error::NodepackResult;
use crate::ui::{self, UiContext};
use console::style;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> NodepackResult<()> {
    let fallback = dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nodepack")
        .join("artifacts");
    let root = artifact_root(args.artifact_dir, config, fallback);
    let cache = ArtifactCache::new(root, Arc::new(HttpDownloader::new(&config.network)?));

    match args.action {
        CacheAction::List { format } => list_artifacts(&cache, format).await,
        CacheAction::Clear { yes } => clear_artifacts(&cache, yes).await,
        CacheAction::Sweep { hours } => sweep_partials(&cache, hours).await,
    }
}

/// List all published artifacts
async fn list_artifacts(cache: &ArtifactCache, format: OutputFormat) -> NodepackResult<()> {
    let entries = cache.list().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.checksum);
            }
        }
        OutputFormat::Table if entries.is_empty() => {
            println!("No cached artifacts in {}.", cache.root().display());
        }
        OutputFormat::Table => print_table(&entries),
    }
    Ok(())
}

fn print_table(entries: &[CacheEntry]) {
    println!("{:<14} {:<10} {:<18} {}", "CHECKSUM", "SIZE", "PUBLISHED", "PATH");
    println!("{}", "-".repeat(80));

    for entry in entries {
        let published = entry
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<14} {:<10} {:<18} {}",
            entry.short_checksum(),
            format_bytes(entry.size),
            published,
            entry.path.display()
        );
    }

    let total: u64 = entries.iter().map(|e| e.size).sum();
    println!();
    println!("Total: {} artifact(s), {}", entries.len(), format_bytes(total));
}

/// Remove every cached artifact
async fn clear_artifacts(cache: &ArtifactCache, skip_confirm: bool) -> NodepackResult<()> {
    let ctx = UiContext::detect();
    let entries = cache.list().await?;

    if entries.is_empty() {
        println!("No cached artifacts to clear.");
        return Ok(());
    }

    if !skip_confirm {
        print!(
            "Remove {} artifact(s) from {}? [y/N] ",
            entries.len(),
            cache.root().display()
        );
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            ui::warning(&ctx, "Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let removed = cache.clear().await?;
    println!("{} cleared {} artifact(s)", style("✓").green(), removed);
    Ok(())
}

/// Remove temp files of interrupted downloads
async fn sweep_partials(cache: &ArtifactCache, hours: u64) -> NodepackResult<()> {
    let ctx = UiContext::detect();
    let removed = cache
        .sweep_partials(sweep_age(hours))
        .await?;

    if removed == 0 {
        ui::info(&ctx, &format!("No partial downloads older than {hours}h."));
    } else {
        ui::step_ok(&ctx, &format!("Removed {removed} partial download(s)"));
    }
    Ok(())
}

fn sweep_age(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_age_saturates() {
        assert_eq!(sweep_age(24), Duration::from_secs(86_400));
        assert_eq!(sweep_age(u64::MAX), Duration::from_secs(u64::MAX));
    }
}
