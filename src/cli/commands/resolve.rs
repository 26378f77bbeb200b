//! Resolve command - show which catalog version a constraint selects

use crate::catalog::{resolve, ResolvedVersion};
use crate::cli::args::{OutputFormat, ResolveArgs};
use crate::cli::commands::load_catalog;
use crate::config::Config;
use crate::error::{NodepackError, NodepackResult};
use crate::ui::{self, UiContext};
use serde::Serialize;

#[derive(Serialize)]
struct ResolvedJson<'a> {
    component: &'a str,
    constraint: Option<&'a str>,
    version: String,
    provenance: String,
    uri: &'a str,
    sha256: &'a str,
}

/// Execute the resolve command
pub async fn execute(args: ResolveArgs, config: &Config) -> NodepackResult<()> {
    let catalog = load_catalog(args.catalog.as_deref(), config).await?;
    if catalog.entries(&args.component).is_empty() {
        return Err(NodepackError::User(format!(
            "Unknown component '{}' (catalog has: {})",
            args.component,
            catalog.components().collect::<Vec<_>>().join(", ")
        )));
    }
    let resolved = resolve(&catalog, &args.component, args.constraint.as_deref())?;

    match args.format {
        OutputFormat::Table => print_table(&args, &resolved, &catalog.versions_display(&args.component)),
        OutputFormat::Json => print_json(&args, &resolved)?,
        OutputFormat::Plain => println!("{}", resolved.entry.version),
    }
    Ok(())
}

fn print_table(args: &ResolveArgs, resolved: &ResolvedVersion, available: &str) {
    let ctx = UiContext::detect();
    let entry = &resolved.entry;

    ui::header(&ctx, &format!("{} {}", entry.name, entry.version));
    ui::key_value(&ctx, "constraint", args.constraint.as_deref().unwrap_or("(default)"));
    ui::key_value(&ctx, "provenance", &resolved.provenance.to_string());
    ui::key_value(&ctx, "kind", &entry.kind.to_string());
    ui::key_value(&ctx, "uri", &entry.uri);
    ui::key_value(&ctx, "sha256", &entry.sha256);
    ui::key_value(&ctx, "available", available);
}

fn print_json(args: &ResolveArgs, resolved: &ResolvedVersion) -> NodepackResult<()> {
    let entry = &resolved.entry;
    let json = ResolvedJson {
        component: &args.component,
        constraint: args.constraint.as_deref(),
        version: entry.version.to_string(),
        provenance: resolved.provenance.to_string(),
        uri: &entry.uri,
        sha256: &entry.sha256,
    };
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
