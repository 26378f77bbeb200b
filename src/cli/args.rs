//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// nodepack - Node.js buildpack staging
///
/// Resolves and installs the Node.js runtime an application asks for, then
/// fills in whatever dependencies the application did not vendor.
#[derive(Parser, Debug)]
#[command(name = "nodepack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "NODEPACK_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stage an application (buildpack supply)
    Stage(StageArgs),

    /// Resolve a version constraint against the catalog
    Resolve(ResolveArgs),

    /// Manage the shared artifact cache
    Cache(CacheArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the stage command
#[derive(Parser, Debug)]
pub struct StageArgs {
    /// Application build directory
    pub build_dir: PathBuf,

    /// Staging cache directory, kept between builds
    pub cache_dir: PathBuf,

    /// Dependencies directory shared by all buildpacks
    #[arg(requires = "deps_idx")]
    pub deps_dir: Option<PathBuf>,

    /// This buildpack's index within the dependencies directory
    pub deps_idx: Option<String>,

    /// Catalog file (defaults to manifest.toml in the buildpack root)
    #[arg(long, env = "NODEPACK_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Shared artifact cache directory (defaults to <cache-dir>/artifacts)
    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,

    /// Never use the network; every artifact must already be cached
    #[arg(long)]
    pub air_gapped: bool,
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Component name (node, npm, yarn)
    pub component: String,

    /// npm-style constraint (catalog default when omitted)
    pub constraint: Option<String>,

    /// Catalog file (defaults to manifest.toml in the buildpack root)
    #[arg(long, env = "NODEPACK_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.air_gapped)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Artifact cache directory (defaults to cache.dir, then the user cache dir)
    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,

    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached artifacts
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove every cached artifact
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Remove temp files left by interrupted downloads
    Sweep {
        /// Only remove temp files older than N hours
        #[arg(long, default_value = "24")]
        hours: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_stage_supply_args() {
        let cli = Cli::parse_from(["nodepack", "stage", "/tmp/app", "/tmp/cache", "/tmp/deps", "0"]);
        match cli.command {
            Commands::Stage(args) => {
                assert_eq!(args.build_dir, PathBuf::from("/tmp/app"));
                assert_eq!(args.cache_dir, PathBuf::from("/tmp/cache"));
                assert_eq!(args.deps_dir, Some(PathBuf::from("/tmp/deps")));
                assert_eq!(args.deps_idx.as_deref(), Some("0"));
                assert!(!args.air_gapped);
            }
            _ => panic!("expected Stage command"),
        }
    }

    #[test]
    fn cli_parses_stage_without_deps() {
        let cli = Cli::parse_from(["nodepack", "stage", "app", "cache", "--air-gapped"]);
        match cli.command {
            Commands::Stage(args) => {
                assert!(args.deps_dir.is_none());
                assert!(args.air_gapped);
            }
            _ => panic!("expected Stage command"),
        }
    }

    #[test]
    fn cli_stage_deps_dir_requires_index() {
        assert!(Cli::try_parse_from(["nodepack", "stage", "app", "cache", "deps"]).is_err());
    }

    #[test]
    fn cli_parses_resolve() {
        let cli = Cli::parse_from(["nodepack", "resolve", "node", "4.x"]);
        match cli.command {
            Commands::Resolve(args) => {
                assert_eq!(args.component, "node");
                assert_eq!(args.constraint.as_deref(), Some("4.x"));
            }
            _ => panic!("expected Resolve command"),
        }
    }

    #[test]
    fn cli_parses_cache_sweep() {
        let cli = Cli::parse_from(["nodepack", "cache", "sweep", "--hours", "2"]);
        match cli.command {
            Commands::Cache(CacheArgs {
                action: CacheAction::Sweep { hours },
                ..
            }) => assert_eq!(hours, 2),
            _ => panic!("expected Cache sweep"),
        }
    }

    #[test]
    fn cli_verbose_levels() {
        let cli = Cli::parse_from(["nodepack", "config", "path"]);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::parse_from(["nodepack", "-vv", "config", "path"]);
        assert_eq!(cli.verbose, 2);
    }
}
