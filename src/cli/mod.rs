//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod reap;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use glob::glob;

use crate::config::loader::{find_config, load_config, merge_cli_overrides, CliOverrides};
use crate::config::ContentConfig;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Expand input arguments into file paths.
///
/// Arguments containing glob metacharacters are expanded (matches sorted);
/// anything else is taken as a literal path.
pub fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>, String> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.contains(['*', '?', '[']) {
            files.push(PathBuf::from(input));
            continue;
        }

        let paths = glob(input).map_err(|e| format!("Invalid glob pattern '{}': {}", input, e))?;
        let mut matched: Vec<PathBuf> =
            paths.filter_map(Result::ok).filter(|p| p.is_file()).collect();
        if matched.is_empty() {
            return Err(format!("No files match '{}'", input));
        }
        matched.sort();
        files.extend(matched);
    }
    Ok(files)
}

/// Contentbuild - compile game assets in a disposable workspace
#[derive(Parser)]
#[command(name = "cbuild")]
#[command(about = "Contentbuild - compile game assets through a content toolchain in a disposable workspace")]
#[command(version)]
pub struct Cli {
    /// Path to content.toml (default: search upward from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the workspace tree (overrides workspace.temp_root)
    #[arg(long, global = true)]
    pub temp_root: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build assets and copy the compiled output to a directory
    Build {
        /// Asset files or glob patterns (e.g. "art/**/*.png")
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output directory for compiled assets
        #[arg(short, long, default_value = "build")]
        out: PathBuf,

        /// Logical asset name (single input only; default: file stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Importer to use instead of the extension default.
        /// Giving --name, --importer or --processor registers assets explicitly;
        /// a stage left out is auto-detected (importer) or skipped (processor)
        #[arg(long)]
        importer: Option<String>,

        /// Processor to use instead of the extension default
        #[arg(long)]
        processor: Option<String>,

        /// Target platform (overrides build.platform)
        #[arg(long)]
        platform: Option<String>,

        /// Target profile (overrides build.profile)
        #[arg(long)]
        profile: Option<String>,

        /// Give up on the engine after this many seconds
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove workspaces left behind by processes that no longer exist
    Reap,
}

/// Install the tracing subscriber used by the binary.
fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load configuration from an explicit path or by discovery, then apply overrides.
pub(crate) fn resolve_config(
    path: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<ContentConfig, String> {
    let path = path.map(Path::to_path_buf).or_else(find_config);
    if let Some(ref p) = path {
        tracing::info!(path = %p.display(), "using config");
    }

    let mut config = load_config(path.as_deref()).map_err(|e| format!("Error loading config: {}", e))?;
    merge_cli_overrides(&mut config, overrides);
    Ok(config)
}

/// Parse arguments and run the selected command.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Build {
            inputs,
            out,
            name,
            importer,
            processor,
            platform,
            profile,
            timeout,
            json,
        } => build::run_build(build::BuildArgs {
            config: cli.config,
            inputs,
            out,
            name,
            importer,
            processor,
            overrides: CliOverrides {
                platform,
                profile,
                timeout_secs: timeout,
                temp_root: cli.temp_root,
            },
            json,
        }),
        Commands::Reap => {
            let overrides = CliOverrides { temp_root: cli.temp_root, ..Default::default() };
            reap::run_reap(cli.config.as_deref(), &overrides)
        }
    }
}
