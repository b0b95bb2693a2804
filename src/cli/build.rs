//! Build command implementation

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use serde::Serialize;

use super::{expand_inputs, resolve_config, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::build::{AssetEntry, BuildResult};
use crate::config::loader::CliOverrides;
use crate::session::{engine_from_config, BuildSession, SessionOptions};

/// Arguments for the build command
#[derive(Debug, Clone)]
pub struct BuildArgs {
    pub config: Option<PathBuf>,
    pub inputs: Vec<String>,
    pub out: PathBuf,
    pub name: Option<String>,
    pub importer: Option<String>,
    pub processor: Option<String>,
    pub overrides: CliOverrides,
    pub json: bool,
}

/// JSON report printed with `--json`
#[derive(Debug, Serialize)]
struct BuildReport<'a> {
    #[serde(flatten)]
    result: &'a BuildResult,
    assets: &'a [AssetEntry],
    outputs: Vec<PathBuf>,
}

/// Run the build command
pub fn run_build(args: BuildArgs) -> ExitCode {
    let config = match resolve_config(args.config.as_deref(), &args.overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let files = match expand_inputs(&args.inputs) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };
    if args.name.is_some() && files.len() != 1 {
        eprintln!("Error: --name requires exactly one input file (got {})", files.len());
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    let engine = match engine_from_config(&config.engine) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let mut session = match BuildSession::open(SessionOptions::from_config(&config), engine) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let explicit = args.name.is_some() || args.importer.is_some() || args.processor.is_some();
    for file in &files {
        let registered = if explicit {
            let name = args.name.clone().unwrap_or_else(|| {
                file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
            });
            session.add_explicit(file, &name, args.importer.as_deref(), args.processor.as_deref())
        } else {
            session.add(file)
        };
        if let Err(e) = registered {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    }

    let start = Instant::now();
    let result = match session.build() {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Build error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let duration = start.elapsed();

    let outputs = if result.is_success() {
        match session.export_outputs(&args.out) {
            Ok(outputs) => outputs,
            Err(e) => {
                eprintln!("Error: failed to copy output to {}: {}", args.out.display(), e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
    } else {
        Vec::new()
    };

    if args.json {
        let report = BuildReport { result: &result, assets: session.assets(), outputs };
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: {}", e),
        }
    } else if let Some(errors) = result.error_text() {
        eprintln!("{}", result.summary(session.assets().len(), duration));
        eprintln!("{}", errors);
    } else {
        println!("{}", result.summary(session.assets().len(), duration));
        println!("Output: {} ({} files)", args.out.display(), outputs.len());
    }

    if let Err(e) = session.close() {
        tracing::warn!(error = %e, "workspace cleanup failed");
    }

    if result.is_success() {
        ExitCode::from(EXIT_SUCCESS)
    } else {
        ExitCode::from(EXIT_ERROR)
    }
}
