//! Reap command implementation

use std::path::Path;
use std::process::ExitCode;

use super::{resolve_config, EXIT_ERROR, EXIT_SUCCESS};
use crate::config::loader::CliOverrides;
use crate::workspace::{current_pid, reap, SystemProcessTable};

/// Run the reap command
pub fn run_reap(config_path: Option<&Path>, overrides: &CliOverrides) -> ExitCode {
    let config = match resolve_config(config_path, overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let base = config.temp_root().join(&config.workspace.tool);
    let report = reap(&base, current_pid(), &SystemProcessTable::new());

    if report.removed.is_empty() {
        println!("No stale workspaces under {}", base.display());
    } else {
        println!("Removed {} stale workspace(s) under {}", report.removed.len(), base.display());
        for pid in &report.removed {
            println!("  - {}", pid);
        }
    }
    if !report.live.is_empty() {
        println!("{} workspace(s) still in use", report.live.len());
    }

    ExitCode::from(EXIT_SUCCESS)
}
