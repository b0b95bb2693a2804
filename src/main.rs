//! Contentbuild - Command-line tool for compiling game assets in a disposable workspace

use std::process::ExitCode;

use contentbuild::cli;

fn main() -> ExitCode {
    cli::run()
}
