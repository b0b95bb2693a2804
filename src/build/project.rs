//! Project (response) file generation.
//!
//! The project file is regenerated from the request on every build, so a
//! cleared registry is always reflected in what the toolchain sees.
//! Stage switches persist until changed, so every asset writes both
//! `/importer:` and `/processor:`; an empty value means auto-detect for
//! the importer and pass-through for the processor.

use crate::build::BuildRequest;
use std::fmt::Write as _;
use std::fs;
use std::io;

/// Render the project file contents for a request.
pub fn render_project(request: &BuildRequest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "/outputDir:{}", request.output_dir.display());
    let _ = writeln!(out, "/intermediateDir:{}", request.intermediate_dir.display());
    let _ = writeln!(out, "/platform:{}", request.platform);
    let _ = writeln!(out, "/profile:{}", request.profile);

    for asset in &request.assets {
        out.push('\n');
        let _ = writeln!(out, "/importer:{}", asset.importer.as_deref().unwrap_or(""));
        let _ = writeln!(out, "/processor:{}", asset.processor.as_deref().unwrap_or(""));
        let _ = writeln!(out, "/build:{};{}", asset.source.display(), asset.name);
    }
    out
}

/// Write the project file for a request to `request.project_file`.
pub fn write_project(request: &BuildRequest) -> io::Result<()> {
    if let Some(parent) = request.project_file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&request.project_file, render_project(request))
}
