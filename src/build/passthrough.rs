//! In-process engine that copies sources verbatim.
//!
//! Useful when assets need no transformation and as a reference engine for
//! tests: it enforces the same build-time rules a real toolchain does
//! (sources must exist, logical names must be unique).

use crate::build::{
    is_contained_name, BuildEngine, BuildHandle, BuildMessage, BuildRequest, Completion,
    EngineError, EngineStatus, ErrorSink,
};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Engine that writes each source to `<output>/<name>.<ext>`.
#[derive(Debug, Default, Clone)]
pub struct PassthroughEngine;

impl PassthroughEngine {
    /// Create a new passthrough engine.
    pub fn new() -> Self {
        Self
    }
}

impl BuildEngine for PassthroughEngine {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn submit(
        &self,
        request: BuildRequest,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<BuildHandle, EngineError> {
        fs::create_dir_all(&request.output_dir)?;

        let (completion, handle) = BuildHandle::pair();
        std::thread::Builder::new()
            .name("passthrough-build".to_string())
            .spawn(move || run(request, sink.as_ref(), completion))?;
        Ok(handle)
    }
}

fn run(request: BuildRequest, sink: &dyn ErrorSink, completion: Completion) {
    let mut seen = HashSet::new();
    let mut failed = false;

    for asset in &request.assets {
        if completion.is_cancelled() {
            sink.report(BuildMessage::new("build cancelled"));
            failed = true;
            break;
        }

        if !seen.insert(asset.name.as_str()) {
            sink.report(BuildMessage::for_file(
                &asset.source,
                format!("duplicate asset name '{}'", asset.name),
            ));
            failed = true;
            continue;
        }

        if !is_contained_name(&asset.name) {
            sink.report(BuildMessage::for_file(
                &asset.source,
                format!("asset name '{}' escapes the output directory", asset.name),
            ));
            failed = true;
            continue;
        }

        let mut target = request.output_dir.join(&asset.name);
        if let Some(ext) = asset.source.extension() {
            let mut file_name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            file_name.push(".");
            file_name.push(ext);
            target.set_file_name(file_name);
        }

        match copy_asset(&asset.source, &target) {
            Ok(()) => debug!(source = %asset.source.display(), target = %target.display(), "copied asset"),
            Err(e) => {
                let message = if e.kind() == io::ErrorKind::NotFound {
                    "source file not found".to_string()
                } else {
                    format!("cannot copy asset: {}", e)
                };
                sink.report(BuildMessage::for_file(&asset.source, message));
                failed = true;
            }
        }
    }

    completion.complete(if failed { EngineStatus::Failed } else { EngineStatus::Succeeded });
}

fn copy_asset(source: &Path, target: &Path) -> io::Result<()> {
    if !source.is_file() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "source file not found"));
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, target).map(|_| ())
}
