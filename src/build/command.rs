//! Engine that drives an external toolchain program.
//!
//! The request is written as a project file (see [`crate::build::project`]),
//! then the configured program is spawned with arguments in which the
//! placeholders `{project}`, `{output}`, `{intermediate}`, `{platform}` and
//! `{profile}` are substituted. Output lines matching the error pattern are
//! forwarded to the sink; the exit status decides success.

use crate::build::{
    write_project, BuildEngine, BuildHandle, BuildMessage, BuildRequest, Completion, EngineError,
    EngineStatus, ErrorSink,
};
use regex::Regex;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default arguments: pass the project file as a response file.
pub const DEFAULT_ARGS: &[&str] = &["/@:{project}"];

/// Default pattern selecting error lines from the toolchain's output.
pub const DEFAULT_ERROR_PATTERN: &str = r"(?i)\berror\b";

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long output is still read after the program exits. Descendants that
/// inherited the pipes (build servers) may keep them open indefinitely.
const OUTPUT_DRAIN_LIMIT: Duration = Duration::from_millis(500);

/// Engine backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
    error_pattern: Regex,
}

impl CommandEngine {
    /// Create an engine that runs `program` with the default arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: DEFAULT_ARGS.iter().map(|s| s.to_string()).collect(),
            error_pattern: Regex::new(DEFAULT_ERROR_PATTERN).expect("default pattern is valid"),
        }
    }

    /// Replace the argument template.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Replace the error line pattern.
    pub fn with_error_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.error_pattern = Regex::new(pattern)?;
        Ok(self)
    }

    /// The program this engine runs.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments for a request, with placeholders substituted.
    pub fn expand_args(&self, request: &BuildRequest) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{project}", &request.project_file.to_string_lossy())
                    .replace("{output}", &request.output_dir.to_string_lossy())
                    .replace("{intermediate}", &request.intermediate_dir.to_string_lossy())
                    .replace("{platform}", &request.platform)
                    .replace("{profile}", &request.profile)
            })
            .collect()
    }
}

impl BuildEngine for CommandEngine {
    fn name(&self) -> &str {
        "command"
    }

    fn submit(
        &self,
        request: BuildRequest,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<BuildHandle, EngineError> {
        fs::create_dir_all(&request.output_dir)?;
        fs::create_dir_all(&request.intermediate_dir)?;
        write_project(&request)?;

        let args = self.expand_args(&request);
        info!(program = %self.program.display(), ?args, "starting toolchain");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Unavailable {
                engine: self.program.display().to_string(),
                reason: e.to_string(),
            })?;

        let (drained_tx, drained) = mpsc::channel();
        let streams = [
            child.stdout.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
            child.stderr.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
        ];
        let mut readers = 0;
        for stream in streams.into_iter().flatten() {
            let pattern = self.error_pattern.clone();
            forward_errors(stream, pattern, Arc::clone(&sink), drained_tx.clone());
            readers += 1;
        }

        let (completion, handle) = BuildHandle::pair();
        let program = self.program.display().to_string();
        std::thread::Builder::new().name("command-build".to_string()).spawn(move || {
            supervise(child, Readers { drained, count: readers }, program, sink.as_ref(), completion)
        })?;
        Ok(handle)
    }
}

/// Output reader threads; each sends its matched-line count when its stream closes.
struct Readers {
    drained: Receiver<usize>,
    count: usize,
}

impl Readers {
    /// Collect reader counts until all streams closed or `limit` passed.
    ///
    /// Returns the number of reported lines and whether every stream closed.
    /// Readers still running are left detached.
    fn drain(self, limit: Duration) -> (usize, bool) {
        let deadline = Instant::now() + limit;
        let mut reported = 0;
        for _ in 0..self.count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.drained.recv_timeout(remaining) {
                Ok(count) => reported += count,
                Err(_) => return (reported, false),
            }
        }
        (reported, true)
    }
}

/// Forward matching lines from one output stream on a background thread.
fn forward_errors(
    stream: Box<dyn Read + Send>,
    pattern: Regex,
    sink: Arc<dyn ErrorSink>,
    drained: Sender<usize>,
) {
    std::thread::spawn(move || {
        let mut reported = 0;
        for line in BufReader::new(stream).lines().map_while(Result::ok) {
            debug!(target: "contentbuild::toolchain", "{}", line);
            let line = line.trim();
            if pattern.is_match(line) {
                sink.report(BuildMessage::new(line));
                reported += 1;
            }
        }
        let _ = drained.send(reported);
    });
}

fn supervise(
    mut child: Child,
    readers: Readers,
    program: String,
    sink: &dyn ErrorSink,
    completion: Completion,
) {
    let exit = wait_or_cancel(&mut child, &completion);

    // Forwarded lines should reach the sink before completion is signalled,
    // but a descendant holding the pipes open must not stall the build.
    let (reported, closed) = readers.drain(OUTPUT_DRAIN_LIMIT);
    if !closed {
        warn!(program = %program, "toolchain output still open after exit; no longer reading it");
    }

    let status = match exit {
        Ok(Some(status)) if status.success() => EngineStatus::Succeeded,
        Ok(Some(status)) => {
            if reported == 0 {
                sink.report(BuildMessage::new(format!("{} exited with {}", program, status)));
            }
            EngineStatus::Failed
        }
        Ok(None) => {
            sink.report(BuildMessage::new("build cancelled"));
            EngineStatus::Failed
        }
        Err(e) => {
            sink.report(BuildMessage::new(format!("cannot wait for {}: {}", program, e)));
            EngineStatus::Failed
        }
    };
    completion.complete(status);
}

/// Poll the child until it exits; `Ok(None)` means it was killed on cancellation.
fn wait_or_cancel(child: &mut Child, completion: &Completion) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if completion.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::ErrorCollector;
    use tempfile::TempDir;

    fn request(temp: &TempDir) -> BuildRequest {
        BuildRequest {
            assets: vec![],
            output_dir: temp.path().join("bin/Content"),
            intermediate_dir: temp.path().join("obj/Content"),
            project_file: temp.path().join("content.rsp"),
            platform: "DesktopGL".to_string(),
            profile: "HiDef".to_string(),
        }
    }

    #[test]
    fn test_expand_args() {
        let temp = TempDir::new().unwrap();
        let req = request(&temp);
        let engine = CommandEngine::new("mgcb").with_args(vec![
            "/@:{project}".to_string(),
            "--out={output}".to_string(),
            "{platform}/{profile}".to_string(),
        ]);

        let args = engine.expand_args(&req);
        assert_eq!(args[0], format!("/@:{}", req.project_file.display()));
        assert_eq!(args[1], format!("--out={}", req.output_dir.display()));
        assert_eq!(args[2], "DesktopGL/HiDef");
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let engine = CommandEngine::new(temp.path().join("no-such-toolchain"));
        let err = engine.submit(request(&temp), Arc::new(ErrorCollector::new())).unwrap_err();

        assert!(matches!(err, EngineError::Unavailable { .. }));
    }

    #[test]
    fn test_invalid_error_pattern() {
        assert!(CommandEngine::new("mgcb").with_error_pattern("(unclosed").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program_reports_matching_lines() {
        let temp = TempDir::new().unwrap();
        let engine = CommandEngine::new("sh").with_args(vec![
            "-c".to_string(),
            "echo 'Building hero.png'; echo 'hero.png: error: bad header' >&2; exit 1".to_string(),
        ]);
        let collector = Arc::new(ErrorCollector::new());

        let status = engine.submit(request(&temp), collector.clone()).unwrap().wait(None).unwrap();

        assert_eq!(status, EngineStatus::Failed);
        assert_eq!(collector.take_lines(), vec!["hero.png: error: bad header"]);
        assert!(temp.path().join("content.rsp").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_silent_failure_reports_exit_status() {
        let temp = TempDir::new().unwrap();
        let engine = CommandEngine::new("sh").with_args(vec!["-c".to_string(), "exit 3".to_string()]);
        let collector = Arc::new(ErrorCollector::new());

        let status = engine.submit(request(&temp), collector.clone()).unwrap().wait(None).unwrap();

        assert_eq!(status, EngineStatus::Failed);
        let lines = collector.take_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("sh exited with"));
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_program() {
        let temp = TempDir::new().unwrap();
        let engine = CommandEngine::new("sh").with_args(vec!["-c".to_string(), "echo ok".to_string()]);
        let status = engine
            .submit(request(&temp), Arc::new(ErrorCollector::new()))
            .unwrap()
            .wait(None)
            .unwrap();
        assert_eq!(status, EngineStatus::Succeeded);
    }

    #[cfg(unix)]
    #[test]
    fn test_background_descendant_does_not_hold_build() {
        let temp = TempDir::new().unwrap();
        let engine = CommandEngine::new("sh")
            .with_args(vec!["-c".to_string(), "sleep 3 & echo built; exit 0".to_string()]);
        let start = Instant::now();

        let status = engine
            .submit(request(&temp), Arc::new(ErrorCollector::new()))
            .unwrap()
            .wait(Some(Duration::from_secs(2)))
            .unwrap();

        assert_eq!(status, EngineStatus::Succeeded);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_program() {
        let temp = TempDir::new().unwrap();
        let engine = CommandEngine::new("sh").with_args(vec!["-c".to_string(), "sleep 30".to_string()]);
        let handle = engine.submit(request(&temp), Arc::new(ErrorCollector::new())).unwrap();

        let err = handle.wait(Some(Duration::from_millis(50))).unwrap_err();
        assert!(matches!(err, EngineError::TimedOut(_)));
    }
}
