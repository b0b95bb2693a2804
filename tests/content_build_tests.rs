//! Content Build Test Suite
//!
//! Integration tests for workspace lifecycle and builds:
//!
//! - Workspace allocation and reaping
//! - Finalization of the workspace hierarchy
//! - Asset registration
//! - Build orchestration and error isolation between builds

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use serial_test::serial;

use contentbuild::build::{
    BuildEngine, BuildError, BuildHandle, BuildMessage, BuildRequest, BuildResult, EngineError,
    EngineStatus, ErrorSink, PassthroughEngine, RegistryError,
};
use contentbuild::session::{BuildSession, SessionError, SessionOptions};
use contentbuild::workspace::{
    current_pid, finalize, reap, CleanupDepth, ProcessTable, SessionFactory,
};

// ============================================================================
// Test Utilities
// ============================================================================

const TOOL: &str = "contentbuild-tests";

/// Process table with an explicit set of live pids.
struct LivePids(Vec<u32>);

impl ProcessTable for LivePids {
    fn is_alive(&self, pid: u32) -> bool {
        self.0.contains(&pid)
    }
}

/// Engine that counts submissions and delegates to the passthrough engine.
#[derive(Default)]
struct CountingEngine {
    submissions: AtomicUsize,
    inner: PassthroughEngine,
}

impl BuildEngine for CountingEngine {
    fn name(&self) -> &str {
        "counting"
    }

    fn submit(
        &self,
        request: BuildRequest,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<BuildHandle, EngineError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.inner.submit(request, sink)
    }
}

/// Engine whose Nth build (0-based) fails with a fixed message when `fail_on` says so.
struct PatternEngine {
    calls: AtomicUsize,
    fail_on: Vec<bool>,
}

impl BuildEngine for PatternEngine {
    fn name(&self) -> &str {
        "pattern"
    }

    fn submit(
        &self,
        _request: BuildRequest,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<BuildHandle, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail_on.get(call).copied().unwrap_or(false);
        let (completion, handle) = BuildHandle::pair();
        std::thread::spawn(move || {
            if fail {
                sink.report(BuildMessage::new(format!("build {} failed", call)));
                completion.complete(EngineStatus::Failed);
            } else {
                completion.complete(EngineStatus::Succeeded);
            }
        });
        Ok(handle)
    }
}

fn options(temp: &TempDir) -> SessionOptions {
    SessionOptions {
        temp_root: temp.path().to_path_buf(),
        tool_identity: TOOL.to_string(),
        ..SessionOptions::default()
    }
}

fn open_session(
    temp: &TempDir,
    factory: &SessionFactory,
    engine: Arc<dyn BuildEngine>,
) -> BuildSession {
    BuildSession::open_with(factory, &LivePids(vec![current_pid()]), options(temp), engine)
        .unwrap()
}

/// Create a test file with content.
fn create_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

fn base_dir(temp: &TempDir) -> PathBuf {
    temp.path().join(TOOL)
}

// ============================================================================
// Workspace Lifecycle Tests
// ============================================================================

#[test]
fn test_reap_removes_dead_and_keeps_live() {
    let temp = TempDir::new().unwrap();
    let base = base_dir(&temp);
    for pid in ["100", "200", "999"] {
        fs::create_dir_all(base.join(pid).join("1")).unwrap();
    }

    let report = reap(&base, 999, &LivePids(vec![200]));

    assert_eq!(report.removed, vec![100]);
    assert_eq!(report.live, vec![200]);
    assert!(!base.join("100").exists());
    assert!(base.join("200/1").exists());
    assert!(base.join("999/1").exists());
}

#[test]
fn test_open_reaps_crashed_sibling() {
    let temp = TempDir::new().unwrap();
    let stale = base_dir(&temp).join("4000001").join("3");
    create_test_file(&stale, "bin/Content/leftover.xnb", "junk");

    let factory = SessionFactory::new();
    let session = open_session(&temp, &factory, Arc::new(PassthroughEngine::new()));

    assert_eq!(session.reaped().removed, vec![4000001]);
    assert!(!base_dir(&temp).join("4000001").exists());
    assert!(session.workspace().exists());
}

#[test]
fn test_sessions_in_one_process_do_not_collide() {
    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();

    let first = open_session(&temp, &factory, Arc::new(PassthroughEngine::new()));
    let second = open_session(&temp, &factory, Arc::new(PassthroughEngine::new()));

    assert_eq!(first.workspace().process_dir(), second.workspace().process_dir());
    assert_ne!(first.workspace().session_dir(), second.workspace().session_dir());
    assert_eq!(first.workspace().salt() + 1, second.workspace().salt());
}

#[test]
fn test_finalize_hierarchy() {
    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();
    let first = factory.allocate(temp.path(), TOOL).unwrap();
    let second = factory.allocate(temp.path(), TOOL).unwrap();
    let neighbour = base_dir(&temp).join("4000002").join("1");
    fs::create_dir_all(&neighbour).unwrap();

    assert_eq!(finalize(&first).unwrap(), CleanupDepth::Session);
    assert!(first.process_dir().exists());

    assert_eq!(finalize(&second).unwrap(), CleanupDepth::Process);
    assert!(!second.process_dir().exists());
    assert!(base_dir(&temp).exists());

    fs::remove_dir_all(base_dir(&temp).join("4000002")).unwrap();
    assert_eq!(finalize(&second).unwrap(), CleanupDepth::Base);
    assert!(!base_dir(&temp).exists());
}

#[test]
fn test_close_removes_whole_tree() {
    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();
    let source = create_test_file(temp.path(), "art/hero.png", "png");

    let mut session = open_session(&temp, &factory, Arc::new(PassthroughEngine::new()));
    session.add(&source).unwrap();
    assert!(session.build().unwrap().is_success());

    assert_eq!(session.close().unwrap(), CleanupDepth::Base);
    assert!(!base_dir(&temp).exists());
}

#[test]
#[serial]
fn test_open_uses_global_factory() {
    let temp = TempDir::new().unwrap();
    let engine: Arc<dyn BuildEngine> = Arc::new(PassthroughEngine::new());

    let first = BuildSession::open(options(&temp), engine.clone()).unwrap();
    let second = BuildSession::open(options(&temp), engine).unwrap();

    assert_eq!(first.workspace().pid(), current_pid());
    assert!(second.workspace().salt() > first.workspace().salt());
    assert_eq!(SessionFactory::global().last_salt(), second.workspace().salt());

    drop(first);
    drop(second);
    assert!(!base_dir(&temp).exists());
}

// ============================================================================
// Registration Tests
// ============================================================================

#[test]
fn test_unknown_extension_fails_before_engine() {
    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();
    let engine = Arc::new(CountingEngine::default());
    let mut session = open_session(&temp, &factory, engine.clone());

    let err = session.add(Path::new("notes.unknownext")).unwrap_err();

    assert!(matches!(err, RegistryError::UnknownExtension { .. }));
    assert!(session.assets().is_empty());
    assert_eq!(engine.submissions.load(Ordering::SeqCst), 0);
}

#[test]
fn test_clear_then_build_succeeds_with_no_outputs() {
    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();
    let engine = Arc::new(CountingEngine::default());
    let mut session = open_session(&temp, &factory, engine.clone());

    session.add(Path::new("missing/hero.png")).unwrap();
    session.clear();
    let result = session.build().unwrap();

    assert_eq!(result, BuildResult::Success);
    assert_eq!(engine.submissions.load(Ordering::SeqCst), 1);
    let dest = temp.path().join("dist");
    assert!(session.export_outputs(&dest).unwrap().is_empty());
}

#[test]
fn test_explicit_registration_overrides_convention() {
    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();
    let source = create_test_file(temp.path(), "data/level.bin", "level");

    let mut session = open_session(&temp, &factory, Arc::new(PassthroughEngine::new()));
    let entry = session.add_explicit(&source, "levels/one", Some("LevelImporter"), None).unwrap();
    assert_eq!(entry.importer.as_deref(), Some("LevelImporter"));
    assert!(entry.processor.is_none());

    assert!(session.build().unwrap().is_success());
    assert!(session.output_dir().join("levels/one.bin").is_file());
}

#[test]
fn test_names_escaping_output_are_rejected() {
    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();
    let source = create_test_file(temp.path(), "art/hero.png", "hero");
    let outside = temp.path().join("outside/abs");

    let mut session = open_session(&temp, &factory, Arc::new(PassthroughEngine::new()));
    for name in ["../../../../../../escaped".to_string(), outside.to_string_lossy().into_owned()] {
        let err = session.add_explicit(&source, &name, None, None).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)), "accepted '{}'", name);
    }

    assert!(session.build().unwrap().is_success());
    session.close().unwrap();
    assert!(!temp.path().join("outside").exists());
    assert!(!base_dir(&temp).exists());
}

// ============================================================================
// Build Tests
// ============================================================================

#[test]
fn test_build_and_export_outputs() {
    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();
    let hero = create_test_file(temp.path(), "art/hero.png", "hero");
    let theme = create_test_file(temp.path(), "audio/theme.ogg", "theme");

    let mut session = open_session(&temp, &factory, Arc::new(PassthroughEngine::new()));
    session.add(&hero).unwrap();
    session.add(&theme).unwrap();
    assert!(session.build().unwrap().is_success());

    let dest = temp.path().join("dist");
    let outputs = session.export_outputs(&dest).unwrap();
    assert_eq!(outputs, vec![dest.join("hero.png"), dest.join("theme.ogg")]);
    assert_eq!(fs::read_to_string(dest.join("hero.png")).unwrap(), "hero");
}

#[test]
fn test_duplicate_names_fail_build() {
    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();
    let first = create_test_file(temp.path(), "a/hero.png", "a");
    let second = create_test_file(temp.path(), "b/hero.png", "b");

    let mut session = open_session(&temp, &factory, Arc::new(PassthroughEngine::new()));
    session.add(&first).unwrap();
    session.add(&second).unwrap();
    let result = session.build().unwrap();

    assert!(result.is_failure());
    assert_eq!(result.error_lines().len(), 1);
    assert!(result.error_lines()[0].contains("duplicate asset name 'hero'"));
}

#[test]
fn test_missing_source_reports_failure() {
    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();

    let mut session = open_session(&temp, &factory, Arc::new(PassthroughEngine::new()));
    session.add(&temp.path().join("nowhere.png")).unwrap();
    let result = session.build().unwrap();

    let text = result.error_text().unwrap();
    assert!(text.contains("nowhere.png"));
    assert!(text.contains("source file not found"));
}

#[test]
fn test_errors_do_not_leak_between_builds() {
    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();
    let engine = Arc::new(PatternEngine {
        calls: AtomicUsize::new(0),
        fail_on: vec![true, false, true],
    });
    let session = open_session(&temp, &factory, engine);

    let first = session.build().unwrap();
    let second = session.build().unwrap();
    let third = session.build().unwrap();

    assert_eq!(first, BuildResult::Failure(vec!["build 0 failed".to_string()]));
    assert_eq!(second, BuildResult::Success);
    assert_eq!(third, BuildResult::Failure(vec!["build 2 failed".to_string()]));
}

#[test]
fn test_build_after_workspace_removed_is_error() {
    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();
    let session = open_session(&temp, &factory, Arc::new(PassthroughEngine::new()));

    fs::remove_dir_all(session.workspace().session_dir()).unwrap();

    assert!(session.build().is_err());
}

#[test]
fn test_engine_timeout_is_reported() {
    struct SilentEngine;

    impl BuildEngine for SilentEngine {
        fn name(&self) -> &str {
            "silent"
        }

        fn submit(
            &self,
            _request: BuildRequest,
            _sink: Arc<dyn ErrorSink>,
        ) -> Result<BuildHandle, EngineError> {
            let (completion, handle) = BuildHandle::pair();
            std::thread::spawn(move || {
                while !completion.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                completion.complete(EngineStatus::Failed);
            });
            Ok(handle)
        }
    }

    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();
    let opts = options(&temp).with_timeout(Some(Duration::from_millis(50)));
    let session =
        BuildSession::open_with(&factory, &LivePids(vec![]), opts, Arc::new(SilentEngine)).unwrap();

    let err = session.build().unwrap_err();
    assert!(matches!(err, BuildError::Engine(EngineError::TimedOut(_))), "unexpected error: {}", err);
}

/// Engine that keeps writing into the output directory for a while after
/// it is cancelled, and records how many of its jobs overlap.
struct SlowStopEngine {
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl BuildEngine for SlowStopEngine {
    fn name(&self) -> &str {
        "slow-stop"
    }

    fn submit(
        &self,
        request: BuildRequest,
        _sink: Arc<dyn ErrorSink>,
    ) -> Result<BuildHandle, EngineError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let (completion, handle) = BuildHandle::pair();
        let active = Arc::clone(&self.active);
        std::thread::spawn(move || {
            while !completion.is_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
            }
            std::thread::sleep(Duration::from_millis(200));
            fs::create_dir_all(&request.output_dir).unwrap();
            fs::write(request.output_dir.join("late.bin"), b"late").unwrap();
            active.fetch_sub(1, Ordering::SeqCst);
            completion.complete(EngineStatus::Failed);
        });
        Ok(handle)
    }
}

#[test]
fn test_timed_out_build_finishes_before_next_build_and_close() {
    let temp = TempDir::new().unwrap();
    let factory = SessionFactory::new();
    let max_active = Arc::new(AtomicUsize::new(0));
    let engine = SlowStopEngine {
        active: Arc::new(AtomicUsize::new(0)),
        max_active: Arc::clone(&max_active),
    };
    let opts = options(&temp).with_timeout(Some(Duration::from_millis(30)));
    let session =
        BuildSession::open_with(&factory, &LivePids(vec![]), opts, Arc::new(engine)).unwrap();

    for _ in 0..2 {
        let err = session.build().unwrap_err();
        assert!(matches!(err, BuildError::Engine(EngineError::TimedOut(_))));
    }
    assert_eq!(max_active.load(Ordering::SeqCst), 1);

    assert_eq!(session.close().unwrap(), CleanupDepth::Base);
    assert!(!base_dir(&temp).exists());
}

#[test]
fn test_invalid_tool_identity_is_rejected() {
    let temp = TempDir::new().unwrap();
    let opts = SessionOptions { tool_identity: "../escape".to_string(), ..options(&temp) };

    let err = BuildSession::open_with(
        &SessionFactory::new(),
        &LivePids(vec![]),
        opts,
        Arc::new(PassthroughEngine::new()),
    )
    .unwrap_err();

    assert!(matches!(err, SessionError::Workspace(_)));
}
