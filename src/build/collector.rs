//! Error collection during a build pass.
//!
//! The engine reports asset errors to an [`ErrorSink`] that is injected
//! into each build call. The orchestrator creates a fresh
//! [`ErrorCollector`] per call, so errors can never leak from one build
//! into the next, and it reads the collected lines only after the
//! engine's completion signal has been received.

use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// One error reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMessage {
    /// Source file the error relates to, if known
    pub file: Option<PathBuf>,
    /// Diagnostic text
    pub message: String,
}

impl BuildMessage {
    /// Create an error not tied to a particular file.
    pub fn new(message: impl Into<String>) -> Self {
        Self { file: None, message: message.into() }
    }

    /// Create an error for a specific source file.
    pub fn for_file(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self { file: Some(file.into()), message: message.into() }
    }
}

impl std::fmt::Display for BuildMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}: {}", file.display(), self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Receiver for errors reported by an engine.
///
/// Engines may report from any thread.
pub trait ErrorSink: Send + Sync {
    /// Record an error.
    fn report(&self, error: BuildMessage);
}

/// Sink that accumulates formatted error lines in report order.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    lines: Mutex<Vec<String>>,
}

impl ErrorCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of errors collected so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no errors were collected.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take the collected lines, leaving the collector empty.
    pub fn take_lines(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock())
    }

    // A poisoned lock only means a reporting thread panicked mid-push;
    // the lines already recorded are still valid.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ErrorSink for ErrorCollector {
    fn report(&self, error: BuildMessage) {
        debug!(%error, "engine reported error");
        self.lock().push(error.to_string());
    }
}
