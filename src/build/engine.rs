//! Interface to the asset transformation engine.
//!
//! An engine accepts a [`BuildRequest`] plus an [`ErrorSink`], starts
//! building asynchronously, and returns a [`BuildHandle`] the caller can
//! block on. The engine keeps the matching [`Completion`] and signals it
//! exactly once, after its last report to the sink.

use crate::build::{AssetEntry, ErrorSink};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Infrastructure failure of the engine, as opposed to asset errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The engine could not be started
    #[error("Build engine '{engine}' unavailable: {reason}")]
    Unavailable { engine: String, reason: String },
    /// IO error while preparing or running the build
    #[error("Build engine IO error: {0}")]
    Io(#[from] std::io::Error),
    /// No completion signal within the configured timeout
    #[error("Build did not complete within {0:?}")]
    TimedOut(Duration),
    /// The engine went away without signalling completion
    #[error("Build engine stopped without signalling completion")]
    Disconnected,
}

/// Overall result code reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// All assets built
    Succeeded,
    /// At least one asset failed
    Failed,
}

/// Snapshot of everything the engine needs for one build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Assets in registration order
    pub assets: Vec<AssetEntry>,
    /// Directory that receives compiled artifacts
    pub output_dir: PathBuf,
    /// Directory for engine intermediates
    pub intermediate_dir: PathBuf,
    /// Where the project representation may be written
    pub project_file: PathBuf,
    /// Target platform name
    pub platform: String,
    /// Target profile name
    pub profile: String,
}

/// Asset transformation engine.
pub trait BuildEngine: Send + Sync {
    /// Short engine name for diagnostics.
    fn name(&self) -> &str;

    /// Start a build and return its completion handle.
    ///
    /// Errors returned here are infrastructure failures; asset failures
    /// are reported through `sink` and an [`EngineStatus::Failed`] signal.
    fn submit(&self, request: BuildRequest, sink: Arc<dyn ErrorSink>)
        -> Result<BuildHandle, EngineError>;
}

/// Engine side of a build: signals completion and observes cancellation.
#[derive(Debug)]
pub struct Completion {
    done: Sender<EngineStatus>,
    cancelled: Arc<AtomicBool>,
}

impl Completion {
    /// Signal the final status. Consumes the completion so it fires once.
    pub fn complete(self, status: EngineStatus) {
        // The caller may have timed out and dropped its handle.
        let _ = self.done.send(status);
    }

    /// Whether the caller asked the build to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Caller side of a build: a waitable completion signal.
#[derive(Debug)]
pub struct BuildHandle {
    done: Receiver<EngineStatus>,
    cancelled: Arc<AtomicBool>,
}

impl BuildHandle {
    /// Create a connected completion/handle pair.
    pub fn pair() -> (Completion, BuildHandle) {
        let (tx, rx) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        (
            Completion { done: tx, cancelled: Arc::clone(&cancelled) },
            BuildHandle { done: rx, cancelled },
        )
    }

    /// Ask the engine to stop as soon as it can.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Block until the engine signals completion.
    ///
    /// With a timeout, expiry requests cancellation and returns
    /// [`EngineError::TimedOut`]. The engine may still be running at that
    /// point; use [`BuildHandle::wait_stopped`] to wait for it to wind down.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<EngineStatus, EngineError> {
        match timeout {
            None => self.done.recv().map_err(|_| EngineError::Disconnected),
            Some(limit) => match self.done.recv_timeout(limit) {
                Ok(status) => Ok(status),
                Err(RecvTimeoutError::Timeout) => {
                    self.cancel();
                    Err(EngineError::TimedOut(limit))
                }
                Err(RecvTimeoutError::Disconnected) => Err(EngineError::Disconnected),
            },
        }
    }

    /// Wait up to `limit` for the engine to stop after cancellation.
    ///
    /// Returns `true` once the engine has signalled completion or dropped
    /// its side of the pair.
    pub fn wait_stopped(&self, limit: Duration) -> bool {
        !matches!(self.done.recv_timeout(limit), Err(RecvTimeoutError::Timeout))
    }
}
