//! Build orchestration.
//!
//! Submits one build request to the engine, blocks until the engine
//! signals completion, and turns the outcome into a [`BuildResult`].

use crate::build::{
    BuildEngine, BuildHandle, BuildRequest, BuildResult, EngineError, EngineStatus,
    ErrorCollector, ErrorSink,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// How long a timed-out build waits for the cancelled engine to stop.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Infrastructure error during a build call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// Another build on the same session has not completed yet
    #[error("A build is already in progress for this session")]
    Busy,
    /// The session's workspace directory no longer exists
    #[error("Workspace directory '{0}' is missing")]
    WorkspaceMissing(PathBuf),
    /// The engine failed independently of the assets
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Lifecycle of the orchestrator's current build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// No build has run yet
    Idle,
    /// Request handed to the engine
    Submitted,
    /// Blocked on the engine's completion signal
    Waiting,
    /// Last build finished (successfully or not)
    Completed,
    /// Last build timed out and its engine job has not stopped yet
    Cancelling,
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildState::Idle => write!(f, "idle"),
            BuildState::Submitted => write!(f, "submitted"),
            BuildState::Waiting => write!(f, "waiting"),
            BuildState::Completed => write!(f, "completed"),
            BuildState::Cancelling => write!(f, "cancelling"),
        }
    }
}

/// Runs synchronous builds against an engine, one at a time.
///
/// A build that times out is cancelled. If the engine does not stop within
/// the cancel grace period, its handle is kept and every later build is
/// refused with [`BuildError::Busy`] until the engine signals completion.
pub struct BuildOrchestrator {
    engine: Arc<dyn BuildEngine>,
    state: Mutex<BuildState>,
    pending: Mutex<Option<BuildHandle>>,
    timeout: Option<Duration>,
    cancel_grace: Duration,
}

impl std::fmt::Debug for BuildOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOrchestrator")
            .field("engine", &self.engine.name())
            .field("state", &self.state())
            .field("timeout", &self.timeout)
            .field("cancel_grace", &self.cancel_grace)
            .finish()
    }
}

impl BuildOrchestrator {
    /// Create an orchestrator for `engine`.
    pub fn new(engine: Arc<dyn BuildEngine>) -> Self {
        Self {
            engine,
            state: Mutex::new(BuildState::Idle),
            pending: Mutex::new(None),
            timeout: None,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }

    /// Limit how long a build may wait for the engine.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Limit how long a timed-out build waits for the engine to stop.
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// The configured timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The engine builds are submitted to.
    pub fn engine(&self) -> &dyn BuildEngine {
        self.engine.as_ref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BuildState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run one build and block until it completes.
    ///
    /// Errors collected during this call only are returned in
    /// [`BuildResult::Failure`]. A concurrent call on the same orchestrator
    /// fails with [`BuildError::Busy`] instead of racing.
    pub fn run(&self, request: BuildRequest) -> Result<BuildResult, BuildError> {
        let _guard = self.begin()?;

        let assets = request.assets.len();
        let collector = Arc::new(ErrorCollector::new());
        let sink: Arc<dyn ErrorSink> = collector.clone();

        debug!(engine = self.engine.name(), assets, "submitting build");
        let handle = self.engine.submit(request, sink)?;

        self.set_state(BuildState::Waiting);
        let status = match handle.wait(self.timeout) {
            Ok(status) => status,
            Err(e @ EngineError::TimedOut(_)) => {
                if !handle.wait_stopped(self.cancel_grace) {
                    warn!(
                        engine = self.engine.name(),
                        grace = ?self.cancel_grace,
                        "cancelled build is still running; refusing new builds until it stops"
                    );
                    *self.pending.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        // The completion signal was received after the engine's last report.
        let lines = collector.take_lines();
        match status {
            EngineStatus::Succeeded => {
                if !lines.is_empty() {
                    warn!(count = lines.len(), "engine succeeded but reported errors; ignoring");
                }
                Ok(BuildResult::Success)
            }
            EngineStatus::Failed => Ok(BuildResult::Failure(lines)),
        }
    }

    /// Wait up to `limit` for a cancelled engine job to stop.
    ///
    /// Returns `true` when no engine job of this orchestrator is left
    /// running. Call before removing the directories a build writes into.
    pub fn settle(&self, limit: Duration) -> bool {
        if !self.drain_pending(limit) {
            return false;
        }
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state == BuildState::Cancelling {
            *state = BuildState::Completed;
        }
        true
    }

    fn begin(&self) -> Result<StateGuard<'_>, BuildError> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match *state {
            BuildState::Submitted | BuildState::Waiting => Err(BuildError::Busy),
            BuildState::Cancelling if !self.drain_pending(Duration::ZERO) => Err(BuildError::Busy),
            BuildState::Idle | BuildState::Completed | BuildState::Cancelling => {
                *state = BuildState::Submitted;
                Ok(StateGuard { orchestrator: self })
            }
        }
    }

    fn drain_pending(&self, limit: Duration) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        match pending.as_ref() {
            None => true,
            Some(handle) if handle.wait_stopped(limit) => {
                *pending = None;
                true
            }
            Some(_) => false,
        }
    }

    fn set_state(&self, next: BuildState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = next;
    }
}

/// Moves the orchestrator out of its in-flight states however the build call ends.
struct StateGuard<'a> {
    orchestrator: &'a BuildOrchestrator,
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        let next = if self.orchestrator.pending.lock().unwrap_or_else(|p| p.into_inner()).is_some() {
            BuildState::Cancelling
        } else {
            BuildState::Completed
        };
        self.orchestrator.set_state(next);
    }
}
