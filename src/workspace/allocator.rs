//! Workspace allocation.

use super::{current_pid, Workspace, WorkspaceError};
use std::fs;
use std::path::{Component, Path};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static GLOBAL_FACTORY: SessionFactory = SessionFactory::new();

/// Hands out unique session directories for the current process.
///
/// The salt counter starts at zero and is pre-incremented, so the first
/// session of a process gets salt `1`. It is never reset: the process-wide
/// instance lives until the process exits, at which point the pid itself
/// becomes free and the reaper takes over.
#[derive(Debug, Default)]
pub struct SessionFactory {
    salt: AtomicU64,
}

impl SessionFactory {
    /// Create a factory with a fresh counter.
    pub const fn new() -> Self {
        Self { salt: AtomicU64::new(0) }
    }

    /// The process-wide factory used by sessions opened without an explicit one.
    pub fn global() -> &'static SessionFactory {
        &GLOBAL_FACTORY
    }

    /// Salt of the most recently allocated session (0 if none).
    pub fn last_salt(&self) -> u64 {
        self.salt.load(Ordering::SeqCst)
    }

    /// Allocate a workspace for the current process under `temp_root/tool_identity`.
    pub fn allocate(&self, temp_root: &Path, tool_identity: &str) -> Result<Workspace, WorkspaceError> {
        self.allocate_for(temp_root, tool_identity, current_pid())
    }

    /// Allocate a workspace on behalf of `pid`.
    ///
    /// The session directory is created non-recursively after its ancestors,
    /// so an unexpected pre-existing directory is reported instead of reused.
    pub fn allocate_for(
        &self,
        temp_root: &Path,
        tool_identity: &str,
        pid: u32,
    ) -> Result<Workspace, WorkspaceError> {
        validate_tool_identity(tool_identity)?;

        let base = temp_root.join(tool_identity);
        let process_dir = base.join(pid.to_string());
        let salt = self.salt.fetch_add(1, Ordering::SeqCst) + 1;
        let session_dir = process_dir.join(salt.to_string());

        fs::create_dir_all(&process_dir)
            .map_err(|source| WorkspaceError::Creation { path: process_dir.clone(), source })?;
        fs::create_dir(&session_dir)
            .map_err(|source| WorkspaceError::Creation { path: session_dir.clone(), source })?;

        debug!(path = %session_dir.display(), pid, salt, "allocated workspace");

        Ok(Workspace { base, process_dir, session_dir, pid, salt })
    }
}

/// Check that a tool identity is usable as one directory name.
fn validate_tool_identity(tool_identity: &str) -> Result<(), WorkspaceError> {
    let mut components = Path::new(tool_identity).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(WorkspaceError::InvalidToolIdentity(tool_identity.to_string())),
    }
}
