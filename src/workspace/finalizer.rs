//! Workspace teardown.

use super::{Workspace, WorkspaceError};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Highest directory removed by [`finalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CleanupDepth {
    /// Only the session directory; siblings remain under the process directory
    Session,
    /// The process directory too; other processes remain under the base
    Process,
    /// The whole tree down to and including the base directory
    Base,
}

impl std::fmt::Display for CleanupDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupDepth::Session => write!(f, "session"),
            CleanupDepth::Process => write!(f, "process"),
            CleanupDepth::Base => write!(f, "base"),
        }
    }
}

/// Delete a session directory, then collapse ancestors that became empty.
///
/// Order is session, then process, then base; each step runs only if the
/// previous one left its parent without subdirectories. The emptiness check
/// and the delete are not atomic across processes: if a sibling repopulates
/// a directory in between, the delete fails and cleanup simply stops there.
/// Calling this on an already finalized workspace is a no-op.
pub fn finalize(workspace: &Workspace) -> Result<CleanupDepth, WorkspaceError> {
    match fs::remove_dir_all(workspace.session_dir()) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(WorkspaceError::Cleanup {
                path: workspace.session_dir().to_path_buf(),
                source,
            })
        }
    }
    debug!(path = %workspace.session_dir().display(), "removed session workspace");

    if !remove_if_empty(workspace.process_dir()) {
        return Ok(CleanupDepth::Session);
    }
    if !remove_if_empty(workspace.base()) {
        return Ok(CleanupDepth::Process);
    }
    Ok(CleanupDepth::Base)
}

/// Remove `dir` if it has no subdirectories. Returns whether it is gone.
fn remove_if_empty(dir: &Path) -> bool {
    let has_subdirs = match fs::read_dir(dir) {
        Ok(mut entries) => entries.any(|e| e.map(|e| e.path().is_dir()).unwrap_or(true)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
        Err(_) => return false,
    };
    if has_subdirs {
        return false;
    }

    match fs::remove_dir(dir) {
        Ok(()) => {
            debug!(path = %dir.display(), "removed empty workspace directory");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            debug!(path = %dir.display(), error = %e, "workspace directory still in use");
            false
        }
    }
}
