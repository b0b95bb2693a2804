//! Ephemeral build workspaces.
//!
//! Every build session owns a directory tree of the form
//! `<temp_root>/<tool>/<pid>/<salt>`:
//!
//! - `<tool>` is shared by every process running the tool on this machine
//! - `<pid>` belongs to exactly one live process
//! - `<salt>` is a per-process counter, unique for the lifetime of the process
//!
//! The `(pid, salt)` pair is the only concurrency control: no file locks
//! are taken. Directories left behind by crashed processes are removed by
//! the [`reaper`] the next time any process allocates a session.
//!
//! # Example
//!
//! ```ignore
//! use contentbuild::workspace::{finalize, reap, SessionFactory, SystemProcessTable};
//!
//! let workspace = SessionFactory::global().allocate(&std::env::temp_dir(), "contentbuild")?;
//! reap(workspace.base(), workspace.pid(), &SystemProcessTable::new());
//! // ... build into workspace.output_dir() ...
//! finalize(&workspace)?;
//! ```

pub mod allocator;
pub mod finalizer;
pub mod process;
pub mod reaper;

pub use allocator::*;
pub use finalizer::*;
pub use process::*;
pub use reaper::*;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for workspace lifecycle operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkspaceError {
    /// The filesystem refused to create a workspace directory
    #[error("Failed to create workspace directory '{path}': {source}")]
    Creation { path: PathBuf, source: std::io::Error },
    /// Tool identity cannot be used as a directory name
    #[error("Invalid tool identity '{0}': must be a single non-empty path segment")]
    InvalidToolIdentity(String),
    /// The filesystem refused to delete a workspace directory
    #[error("Failed to clean up workspace directory '{path}': {source}")]
    Cleanup { path: PathBuf, source: std::io::Error },
    /// A cancelled build is still writing into the workspace
    #[error("Workspace directory '{0}' is still in use by a cancelled build")]
    InUse(PathBuf),
}

/// A session's allocated directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    base: PathBuf,
    process_dir: PathBuf,
    session_dir: PathBuf,
    pid: u32,
    salt: u64,
}

impl Workspace {
    /// Directory shared by every process running this tool.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory owned by the allocating process.
    pub fn process_dir(&self) -> &Path {
        &self.process_dir
    }

    /// Directory owned by this session.
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Id of the process that allocated the workspace.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Per-process session counter value.
    pub fn salt(&self) -> u64 {
        self.salt
    }

    /// Where the engine writes compiled artifacts.
    pub fn output_dir(&self) -> PathBuf {
        self.session_dir.join("bin").join("Content")
    }

    /// Scratch directory for engine intermediates.
    pub fn intermediate_dir(&self) -> PathBuf {
        self.session_dir.join("obj").join("Content")
    }

    /// Location of the generated project (response) file.
    pub fn project_file(&self) -> PathBuf {
        self.session_dir.join("content.rsp")
    }

    /// Whether the session directory is still present on disk.
    pub fn exists(&self) -> bool {
        self.session_dir.is_dir()
    }
}
