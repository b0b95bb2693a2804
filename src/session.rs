//! Build sessions.
//!
//! A [`BuildSession`] owns one workspace, one asset registry and one
//! orchestrator. Opening a session allocates the workspace and reaps stale
//! siblings; closing it (or dropping it) tears the workspace down again.
//!
//! # Example
//!
//! ```ignore
//! use contentbuild::session::{BuildSession, SessionOptions};
//! use contentbuild::build::PassthroughEngine;
//! use std::sync::Arc;
//!
//! let mut session = BuildSession::open(SessionOptions::default(), Arc::new(PassthroughEngine::new()))?;
//! session.add(Path::new("art/hero.png"))?;
//! match session.build()? {
//!     BuildResult::Success => {
//!         session.export_outputs(Path::new("build"))?;
//!     }
//!     BuildResult::Failure(lines) => eprintln!("{}", lines.join("\n")),
//! }
//! session.close()?;
//! ```

use crate::build::{
    AssetEntry, AssetRegistry, BuildEngine, BuildError, BuildOrchestrator, BuildRequest,
    BuildResult, CommandEngine, ExtensionTable, PassthroughEngine, RegistryError,
};
use crate::config::{ContentConfig, EngineConfig, EngineKind};
use crate::workspace::{
    finalize, reap, CleanupDepth, ProcessTable, ReapReport, SessionFactory, SystemProcessTable,
    Workspace, WorkspaceError,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error opening or using a session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// Workspace could not be allocated
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    /// Asset registration failed
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Build infrastructure failed
    #[error(transparent)]
    Build(#[from] BuildError),
    /// Engine configuration is unusable
    #[error("Invalid engine configuration: {0}")]
    EngineConfig(String),
}

/// Settings for opening a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Directory under which the tool's base directory lives
    pub temp_root: PathBuf,
    /// Tool identity (name of the shared base directory)
    pub tool_identity: String,
    /// Target platform
    pub platform: String,
    /// Target profile
    pub profile: String,
    /// Engine wait limit
    pub timeout: Option<Duration>,
    /// Extension defaults for convention-based registration
    pub extensions: ExtensionTable,
}

impl SessionOptions {
    /// Derive session options from configuration.
    pub fn from_config(config: &ContentConfig) -> Self {
        Self {
            temp_root: config.temp_root(),
            tool_identity: config.workspace.tool.clone(),
            platform: config.build.platform.clone(),
            profile: config.build.profile.clone(),
            timeout: config.timeout(),
            extensions: config.extension_table(),
        }
    }

    /// Use a different temp root.
    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    /// Use a different engine wait limit.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&ContentConfig::default())
    }
}

/// Create the engine selected by configuration.
pub fn engine_from_config(config: &EngineConfig) -> Result<Arc<dyn BuildEngine>, SessionError> {
    match config.kind {
        EngineKind::Passthrough => Ok(Arc::new(PassthroughEngine::new())),
        EngineKind::Command => {
            let program = config.program.as_ref().ok_or_else(|| {
                SessionError::EngineConfig("engine.program is required for the command engine".to_string())
            })?;
            let engine = CommandEngine::new(program)
                .with_args(config.args.clone())
                .with_error_pattern(&config.error_pattern)
                .map_err(|e| SessionError::EngineConfig(e.to_string()))?;
            Ok(Arc::new(engine))
        }
    }
}

/// How long closing a session waits for a cancelled build to stop.
const CLOSE_GRACE: Duration = Duration::from_secs(10);

/// One workspace, one asset list, one build at a time.
///
/// `build` borrows the session, while `close` and `Drop` need ownership, so
/// the workspace can never be torn down under an in-flight build.
#[derive(Debug)]
pub struct BuildSession {
    workspace: Workspace,
    registry: AssetRegistry,
    orchestrator: BuildOrchestrator,
    platform: String,
    profile: String,
    reaped: ReapReport,
    finalized: bool,
}

impl BuildSession {
    /// Open a session using the process-wide factory and the OS process table.
    pub fn open(options: SessionOptions, engine: Arc<dyn BuildEngine>) -> Result<Self, SessionError> {
        Self::open_with(SessionFactory::global(), &SystemProcessTable::new(), options, engine)
    }

    /// Open a session with an explicit factory and process table.
    ///
    /// Allocates the workspace first, then reaps stale sibling workspaces.
    pub fn open_with(
        factory: &SessionFactory,
        processes: &dyn ProcessTable,
        options: SessionOptions,
        engine: Arc<dyn BuildEngine>,
    ) -> Result<Self, SessionError> {
        let workspace = factory.allocate(&options.temp_root, &options.tool_identity)?;

        let reaped = reap(workspace.base(), workspace.pid(), processes);
        if !reaped.is_empty() {
            info!(count = reaped.removed.len(), pids = ?reaped.removed, "reaped stale workspaces");
        }

        let orchestrator = BuildOrchestrator::new(engine).with_timeout(options.timeout);
        Ok(Self {
            workspace,
            registry: AssetRegistry::new(options.extensions),
            orchestrator,
            platform: options.platform,
            profile: options.profile,
            reaped,
            finalized: false,
        })
    }

    /// The session's workspace.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Directory holding compiled artifacts after a successful build.
    pub fn output_dir(&self) -> PathBuf {
        self.workspace.output_dir()
    }

    /// What the reaper removed when this session was opened.
    pub fn reaped(&self) -> &ReapReport {
        &self.reaped
    }

    /// The orchestrator running this session's builds.
    pub fn orchestrator(&self) -> &BuildOrchestrator {
        &self.orchestrator
    }

    /// Register an asset using the default importer/processor for its extension.
    pub fn add(&mut self, path: &Path) -> Result<&AssetEntry, RegistryError> {
        self.registry.add_by_convention(path)
    }

    /// Register an asset with an explicit name and optional stages.
    pub fn add_explicit(
        &mut self,
        path: &Path,
        name: &str,
        importer: Option<&str>,
        processor: Option<&str>,
    ) -> Result<&AssetEntry, RegistryError> {
        self.registry.add_explicit(path, name, importer, processor)
    }

    /// Remove every registered asset.
    pub fn clear(&mut self) {
        self.registry.clear();
    }

    /// Registered assets in insertion order.
    pub fn assets(&self) -> &[AssetEntry] {
        self.registry.entries()
    }

    /// Build the registered assets into the workspace output directory.
    ///
    /// Asset failures come back as [`BuildResult::Failure`]; only
    /// infrastructure problems are returned as errors.
    pub fn build(&self) -> Result<BuildResult, BuildError> {
        if !self.workspace.exists() {
            return Err(BuildError::WorkspaceMissing(self.workspace.session_dir().to_path_buf()));
        }

        let request = BuildRequest {
            assets: self.registry.entries().to_vec(),
            output_dir: self.workspace.output_dir(),
            intermediate_dir: self.workspace.intermediate_dir(),
            project_file: self.workspace.project_file(),
            platform: self.platform.clone(),
            profile: self.profile.clone(),
        };

        let start = Instant::now();
        let result = self.orchestrator.run(request)?;
        info!("{}", result.summary(self.registry.len(), start.elapsed()));
        Ok(result)
    }

    /// Copy the output tree to `dest`, preserving relative layout.
    ///
    /// Returns the copied destination paths.
    pub fn export_outputs(&self, dest: &Path) -> io::Result<Vec<PathBuf>> {
        let out_dir = self.workspace.output_dir();
        let pattern = format!("{}/**/*", glob::Pattern::escape(&out_dir.to_string_lossy()));
        let entries = glob::glob(&pattern)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let mut copied = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| e.into_error())?;
            if !path.is_file() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&out_dir) else {
                continue;
            };
            let target = dest.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&path, &target)?;
            debug!(from = %path.display(), to = %target.display(), "exported artifact");
            copied.push(target);
        }
        copied.sort();
        Ok(copied)
    }

    /// Tear down the workspace.
    ///
    /// If a timed-out build's engine is still running after a grace period,
    /// the workspace is left in place for the reaper and
    /// [`WorkspaceError::InUse`] is returned.
    pub fn close(mut self) -> Result<CleanupDepth, WorkspaceError> {
        self.finalized = true;
        self.teardown()
    }

    fn teardown(&self) -> Result<CleanupDepth, WorkspaceError> {
        if !self.orchestrator.settle(CLOSE_GRACE) {
            return Err(WorkspaceError::InUse(self.workspace.session_dir().to_path_buf()));
        }
        finalize(&self.workspace)
    }
}

impl Drop for BuildSession {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        if let Err(e) = self.teardown() {
            warn!(error = %e, "workspace cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    struct AllAlive;

    impl ProcessTable for AllAlive {
        fn is_alive(&self, _pid: u32) -> bool {
            true
        }
    }

    struct NoneAlive;

    impl ProcessTable for NoneAlive {
        fn is_alive(&self, _pid: u32) -> bool {
            false
        }
    }

    fn options(temp: &TempDir) -> SessionOptions {
        SessionOptions::default().with_temp_root(temp.path())
    }

    fn open(temp: &TempDir, factory: &SessionFactory) -> BuildSession {
        BuildSession::open_with(factory, &AllAlive, options(temp), Arc::new(PassthroughEngine::new()))
            .unwrap()
    }

    #[test]
    fn test_open_allocates_and_close_collapses() {
        let temp = TempDir::new().unwrap();
        let session = open(&temp, &SessionFactory::new());
        let base = session.workspace().base().to_path_buf();

        assert!(session.workspace().exists());
        assert_eq!(session.close().unwrap(), CleanupDepth::Base);
        assert!(!base.exists());
    }

    #[test]
    fn test_drop_finalizes() {
        let temp = TempDir::new().unwrap();
        let session_dir = {
            let session = open(&temp, &SessionFactory::new());
            session.workspace().session_dir().to_path_buf()
        };
        assert!(!session_dir.exists());
    }

    #[test]
    fn test_open_reaps_dead_siblings() {
        let temp = TempDir::new().unwrap();
        let stale = temp.path().join("contentbuild/999999/1");
        fs::create_dir_all(&stale).unwrap();

        let session = BuildSession::open_with(
            &SessionFactory::new(),
            &NoneAlive,
            options(&temp),
            Arc::new(PassthroughEngine::new()),
        )
        .unwrap();

        assert_eq!(session.reaped().removed, vec![999999]);
        assert!(!stale.exists());
        assert!(session.workspace().exists());
    }

    #[test]
    fn test_build_and_export() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("hero.png");
        fs::write(&src, b"pixels").unwrap();

        let mut session = open(&temp, &SessionFactory::new());
        session.add(&src).unwrap();
        session.add_explicit(&src, "ui/icon", None, None).unwrap();

        assert_eq!(session.build().unwrap(), BuildResult::Success);

        let dest = temp.path().join("export");
        let copied = session.export_outputs(&dest).unwrap();
        let copied: HashSet<_> = copied.into_iter().collect();
        assert!(copied.contains(&dest.join("hero.png")));
        assert!(copied.contains(&dest.join("ui/icon.png")));
    }

    #[test]
    fn test_missing_workspace_is_infrastructure_error() {
        let temp = TempDir::new().unwrap();
        let session = open(&temp, &SessionFactory::new());
        fs::remove_dir_all(session.workspace().session_dir()).unwrap();

        assert!(matches!(session.build(), Err(BuildError::WorkspaceMissing(_))));
    }

    #[test]
    fn test_engine_from_config() {
        let passthrough = engine_from_config(&EngineConfig::default()).unwrap();
        assert_eq!(passthrough.name(), "passthrough");

        let mut config = EngineConfig { kind: EngineKind::Command, ..Default::default() };
        assert!(matches!(engine_from_config(&config), Err(SessionError::EngineConfig(_))));

        config.program = Some(PathBuf::from("mgcb"));
        assert_eq!(engine_from_config(&config).unwrap().name(), "command");

        config.error_pattern = "(".to_string();
        assert!(matches!(engine_from_config(&config), Err(SessionError::EngineConfig(_))));
    }
}
