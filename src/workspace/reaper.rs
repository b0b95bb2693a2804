//! Stale workspace reaping.
//!
//! A crashed or killed process never runs its finalizer, so its
//! `<base>/<pid>` directory would leak. Each new allocation sweeps the
//! base directory and removes every process directory whose owner is gone.

use super::{is_valid_pid, ProcessTable};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// What a reaping pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReapReport {
    /// Process ids whose directories were removed
    pub removed: Vec<u32>,
    /// Process ids left alone because the process is alive (or is us)
    pub live: Vec<u32>,
    /// Directory names that are not managed by the naming scheme
    pub ignored: Vec<String>,
}

impl ReapReport {
    /// Whether nothing was removed.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Remove sibling process directories under `base` whose owner has exited.
///
/// `skip_pid` (normally the caller's own pid) is never touched. Entries
/// whose names are not process ids are ignored. A directory that vanishes
/// mid-sweep counts as reaped; other deletion failures are logged and skipped.
pub fn reap(base: &Path, skip_pid: u32, processes: &dyn ProcessTable) -> ReapReport {
    let mut report = ReapReport::default();

    let entries = match fs::read_dir(base) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
        Err(e) => {
            warn!(path = %base.display(), error = %e, "cannot scan workspace base");
            return report;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let pid = match name.parse::<u32>() {
            Ok(pid) if is_valid_pid(pid) => pid,
            _ => {
                report.ignored.push(name);
                continue;
            }
        };

        if pid == skip_pid || processes.is_alive(pid) {
            report.live.push(pid);
            continue;
        }

        match fs::remove_dir_all(&path) {
            Ok(()) => {
                debug!(path = %path.display(), pid, "reaped stale workspace");
                report.removed.push(pid);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => report.removed.push(pid),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to reap stale workspace"),
        }
    }

    report.removed.sort_unstable();
    report.live.sort_unstable();
    report.ignored.sort();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    struct FakeProcesses(HashSet<u32>);

    impl FakeProcesses {
        fn alive(pids: &[u32]) -> Self {
            Self(pids.iter().copied().collect())
        }
    }

    impl ProcessTable for FakeProcesses {
        fn is_alive(&self, pid: u32) -> bool {
            self.0.contains(&pid)
        }
    }

    #[test]
    fn test_missing_base_is_empty_report() {
        let temp = TempDir::new().unwrap();
        let report = reap(&temp.path().join("absent"), 1, &FakeProcesses::alive(&[]));
        assert_eq!(report, ReapReport::default());
    }

    #[test]
    fn test_reaps_dead_and_keeps_live() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        for dir in ["100/1", "100/2", "200/1", "999/1", "999/7"] {
            fs::create_dir_all(base.join(dir)).unwrap();
        }

        let report = reap(base, 100, &FakeProcesses::alive(&[200]));

        assert_eq!(report.removed, vec![999]);
        assert_eq!(report.live, vec![100, 200]);
        assert!(!base.join("999").exists());
        assert!(base.join("100/1").is_dir());
        assert!(base.join("100/2").is_dir());
        assert!(base.join("200/1").is_dir());
    }

    #[test]
    fn test_skip_pid_is_never_reaped_even_if_reported_dead() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("42/1")).unwrap();

        let report = reap(temp.path(), 42, &FakeProcesses::alive(&[]));
        assert!(report.is_empty());
        assert!(temp.path().join("42/1").is_dir());
    }

    #[test]
    fn test_ignores_unmanaged_entries() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        fs::create_dir_all(base.join("junk")).unwrap();
        fs::create_dir_all(base.join("0")).unwrap();
        fs::create_dir_all(base.join("12-v2")).unwrap();
        fs::write(base.join("555"), b"a file, not a workspace").unwrap();

        let report = reap(base, 1, &FakeProcesses::alive(&[]));

        assert!(report.removed.is_empty());
        assert_eq!(report.ignored, vec!["0".to_string(), "12-v2".to_string(), "junk".to_string()]);
        assert!(base.join("junk").is_dir());
        assert!(base.join("555").is_file());
    }

    #[test]
    fn test_reaps_every_dead_sibling() {
        let temp = TempDir::new().unwrap();
        for pid in [301, 302, 303] {
            fs::create_dir_all(temp.path().join(format!("{}/1/bin", pid))).unwrap();
        }

        let report = reap(temp.path(), 1, &FakeProcesses::alive(&[]));
        assert_eq!(report.removed, vec![301, 302, 303]);
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
