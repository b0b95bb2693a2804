//! Process-table queries used by the stale workspace reaper.

/// Answers whether a process with a given id is currently running.
pub trait ProcessTable: Send + Sync {
    /// Check if the process `pid` is alive.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Process table backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    /// Create a new system process table.
    pub fn new() -> Self {
        Self
    }
}

impl ProcessTable for SystemProcessTable {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = libc::pid_t::try_from(pid) else {
            return false;
        };
        // kill(0, 0) addresses the whole process group
        if raw <= 0 {
            return false;
        }

        // Null signal: performs the permission and existence checks only.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::kill(raw, 0) };
        if rc == 0 {
            return true;
        }
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or_default();
        errno == libc::EPERM
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        // Without a probe every owner is assumed alive, so nothing is reaped.
        true
    }
}

/// The id of the current process.
pub fn current_pid() -> u32 {
    std::process::id()
}

/// Whether a pid can name a real, reapable process on this platform.
pub fn is_valid_pid(pid: u32) -> bool {
    #[cfg(unix)]
    {
        pid > 0 && libc::pid_t::try_from(pid).is_ok()
    }
    #[cfg(not(unix))]
    {
        pid > 0
    }
}
