/*!
 * Process Traits
 * Seams between the orchestrator and the operating system
 */

use crate::core::errors::{LaunchResult, ProbeResult, TerminationResult};
use crate::core::types::{ActiveProcessHandle, LaunchTarget, Pid, ProcessEntry};
use std::collections::HashSet;

/// Owners of visible top-level windows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowOwners {
    /// No window information; every process counts as windowed
    All,
    /// PIDs owning at least one listed top-level window
    Pids(HashSet<Pid>),
}

impl WindowOwners {
    pub fn none() -> Self {
        Self::Pids(HashSet::new())
    }

    pub fn contains(&self, pid: Pid) -> bool {
        match self {
            Self::All => true,
            Self::Pids(pids) => pids.contains(&pid),
        }
    }
}

/// Read-only view of the OS process table
///
/// Implementations block; callers run them on the blocking pool.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessProbe: Send + Sync {
    /// Every live or zombie process currently listed
    fn snapshot(&self) -> ProbeResult<Vec<ProcessEntry>>;

    /// Processes owning a visible top-level window
    fn window_owners(&self) -> ProbeResult<WindowOwners>;
}

/// Result of delivering a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signalled {
    Delivered,
    /// The target was already gone
    AlreadyExited,
}

/// Kill primitives used by the termination engine
#[cfg_attr(test, mockall::automock)]
pub trait ProcessControl: Send + Sync {
    /// Ask a process to exit (SIGTERM)
    fn terminate(&self, pid: Pid) -> TerminationResult<Signalled>;

    /// Kill a process by PID (SIGKILL)
    fn force_kill(&self, pid: Pid) -> TerminationResult<Signalled>;

    /// Kill every process with the given name, last resort for stale handles
    fn kill_by_name(&self, name: &str) -> TerminationResult<()>;

    /// Whether the PID refers to a running, non-zombie process
    fn is_alive(&self, pid: Pid) -> bool;
}

/// Starts the OS process or browser window for a target
#[cfg_attr(test, mockall::automock)]
pub trait LaunchDispatcher: Send + Sync {
    /// Spawn the target
    ///
    /// `Some(handle)` is reported to the state machine as a launch
    /// confirmation. `None` means confirmation arrives later through
    /// `ProcessLaunched` or the liveness oracle.
    fn dispatch(&self, target: &LaunchTarget) -> LaunchResult<Option<ActiveProcessHandle>>;
}
