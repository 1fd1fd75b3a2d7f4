/*!
 * Core Types
 * Common types shared by the orchestrator, the oracle and the termination engine
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// OS process ID type
pub type Pid = u32;

/// Monotonic generation number tying a pending wait to the phase that armed it
pub type Generation = u64;

/// Description of what to start
///
/// Created by the UI on selection and immutable for the lifetime of a launch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LaunchTarget {
    /// Executable command line, or the URL for web targets
    pub raw_command: String,
    /// Whether the target is hosted in a browser app-mode window
    pub is_web: bool,
}

impl LaunchTarget {
    pub fn native(raw_command: impl Into<String>) -> Self {
        Self {
            raw_command: raw_command.into(),
            is_web: false,
        }
    }

    pub fn web(url: impl Into<String>) -> Self {
        Self {
            raw_command: url.into(),
            is_web: true,
        }
    }

    /// URL used to recognise the hosting browser window, web targets only
    pub fn url(&self) -> Option<&str> {
        self.is_web.then_some(self.raw_command.as_str())
    }
}

impl fmt::Display for LaunchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_web { "web" } else { "native" };
        write!(f, "{}:{}", kind, self.raw_command)
    }
}

/// Reference to the believed foreground application
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ActiveProcessHandle {
    pub pid: Pid,
    pub name: String,
}

impl ActiveProcessHandle {
    pub fn new(pid: Pid, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

impl fmt::Display for ActiveProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (PID {})", self.name, self.pid)
    }
}

/// One row of a process table snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessEntry {
    pub pid: Pid,
    pub ppid: Pid,
    pub name: String,
    /// Arguments joined with single spaces
    pub cmdline: String,
    /// Exited but not yet reaped; never counts as alive
    pub zombie: bool,
}

impl ProcessEntry {
    pub fn new(pid: Pid, ppid: Pid, name: impl Into<String>, cmdline: impl Into<String>) -> Self {
        Self {
            pid,
            ppid,
            name: name.into(),
            cmdline: cmdline.into(),
            zombie: false,
        }
    }

    #[must_use]
    pub fn zombie(mut self) -> Self {
        self.zombie = true;
        self
    }
}
