/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 *
 * None of these ever reach the state machine as failures: callers log them
 * and degrade to "not running", "escalate" or "abandon to Idle".
 */

use crate::core::types::Pid;
use miette::Diagnostic;
use thiserror::Error;

/// Process table query errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ProbeError {
    #[error("Failed to read {path}: {reason}")]
    #[diagnostic(
        code(probe::read_failed),
        help("The process table root may be missing or unreadable. Check the procfs mount.")
    )]
    ReadFailed { path: String, reason: String },

    #[error("Window listing failed: {0}")]
    #[diagnostic(
        code(probe::window_list_failed),
        help("Install wmctrl or enable assume_windows on displays without EWMH support.")
    )]
    WindowListFailed(String),

    #[error("Process table scan exceeded {max} entries")]
    #[diagnostic(
        code(probe::scan_overflow),
        help("The scan was truncated. Results are incomplete and treated as unknown.")
    )]
    ScanOverflow { max: usize },
}

pub type ProbeResult<T> = Result<T, ProbeError>;

/// Process termination errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum TerminationError {
    #[error("Failed to signal PID {pid}: {reason}")]
    #[diagnostic(
        code(termination::signal_failed),
        help("The process may belong to another user. The next tier will be attempted.")
    )]
    SignalFailed { pid: Pid, reason: String },

    #[error("PID {pid} still alive after {waited_ms}ms")]
    #[diagnostic(
        code(termination::still_alive),
        help("Graceful shutdown did not complete in time. Escalating to a forceful kill.")
    )]
    StillAlive { pid: Pid, waited_ms: u64 },

    #[error("Kill by name '{name}' failed: {reason}")]
    #[diagnostic(
        code(termination::kill_by_name_failed),
        help("Check that pkill is installed and the process name is correct.")
    )]
    KillByNameFailed { name: String, reason: String },

    #[error("Invalid PID {0}")]
    #[diagnostic(
        code(termination::invalid_pid),
        help("PID 0 and PID 1 are never valid termination targets.")
    )]
    InvalidPid(Pid),
}

pub type TerminationResult<T> = Result<T, TerminationError>;

/// Launch dispatch errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum LaunchError {
    #[error("Invalid launch target: {0}")]
    #[diagnostic(
        code(launch::invalid_target),
        help("Native targets need a command, web targets need a URL.")
    )]
    InvalidTarget(String),

    #[error("Spawn failed for '{command}': {reason}")]
    #[diagnostic(
        code(launch::spawn_failed),
        help("Check that the executable exists and is executable.")
    )]
    SpawnFailed { command: String, reason: String },

    #[error("No browser configured for web targets")]
    #[diagnostic(
        code(launch::no_browser),
        help("Set browser_paths in the configuration or KIOSK_BROWSER in the environment.")
    )]
    NoBrowser,
}

pub type LaunchResult<T> = Result<T, LaunchError>;

/// Configuration errors
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    #[diagnostic(code(config::io), help("Check the KIOSK_CONFIG path."))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    #[diagnostic(code(config::parse), help("The config file must be a JSON object."))]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {reason}")]
    #[diagnostic(code(config::invalid_value))]
    InvalidValue { key: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors surfaced by the orchestrator handle
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum OrchestratorError {
    #[error("Orchestrator has shut down")]
    #[diagnostic(
        code(orchestrator::closed),
        help("The coordination task is gone. Spawn a new orchestrator.")
    )]
    Closed,

    #[error("Timed out waiting for state {0}")]
    #[diagnostic(code(orchestrator::wait_timeout))]
    WaitTimeout(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
