/*!
 * Kiosk Orchestrator Library
 * Launcher lifecycle, liveness detection and process teardown
 */

pub mod core;
pub mod lifecycle;
pub mod liveness;
pub mod monitoring;
pub mod process;

// Re-exports
pub use crate::core::{
    ActiveProcessHandle, ConfigError, LaunchError, LaunchTarget, MonitoredProcessSet,
    OrchestratorConfig, OrchestratorError, OrchestratorResult, Pid, ProbeError, ProcessEntry,
    TerminationError,
};
pub use lifecycle::{
    LifecycleState, MachineSnapshot, OrchestratorBuilder, OrchestratorHandle, SoundId, UiEvent,
};
pub use liveness::{LivenessOracle, OracleTarget};
pub use monitoring::init_tracing;
pub use process::{
    CommandLauncher, KillOutcome, LaunchDispatcher, NixControl, ProcFs, ProcessControl,
    ProcessProbe, TerminationEngine,
};
