/*!
 * Lifecycle Events
 * UI commands emitted by the state machine and the commands it consumes
 */

use super::state::LifecycleState;
use crate::core::errors::LaunchResult;
use crate::core::types::{ActiveProcessHandle, Generation, LaunchTarget};
use crate::process::termination::TeardownReport;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Sound cues requested from the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundId {
    Launch,
    Return,
}

/// Requests to the UI layer, delivered in transition order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum UiEvent {
    VisibilityChangeRequested(bool),
    ButtonsEnableRequested,
    ButtonsDisableRequested,
    NavigationEnableRequested(bool),
    PlaySoundRequested(SoundId),
    StateChanged(LifecycleState),
}

/// Pending waits owned by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Launch affordance finished, hand off to the dispatcher
    DispatchDelay,
    /// No confirmation arrived in time
    LaunchTimeout,
    /// Confirmed app had time to settle, hide the launcher
    HideDelay,
    /// Show the launcher again
    ReappearDelay,
}

/// Inbox of the coordination task
///
/// Workers never touch state; they post one of these back instead.
#[derive(Debug)]
pub(crate) enum Command {
    LaunchRequested(LaunchTarget),
    ProcessLaunched(ActiveProcessHandle),
    LivenessChanged {
        alive: bool,
        /// Instance the oracle matched, when it reports one
        process: Option<ActiveProcessHandle>,
    },
    TerminateRequested,
    Timer {
        generation: Generation,
        kind: TimerKind,
    },
    /// Tagged with the launch sequence, not the timer generation: hiding the
    /// launcher advances the generation but keeps the launch current
    DispatchFinished {
        launch_seq: u64,
        result: LaunchResult<Option<ActiveProcessHandle>>,
    },
    TeardownFinished(TeardownReport),
    Shutdown(oneshot::Sender<()>),
}
