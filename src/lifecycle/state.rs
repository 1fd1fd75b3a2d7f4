/*!
 * Lifecycle State
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Launcher lifecycle
///
/// `Idle -> Launching -> WaitingForProcess -> AppRunning -> Terminating -> Reappearing -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Launcher visible and accepting launches
    Idle,
    /// Launch affordance playing, dispatcher not yet called
    Launching,
    /// Dispatcher called, waiting for confirmation
    WaitingForProcess,
    /// Launcher hidden, application believed alive
    AppRunning,
    Terminating,
    /// Waiting to show the launcher again
    Reappearing,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Launching => "launching",
            Self::WaitingForProcess => "waiting_for_process",
            Self::AppRunning => "app_running",
            Self::Terminating => "terminating",
            Self::Reappearing => "reappearing",
        }
    }

    /// Whether a launch request is honoured in this state
    pub fn accepts_launch(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether a termination trigger is honoured in this state
    pub fn accepts_termination(&self) -> bool {
        matches!(self, Self::AppRunning)
    }

    /// States on the way out of an application
    pub fn is_winding_down(&self) -> bool {
        matches!(self, Self::Terminating | Self::Reappearing)
    }

    /// Edges of the transition graph
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, Launching)
                | (Launching, WaitingForProcess)
                | (WaitingForProcess, AppRunning)
                | (WaitingForProcess, Reappearing)
                | (AppRunning, Terminating)
                | (Terminating, Reappearing)
                | (Reappearing, Idle)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::Idle
    }
}
