/*!
 * Orchestrator Handle
 * Cloneable front door to the coordination task
 */

use super::events::{Command, UiEvent};
use super::machine::MachineSnapshot;
use super::state::LifecycleState;
use crate::core::errors::{OrchestratorError, OrchestratorResult};
use crate::core::types::{ActiveProcessHandle, LaunchTarget, Pid};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

/// All inputs are fire-and-forget; they are applied in order by the
/// coordination task
#[derive(Clone)]
pub struct OrchestratorHandle {
    inbox: flume::Sender<Command>,
    events: broadcast::Sender<UiEvent>,
    state: watch::Receiver<LifecycleState>,
    shared: Arc<RwLock<MachineSnapshot>>,
    task: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
}

impl OrchestratorHandle {
    pub(crate) fn new(
        inbox: flume::Sender<Command>,
        events: broadcast::Sender<UiEvent>,
        state: watch::Receiver<LifecycleState>,
        shared: Arc<RwLock<MachineSnapshot>>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            inbox,
            events,
            state,
            shared,
            task: Arc::new(parking_lot::Mutex::new(Some(task))),
        }
    }

    fn send(&self, command: Command) -> OrchestratorResult<()> {
        self.inbox
            .send(command)
            .map_err(|_| OrchestratorError::Closed)
    }

    /// Request a launch; ignored unless the launcher is idle
    pub fn launch(&self, target: LaunchTarget) -> OrchestratorResult<()> {
        self.send(Command::LaunchRequested(target))
    }

    /// Confirmation from the launch layer that the application is up
    pub fn process_launched(&self, pid: Pid, name: impl Into<String>) -> OrchestratorResult<()> {
        self.send(Command::ProcessLaunched(ActiveProcessHandle::new(pid, name)))
    }

    /// User-initiated return to the launcher
    pub fn terminate(&self) -> OrchestratorResult<()> {
        self.send(Command::TerminateRequested)
    }

    /// Feed a debounced liveness value from an external observer
    pub fn liveness_changed(&self, alive: bool) -> OrchestratorResult<()> {
        self.send(Command::LivenessChanged {
            alive,
            process: None,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    /// UI events as a stream; lagged receivers see an error item
    pub fn subscribe_stream(&self) -> BroadcastStream<UiEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        self.shared.read().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.clone()
    }

    /// Wait until the machine reaches `wanted`
    pub async fn wait_for_state(
        &self,
        wanted: LifecycleState,
        timeout: Duration,
    ) -> OrchestratorResult<()> {
        let mut rx = self.state.clone();
        let reached = match tokio::time::timeout(timeout, rx.wait_for(|s| *s == wanted)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(OrchestratorError::Closed),
            Err(_) => Err(OrchestratorError::WaitTimeout(wanted.to_string())),
        };
        reached
    }

    /// Cancel pending waits, snap to idle and stop the coordination task
    pub async fn shutdown(&self) -> OrchestratorResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx))?;
        rx.await.map_err(|_| OrchestratorError::Closed)?;

        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inbox.is_disconnected()
    }
}
