/*!
 * Orchestrator Builder
 * Wires collaborators and spawns the coordination task
 */

use super::handle::OrchestratorHandle;
use super::machine::{Machine, MachineParts, MachineSnapshot};
use super::state::LifecycleState;
use crate::core::config::OrchestratorConfig;
use crate::core::limits::UI_EVENT_CAPACITY;
use crate::liveness::LivenessOracle;
use crate::process::{
    CommandLauncher, LaunchDispatcher, NixControl, ProcFs, ProcessControl, ProcessProbe,
    TerminationEngine, WindowSource,
};
use log::info;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Builder for the lifecycle orchestrator
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    dispatcher: Option<Arc<dyn LaunchDispatcher>>,
    probe: Option<Arc<dyn ProcessProbe>>,
    control: Option<Arc<dyn ProcessControl>>,
    enable_oracle: bool,
    event_capacity: usize,
}

impl OrchestratorBuilder {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            dispatcher: None,
            probe: None,
            control: None,
            enable_oracle: true,
            event_capacity: UI_EVENT_CAPACITY,
        }
    }

    /// Replace the default command launcher
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn LaunchDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Replace the procfs probe used by the oracle and the termination engine
    pub fn with_probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Replace the signal-based process control
    pub fn with_control(mut self, control: Arc<dyn ProcessControl>) -> Self {
        self.control = Some(control);
        self
    }

    /// Run without a liveness oracle; liveness arrives through the handle only
    pub fn without_oracle(mut self) -> Self {
        self.enable_oracle = false;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Spawn the coordination task on the current tokio runtime
    pub fn spawn(self) -> OrchestratorHandle {
        let config = self.config;

        let probe = self.probe.unwrap_or_else(|| {
            let procfs = if config.assume_windows {
                ProcFs::new().with_windows(WindowSource::AssumeAll)
            } else {
                ProcFs::new()
            };
            Arc::new(procfs)
        });
        let control = self
            .control
            .unwrap_or_else(|| Arc::new(NixControl::default()));
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Arc::new(CommandLauncher::from_config(&config)));

        let engine = TerminationEngine::new(Arc::clone(&probe), control)
            .with_app_mode_marker(config.app_mode_marker.clone());
        let oracle = self
            .enable_oracle
            .then(|| Arc::new(LivenessOracle::from_config(Arc::clone(&probe), &config)));

        let (outbox, inbox) = flume::unbounded();
        let (events, _) = broadcast::channel(self.event_capacity);
        let (state_tx, state_rx) = watch::channel(LifecycleState::Idle);
        let shared = Arc::new(RwLock::new(MachineSnapshot::new()));

        info!(
            "Starting lifecycle orchestrator (oracle: {}, poll interval: {:?})",
            self.enable_oracle, config.poll_interval
        );

        let machine = Machine::new(MachineParts {
            config,
            dispatcher,
            engine,
            oracle,
            inbox,
            outbox: outbox.downgrade(),
            events: events.clone(),
            state_tx,
            shared: Arc::clone(&shared),
        });
        let task = tokio::spawn(machine.run());

        OrchestratorHandle::new(outbox, events, state_rx, shared, task)
    }
}
