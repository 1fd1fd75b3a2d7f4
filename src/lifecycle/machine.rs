/*!
 * Lifecycle State Machine
 *
 * The coordination task. It alone owns the lifecycle state and emits UI
 * events. Delays, dispatch, teardown and liveness checks run as background
 * tasks that post their results back into the inbox; each pending wait is
 * stamped with a generation and results from an older generation are
 * dropped as abandoned. Dispatch results are stamped with the launch
 * sequence instead, which only moves when a launch ends.
 *
 * Background tasks hold weak senders, so the task stops once every
 * `OrchestratorHandle` is gone.
 */

use super::cooldown::TerminateCooldown;
use super::events::{Command, SoundId, TimerKind, UiEvent};
use super::state::LifecycleState;
use crate::core::config::{MonitoredProcessSet, OrchestratorConfig};
use crate::core::errors::{LaunchError, LaunchResult};
use crate::core::generation::GenerationCounter;
use crate::core::types::{ActiveProcessHandle, Generation, LaunchTarget};
use crate::liveness::{Liveness, LivenessOracle, OracleTarget, OracleTask};
use crate::monitoring::{launch_span, span_operation};
use crate::process::termination::{BrowserTeardown, TeardownReport, TerminationEngine};
use crate::process::traits::LaunchDispatcher;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn, Instrument, Span};
use uuid::Uuid;

/// Point-in-time view of the machine, readable from any thread
#[derive(Debug, Clone, Serialize)]
pub struct MachineSnapshot {
    pub state: LifecycleState,
    #[serde(skip)]
    pub entered_at: Instant,
    pub active: Option<ActiveProcessHandle>,
    pub launched_url: Option<String>,
    /// Correlation ID of the current launch session
    pub launch_id: Option<Uuid>,
    pub transitioning: bool,
    /// Background teardowns that have reported back
    pub teardowns_completed: u64,
}

impl MachineSnapshot {
    pub(crate) fn new() -> Self {
        Self {
            state: LifecycleState::Idle,
            entered_at: Instant::now(),
            active: None,
            launched_url: None,
            launch_id: None,
            transitioning: false,
            teardowns_completed: 0,
        }
    }

    pub fn time_in_state(&self) -> Duration {
        self.entered_at.elapsed()
    }
}

/// Collaborators injected by the builder
pub(crate) struct MachineParts {
    pub config: OrchestratorConfig,
    pub dispatcher: Arc<dyn LaunchDispatcher>,
    pub engine: TerminationEngine,
    pub oracle: Option<Arc<LivenessOracle>>,
    pub inbox: flume::Receiver<Command>,
    pub outbox: flume::WeakSender<Command>,
    pub events: broadcast::Sender<UiEvent>,
    pub state_tx: watch::Sender<LifecycleState>,
    pub shared: Arc<RwLock<MachineSnapshot>>,
}

pub(crate) struct Machine {
    config: OrchestratorConfig,
    monitored: MonitoredProcessSet,
    dispatcher: Arc<dyn LaunchDispatcher>,
    engine: TerminationEngine,
    oracle: Option<Arc<LivenessOracle>>,
    oracle_task: Option<OracleTask>,

    inbox: flume::Receiver<Command>,
    outbox: flume::WeakSender<Command>,
    events: broadcast::Sender<UiEvent>,
    state_tx: watch::Sender<LifecycleState>,
    shared: Arc<RwLock<MachineSnapshot>>,

    state: LifecycleState,
    entered_at: Instant,
    target: Option<LaunchTarget>,
    active: Option<ActiveProcessHandle>,
    launched_url: Option<String>,
    /// Set for the duration of a user- or confirmation-driven transition;
    /// liveness flips are ignored while it is set
    transitioning: bool,
    /// Last liveness value suppressed during a transition, replayed after it
    deferred_liveness: Option<bool>,
    generations: GenerationCounter,
    /// Identifies the launch a dispatcher result belongs to
    launch_seq: u64,
    cooldown: TerminateCooldown,
    teardowns_completed: u64,
    launch_id: Option<Uuid>,
    launch_span: Span,
}

impl Machine {
    pub(crate) fn new(parts: MachineParts) -> Self {
        let monitored = MonitoredProcessSet::from_config(&parts.config);
        let cooldown = TerminateCooldown::new(parts.config.terminate_cooldown);
        Self {
            config: parts.config,
            monitored,
            dispatcher: parts.dispatcher,
            engine: parts.engine,
            oracle: parts.oracle,
            oracle_task: None,
            inbox: parts.inbox,
            outbox: parts.outbox,
            events: parts.events,
            state_tx: parts.state_tx,
            shared: parts.shared,
            state: LifecycleState::Idle,
            entered_at: Instant::now(),
            target: None,
            active: None,
            launched_url: None,
            transitioning: false,
            deferred_liveness: None,
            generations: GenerationCounter::new(),
            launch_seq: 0,
            cooldown,
            teardowns_completed: 0,
            launch_id: None,
            launch_span: Span::none(),
        }
    }

    /// Drain the inbox until shutdown or until every handle is dropped
    pub(crate) async fn run(mut self) {
        if let Some(oracle) = self.oracle.clone() {
            let outbox = self.outbox.clone();
            self.oracle_task = Some(oracle.spawn(move |liveness: Liveness| {
                let process = liveness
                    .process
                    .map(|entry| ActiveProcessHandle::new(entry.pid, entry.name));
                post(
                    &outbox,
                    Command::LivenessChanged {
                        alive: liveness.alive,
                        process,
                    },
                );
            }));
        }
        info!("Lifecycle state machine running");

        loop {
            let Ok(command) = self.inbox.recv_async().await else {
                info!("Every orchestrator handle dropped");
                break;
            };
            let keep_running = self.handle(command);
            self.publish();
            if !keep_running {
                break;
            }
        }

        if let Some(mut task) = self.oracle_task.take() {
            task.abort();
        }
        info!("Lifecycle state machine stopped");
    }

    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::LaunchRequested(target) => self.on_launch_requested(target),
            Command::ProcessLaunched(handle) => self.on_process_launched(handle),
            Command::LivenessChanged { alive, process } => {
                self.on_liveness_changed(alive, process)
            }
            Command::TerminateRequested => self.on_terminate_requested(),
            Command::Timer { generation, kind } => self.on_timer(generation, kind),
            Command::DispatchFinished { launch_seq, result } => {
                self.on_dispatch_finished(launch_seq, result)
            }
            Command::TeardownFinished(report) => self.on_teardown_finished(report),
            Command::Shutdown(reply) => {
                self.on_shutdown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    // -------------------------------------------------------------------------
    // Inputs
    // -------------------------------------------------------------------------

    fn on_launch_requested(&mut self, target: LaunchTarget) {
        if !self.state.accepts_launch() {
            debug!(state = %self.state, target = %target, "Launch ignored, not idle");
            return;
        }

        let (launch_id, span) = launch_span(&target);
        self.launch_id = Some(launch_id);
        self.launch_span = span;
        let _enter = self.launch_span.clone().entered();
        info!("Launch requested");

        self.transitioning = true;
        self.launch_seq += 1;
        self.launched_url = target.url().map(str::to_string);
        self.target = Some(target);
        self.set_state(LifecycleState::Launching);
        self.emit(UiEvent::ButtonsDisableRequested);
        self.emit(UiEvent::PlaySoundRequested(SoundId::Launch));

        self.generations.advance();
        self.schedule(TimerKind::DispatchDelay, self.config.launch_delay);
    }

    fn on_process_launched(&mut self, handle: ActiveProcessHandle) {
        if self.state != LifecycleState::WaitingForProcess {
            debug!(state = %self.state, process = %handle, "Launch confirmation ignored");
            return;
        }
        let _enter = self.launch_span.clone().entered();
        info!(process = %handle, "Launch confirmed");

        if let Some(oracle) = &self.oracle {
            oracle.set_process_name(&handle.name);
        }
        self.active = Some(handle);

        // The oracle may already have started the hide sequence
        if !self.transitioning {
            self.begin_hide();
        }
    }

    fn on_liveness_changed(&mut self, alive: bool, process: Option<ActiveProcessHandle>) {
        if let Some(process) = process {
            self.adopt_sighting(process);
        }
        if self.transitioning {
            trace!(alive, state = %self.state, "Liveness change deferred during transition");
            self.deferred_liveness = Some(alive);
            return;
        }
        match (self.state, alive) {
            (LifecycleState::WaitingForProcess, true) => {
                let _enter = self.launch_span.clone().entered();
                info!("Target detected by liveness oracle before confirmation");
                self.begin_hide();
            }
            (LifecycleState::AppRunning, false) => {
                let _enter = self.launch_span.clone().entered();
                info!("Target no longer running");
                self.begin_termination(false);
            }
            (state, alive) => trace!(%state, alive, "Liveness change needs no transition"),
        }
    }

    fn on_terminate_requested(&mut self) {
        if !self.state.accepts_termination() {
            debug!(state = %self.state, "Terminate ignored");
            return;
        }
        if !self.cooldown.try_accept(Instant::now()) {
            debug!("Terminate dropped inside cool-down");
            return;
        }
        let _enter = self.launch_span.clone().entered();
        info!("Terminate requested");
        self.begin_termination(true);
    }

    fn on_timer(&mut self, generation: Generation, kind: TimerKind) {
        if !self.generations.is_current(generation) {
            trace!(?kind, generation, "Abandoned timer");
            return;
        }
        let _enter = self.launch_span.clone().entered();

        match (kind, self.state) {
            (TimerKind::DispatchDelay, LifecycleState::Launching) => {
                self.transitioning = false;
                self.set_state(LifecycleState::WaitingForProcess);
                self.dispatch();
                self.schedule(TimerKind::LaunchTimeout, self.config.launch_timeout);
            }
            (TimerKind::LaunchTimeout, LifecycleState::WaitingForProcess) => {
                warn!(
                    timeout_ms = self.config.launch_timeout.as_millis() as u64,
                    "No launch confirmation, returning to launcher"
                );
                self.abandon_launch();
            }
            (TimerKind::HideDelay, LifecycleState::WaitingForProcess) => {
                self.emit(UiEvent::NavigationEnableRequested(false));
                self.emit(UiEvent::VisibilityChangeRequested(false));
                self.transitioning = false;
                self.set_state(LifecycleState::AppRunning);
                if self.deferred_liveness.take() == Some(false) {
                    info!("Target exited while the launcher was hiding");
                    self.begin_termination(false);
                }
            }
            (TimerKind::ReappearDelay, LifecycleState::Reappearing) => {
                self.emit(UiEvent::VisibilityChangeRequested(true));
                self.emit(UiEvent::ButtonsEnableRequested);
                self.emit(UiEvent::NavigationEnableRequested(true));
                self.transitioning = false;
                self.deferred_liveness = None;
                self.launch_id = None;
                self.set_state(LifecycleState::Idle);
                info!("Launcher restored");
                self.launch_span = Span::none();
            }
            (kind, state) => trace!(?kind, %state, "Timer does not apply to current state"),
        }
    }

    fn on_dispatch_finished(
        &mut self,
        launch_seq: u64,
        result: LaunchResult<Option<ActiveProcessHandle>>,
    ) {
        if launch_seq != self.launch_seq {
            // The launch ended while the dispatcher ran; do not leave an
            // application running behind a visible launcher
            if let Ok(Some(orphan)) = result {
                warn!(process = %orphan, "Late launch result, tearing down orphan");
                self.spawn_teardown(Some(orphan), None);
            }
            return;
        }

        let _enter = self.launch_span.clone().entered();
        match result {
            Ok(Some(handle)) => self.adopt_dispatched(handle),
            Ok(None) => debug!("Dispatcher will confirm asynchronously"),
            Err(e) if self.state == LifecycleState::WaitingForProcess && !self.transitioning => {
                warn!(error = %e, "Launch failed, returning to launcher");
                self.abandon_launch();
            }
            Err(e) => warn!(error = %e, state = %self.state, "Launch error after target was seen"),
        }
    }

    fn on_teardown_finished(&mut self, report: TeardownReport) {
        self.teardowns_completed += 1;
        if report.is_clean() {
            debug!(?report, "Teardown finished");
        } else {
            warn!(?report, "Teardown finished with leftovers");
        }
    }

    fn on_shutdown(&mut self) {
        info!(state = %self.state, "Shutdown requested");
        self.generations.advance();
        self.launch_seq += 1;
        if let Some(oracle) = &self.oracle {
            oracle.disarm();
        }
        self.target = None;
        self.active = None;
        self.launched_url = None;
        self.launch_id = None;
        self.transitioning = false;
        self.deferred_liveness = None;
        // Snap without exit hooks or UI requests
        if self.state != LifecycleState::Idle {
            self.state = LifecycleState::Idle;
            self.entered_at = Instant::now();
            self.emit(UiEvent::StateChanged(LifecycleState::Idle));
            self.publish();
            self.state_tx.send_replace(LifecycleState::Idle);
        }
    }

    // -------------------------------------------------------------------------
    // Adoption
    // -------------------------------------------------------------------------

    /// Dispatcher handle for the current launch
    fn adopt_dispatched(&mut self, handle: ActiveProcessHandle) {
        match self.state {
            LifecycleState::WaitingForProcess => self.on_process_launched(handle),
            // The oracle confirmed first and the launcher is already hidden
            LifecycleState::AppRunning => {
                info!(process = %handle, "Dispatcher confirmed running application");
                if let Some(oracle) = &self.oracle {
                    oracle.set_process_name(&handle.name);
                }
                self.active = Some(handle);
            }
            state => {
                warn!(process = %handle, %state, "Launch result outside a session, tearing down");
                self.spawn_teardown(Some(handle), None);
            }
        }
    }

    /// Native instance matched by the oracle; web sessions are torn down by URL
    fn adopt_sighting(&mut self, process: ActiveProcessHandle) {
        let native = self.target.as_ref().is_some_and(|t| !t.is_web);
        let in_session = matches!(
            self.state,
            LifecycleState::WaitingForProcess | LifecycleState::AppRunning
        );
        if self.active.is_some() || !native || !in_session {
            return;
        }
        let _enter = self.launch_span.clone().entered();
        info!(process = %process, "Adopting process found by liveness oracle");
        self.active = Some(process);
    }

    // -------------------------------------------------------------------------
    // Sequences
    // -------------------------------------------------------------------------

    fn begin_hide(&mut self) {
        self.transitioning = true;
        self.deferred_liveness = None;
        self.generations.advance();
        let is_web = self.target.as_ref().map(|t| t.is_web).unwrap_or(false);
        self.schedule(TimerKind::HideDelay, self.config.hide_delay(is_web));
    }

    fn begin_termination(&mut self, explicit_kill: bool) {
        self.transitioning = true;
        self.generations.advance();
        self.launch_seq += 1;
        self.set_state(LifecycleState::Terminating);
        self.emit(UiEvent::PlaySoundRequested(SoundId::Return));

        let active = self.active.take();
        let url = self.launched_url.take();
        self.target = None;

        if explicit_kill {
            let web = url.map(|url| BrowserTeardown {
                browsers: self.monitored.browsers().map(str::to_string).collect(),
                url,
            });
            self.spawn_teardown(active, web);
        } else {
            debug!("Application already gone, skipping explicit kill");
        }

        self.begin_reappear();
    }

    fn begin_reappear(&mut self) {
        self.set_state(LifecycleState::Reappearing);
        self.schedule(TimerKind::ReappearDelay, self.config.reappear_delay);
    }

    /// Recoverable launch failure: restore the launcher
    fn abandon_launch(&mut self) {
        self.transitioning = true;
        self.generations.advance();
        self.launch_seq += 1;
        self.active = None;
        self.launched_url = None;
        self.target = None;
        self.begin_reappear();
    }

    // -------------------------------------------------------------------------
    // State and side effects
    // -------------------------------------------------------------------------

    /// Guarded setter: exit hook, entry bookkeeping, entry hook, publication
    fn set_state(&mut self, next: LifecycleState) {
        let previous = self.state;
        if previous == next {
            return;
        }
        if !previous.can_transition_to(next) {
            warn!(from = %previous, to = %next, "Unexpected lifecycle transition");
        }

        self.on_exit(previous);
        self.state = next;
        self.entered_at = Instant::now();
        self.on_enter(next);

        debug!(from = %previous, to = %next, "Lifecycle transition");
        self.emit(UiEvent::StateChanged(next));
        // Watchers wake only after events and snapshot are current
        self.publish();
        self.state_tx.send_replace(next);
    }

    fn on_exit(&mut self, state: LifecycleState) {
        let elapsed_ms = self.entered_at.elapsed().as_millis() as u64;
        match state {
            LifecycleState::WaitingForProcess => debug!(elapsed_ms, "Left WaitingForProcess"),
            LifecycleState::AppRunning => info!(elapsed_ms, "Application session ended"),
            _ => {}
        }
    }

    fn on_enter(&mut self, state: LifecycleState) {
        match state {
            LifecycleState::WaitingForProcess => {
                if let (Some(oracle), Some(target)) = (&self.oracle, &self.target) {
                    let watch = match target.url() {
                        Some(url) => OracleTarget::web(url),
                        None => OracleTarget::native(),
                    };
                    oracle.arm(watch);
                }
            }
            LifecycleState::Terminating | LifecycleState::Reappearing | LifecycleState::Idle => {
                if let Some(oracle) = &self.oracle {
                    oracle.disarm();
                }
            }
            LifecycleState::Launching | LifecycleState::AppRunning => {}
        }
    }

    fn emit(&self, event: UiEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let mut shared = self.shared.write();
        shared.state = self.state;
        shared.entered_at = self.entered_at;
        shared.active = self.active.clone();
        shared.launched_url = self.launched_url.clone();
        shared.launch_id = self.launch_id;
        shared.transitioning = self.transitioning;
        shared.teardowns_completed = self.teardowns_completed;
    }

    /// Post a timer for the current generation
    fn schedule(&self, kind: TimerKind, delay: Duration) {
        let token = self.generations.token();
        let outbox = self.outbox.clone();
        tokio::spawn(async move {
            if let Some(generation) = token.sleep(delay).await {
                post(&outbox, Command::Timer { generation, kind });
            }
        });
    }

    fn dispatch(&self) {
        let Some(target) = self.target.clone() else {
            return;
        };
        let launch_seq = self.launch_seq;
        let dispatcher = Arc::clone(&self.dispatcher);
        let outbox = self.outbox.clone();
        let span = self.launch_span.clone();
        let runtime = tokio::runtime::Handle::current();
        tokio::spawn(
            async move {
                // Dispatchers may block; keep them off the async workers
                let blocking = tokio::task::spawn_blocking(move || {
                    let _runtime = runtime.enter();
                    let _span = span.entered();
                    dispatcher.dispatch(&target)
                });
                let result = match blocking.await {
                    Ok(result) => result,
                    Err(e) => Err(LaunchError::SpawnFailed {
                        command: "dispatcher".to_string(),
                        reason: e.to_string(),
                    }),
                };
                post(&outbox, Command::DispatchFinished { launch_seq, result });
            }
            .instrument(self.launch_span.clone()),
        );
    }

    fn spawn_teardown(&self, active: Option<ActiveProcessHandle>, web: Option<BrowserTeardown>) {
        if active.is_none() && web.is_none() {
            debug!("Nothing to tear down");
            return;
        }
        let engine = self.engine.clone();
        let budget = self.config.kill_budget;
        let outbox = self.outbox.clone();
        tokio::spawn(
            async move {
                let _op = span_operation("teardown");
                let report = engine.teardown(active.as_ref(), web.as_ref(), budget).await;
                post(&outbox, Command::TeardownFinished(report));
            }
            .instrument(self.launch_span.clone()),
        );
    }
}

/// Post back into the inbox unless the coordination task is gone
fn post(outbox: &flume::WeakSender<Command>, command: Command) {
    if let Some(outbox) = outbox.upgrade() {
        let _ = outbox.send(command);
    }
}
