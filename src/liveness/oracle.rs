/*!
 * Liveness Oracle
 *
 * Polls the process table to decide whether the active target is still
 * running. Polling is used instead of child-exit notification because the
 * target is often not a direct child: a resident media player, or a browser
 * that hands the app window to an already running instance.
 *
 * Checks pass through a single-flight gate with bounded-wait entry. The gate
 * pass travels with the blocking OS query, so a query stuck past its budget
 * keeps the gate closed and later ticks are skipped instead of piling up.
 */

use super::debounce::Debouncer;
use crate::core::config::{MonitoredProcessSet, OrchestratorConfig};
use crate::core::gate::Gate;
use crate::core::types::ProcessEntry;
use crate::process::matching::{has_app_url, instances_of};
use crate::process::traits::{ProcessProbe, WindowOwners};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// What the oracle is currently watching
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OracleTarget {
    /// Launched URL for web targets
    pub url: Option<String>,
    /// Name of the confirmed process, once known
    pub process_name: Option<String>,
}

impl OracleTarget {
    pub fn web(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            process_name: None,
        }
    }

    pub fn native() -> Self {
        Self::default()
    }

    pub fn is_web(&self) -> bool {
        self.url.is_some()
    }
}

/// One debounced liveness flip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Liveness {
    pub alive: bool,
    /// Instance that satisfied the liveness rules; only set when alive
    pub process: Option<ProcessEntry>,
}

/// Oracle timing, taken from the orchestrator config
#[derive(Debug, Clone, Copy)]
pub struct OracleTiming {
    pub poll_interval: Duration,
    pub debounce_window: Duration,
    pub check_budget: Duration,
    pub gate_wait: Duration,
}

impl From<&OrchestratorConfig> for OracleTiming {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            debounce_window: config.debounce_window,
            check_budget: config.check_budget,
            gate_wait: config.gate_wait,
        }
    }
}

pub struct LivenessOracle {
    probe: Arc<dyn ProcessProbe>,
    monitored: Arc<MonitoredProcessSet>,
    app_mode_marker: Arc<str>,
    timing: OracleTiming,
    gate: Gate,
    target: Mutex<Option<OracleTarget>>,
    debouncer: Mutex<Debouncer>,
    /// Bumped on every arm/disarm so in-flight results for an old target are dropped
    epoch: AtomicU64,
}

impl LivenessOracle {
    pub fn new(
        probe: Arc<dyn ProcessProbe>,
        monitored: MonitoredProcessSet,
        app_mode_marker: impl Into<Arc<str>>,
        timing: OracleTiming,
    ) -> Self {
        Self {
            probe,
            monitored: Arc::new(monitored),
            app_mode_marker: app_mode_marker.into(),
            gate: Gate::new("liveness", timing.gate_wait),
            timing,
            target: Mutex::new(None),
            debouncer: Mutex::new(Debouncer::new(timing.debounce_window)),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn from_config(probe: Arc<dyn ProcessProbe>, config: &OrchestratorConfig) -> Self {
        Self::new(
            probe,
            MonitoredProcessSet::from_config(config),
            config.app_mode_marker.as_str(),
            OracleTiming::from(config),
        )
    }

    /// Start watching a target; resets the debouncer
    pub fn arm(&self, target: OracleTarget) {
        debug!(target = ?target, "Liveness oracle armed");
        *self.target.lock() = Some(target);
        self.debouncer.lock().reset();
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Record the confirmed process name for the armed target
    pub fn set_process_name(&self, name: &str) {
        if let Some(target) = self.target.lock().as_mut() {
            target.process_name = Some(name.to_string());
        }
    }

    pub fn disarm(&self) {
        if self.target.lock().take().is_some() {
            debug!("Liveness oracle disarmed");
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_armed(&self) -> bool {
        self.target.lock().is_some()
    }

    pub fn target(&self) -> Option<OracleTarget> {
        self.target.lock().clone()
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Run one bounded check
    ///
    /// `None` when disarmed, when the gate is busy, or when the check ran
    /// past its budget.
    pub async fn check_once(&self) -> Option<bool> {
        self.sample().await.map(|seen| seen.is_some())
    }

    /// Bounded check that keeps the matching instance
    async fn sample(&self) -> Option<Option<ProcessEntry>> {
        let target = self.target()?;
        let Some(pass) = self.gate.enter().await else {
            trace!("Liveness check skipped, previous check still running");
            return None;
        };

        let probe = Arc::clone(&self.probe);
        let monitored = Arc::clone(&self.monitored);
        let marker = Arc::clone(&self.app_mode_marker);
        let task = tokio::task::spawn_blocking(move || {
            let _pass = pass;
            evaluate(probe.as_ref(), &monitored, &target, &marker)
        });

        match tokio::time::timeout(self.timing.check_budget, task).await {
            Ok(Ok(seen)) => Some(seen),
            Ok(Err(e)) => {
                warn!(error = %e, "Liveness check task failed");
                Some(None)
            }
            Err(_) => {
                warn!(
                    budget_ms = self.timing.check_budget.as_millis() as u64,
                    "Liveness check exceeded its budget"
                );
                None
            }
        }
    }

    /// Check and debounce; returns a value only when it should be delivered
    pub async fn poll(&self) -> Option<Liveness> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let seen = self.sample().await?;
        if self.epoch.load(Ordering::Acquire) != epoch {
            trace!("Dropping liveness result for a previous target");
            return None;
        }
        let alive = self.debouncer.lock().observe(seen.is_some(), Instant::now())?;
        Some(Liveness {
            alive,
            process: seen.filter(|_| alive),
        })
    }

    /// Start the polling loop; `deliver` receives every debounced flip
    pub fn spawn<F>(self: Arc<Self>, deliver: F) -> OracleTask
    where
        F: Fn(Liveness) + Send + Sync + 'static,
    {
        let oracle = self;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(oracle.timing.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !oracle.is_armed() {
                    continue;
                }
                if let Some(liveness) = oracle.poll().await {
                    debug!(alive = liveness.alive, "Liveness changed");
                    deliver(liveness);
                }
            }
        });
        OracleTask {
            handle: Some(handle),
        }
    }
}

/// Polling loop handle; aborts the loop when dropped
#[derive(Debug)]
pub struct OracleTask {
    handle: Option<JoinHandle<()>>,
}

impl OracleTask {
    pub fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for OracleTask {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Query the probe and apply the liveness rules
///
/// Returns the instance that keeps the target alive. Query failures count
/// as "not running".
pub fn evaluate(
    probe: &dyn ProcessProbe,
    monitored: &MonitoredProcessSet,
    target: &OracleTarget,
    marker: &str,
) -> Option<ProcessEntry> {
    let snapshot = match probe.snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "Process table query failed, assuming not running");
            return None;
        }
    };

    let windows = match probe.window_owners() {
        Ok(windows) => windows,
        Err(e) => {
            debug!(error = %e, "Window listing failed, assuming no visible windows");
            WindowOwners::none()
        }
    };
    find_live(&snapshot, &windows, monitored, target, marker).cloned()
}

/// Liveness rules over one snapshot
///
/// 1. Any media player instance is alive, window or not.
/// 2. Web targets: a windowed browser whose command line carries the
///    app-mode marker for the launched URL.
/// 3. Native targets: any windowed instance of a monitored name or of the
///    confirmed process name.
///
/// Target matches win over a resident media player when both are present.
pub fn find_live<'a>(
    snapshot: &'a [ProcessEntry],
    windows: &WindowOwners,
    monitored: &MonitoredProcessSet,
    target: &OracleTarget,
    marker: &str,
) -> Option<&'a ProcessEntry> {
    let extra = target.process_name.as_deref();
    let matched = match &target.url {
        Some(url) => monitored.browsers().chain(extra).find_map(|browser| {
            instances_of(snapshot, browser)
                .find(|e| windows.contains(e.pid) && has_app_url(&e.cmdline, marker, url))
        }),
        None => monitored
            .windowed()
            .chain(extra)
            .find_map(|name| instances_of(snapshot, name).find(|e| windows.contains(e.pid))),
    };
    matched.or_else(|| {
        monitored
            .media_players()
            .find_map(|name| instances_of(snapshot, name).next())
    })
}

pub fn check_liveness(
    snapshot: &[ProcessEntry],
    windows: &WindowOwners,
    monitored: &MonitoredProcessSet,
    target: &OracleTarget,
    marker: &str,
) -> bool {
    find_live(snapshot, windows, monitored, target, marker).is_some()
}
