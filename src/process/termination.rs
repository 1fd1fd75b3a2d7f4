/*!
 * Process Termination Engine
 *
 * Kills a process and its descendants with escalating fallback:
 * SIGTERM and a bounded wait, then SIGKILL by PID, then kill-by-name for
 * stale handles. Each tier is caught and logged on its own, so a failure in
 * one never blocks the next. "Already exited" counts as success everywhere,
 * which makes every operation here idempotent.
 */

use super::matching::{has_app_url, name_matches};
use super::traits::{ProcessControl, ProcessProbe, Signalled};
use crate::core::errors::TerminationError;
use crate::core::gate::Gate;
use crate::core::limits::{
    DEFAULT_APP_MODE_MARKER, FORCE_KILL_SETTLE, KILL_POLL_STEP, MAX_TREE_PROCESSES,
    TERMINATION_GATE_WAIT,
};
use crate::core::types::{ActiveProcessHandle, Pid, ProcessEntry};
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Escalation tier that finished a process off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillTier {
    Graceful,
    ForceById,
    ForceByName,
}

/// Result of a single-process kill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    AlreadyExited,
    Exited(KillTier),
    /// Every tier ran and the process is still there
    Survived,
    /// The termination gate was busy
    Skipped,
}

impl KillOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::AlreadyExited | Self::Exited(_))
    }
}

/// Result of a process-tree kill
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeReport {
    pub root: Pid,
    pub killed: Vec<Pid>,
    pub already_exited: Vec<Pid>,
    pub failed: Vec<Pid>,
    pub orphans_swept: Vec<Pid>,
    pub skipped: bool,
}

impl TreeReport {
    fn new(root: Pid) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    fn skipped(root: Pid) -> Self {
        Self {
            root,
            skipped: true,
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.skipped && self.failed.is_empty()
    }
}

/// Result of tearing down a launched application
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub process: Option<TreeReport>,
    pub browsers: Vec<TreeReport>,
    pub skipped: bool,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        !self.skipped
            && self.process.as_ref().map_or(true, TreeReport::is_clean)
            && self.browsers.iter().all(TreeReport::is_clean)
    }
}

/// Web teardown parameters: browser names and the launched URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserTeardown {
    pub browsers: Vec<String>,
    pub url: String,
}

/// Kill engine with a bounded-wait gate against concurrent kill storms
#[derive(Clone)]
pub struct TerminationEngine {
    probe: Arc<dyn ProcessProbe>,
    control: Arc<dyn ProcessControl>,
    gate: Gate,
    app_mode_marker: String,
}

impl TerminationEngine {
    pub fn new(probe: Arc<dyn ProcessProbe>, control: Arc<dyn ProcessControl>) -> Self {
        Self {
            probe,
            control,
            gate: Gate::new("termination", TERMINATION_GATE_WAIT),
            app_mode_marker: DEFAULT_APP_MODE_MARKER.to_string(),
        }
    }

    #[must_use]
    pub fn with_app_mode_marker(mut self, marker: impl Into<String>) -> Self {
        self.app_mode_marker = marker.into();
        self
    }

    #[must_use]
    pub fn with_gate_wait(mut self, wait: Duration) -> Self {
        self.gate = Gate::new("termination", wait);
        self
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Kill one process with escalating fallback
    pub async fn safely_kill_process(
        &self,
        handle: &ActiveProcessHandle,
        budget: Duration,
    ) -> KillOutcome {
        let Some(_pass) = self.gate.enter().await else {
            warn!("Termination gate busy, skipping kill of {}", handle);
            return KillOutcome::Skipped;
        };
        self.kill_escalating(handle, budget).await
    }

    /// Kill a process and every descendant, leaves first
    pub async fn safely_terminate_process_tree(&self, root: Pid) -> TreeReport {
        let Some(_pass) = self.gate.enter().await else {
            warn!("Termination gate busy, skipping tree kill of PID {}", root);
            return TreeReport::skipped(root);
        };
        self.kill_tree(root, &[], None, false).await
    }

    /// Tree-kill every browser instance hosting `url` in app mode
    pub async fn terminate_browser_instances(
        &self,
        browsers: &[String],
        url: &str,
    ) -> Vec<TreeReport> {
        let Some(_pass) = self.gate.enter().await else {
            warn!("Termination gate busy, skipping browser teardown for {}", url);
            return Vec::new();
        };
        self.kill_browsers(browsers, url).await
    }

    /// Bulk-safe disposal of several handles
    pub async fn dispose_all(
        &self,
        handles: &[ActiveProcessHandle],
        budget: Duration,
    ) -> Vec<TreeReport> {
        let Some(_pass) = self.gate.enter().await else {
            warn!("Termination gate busy, skipping disposal of {} handles", handles.len());
            return handles.iter().map(|h| TreeReport::skipped(h.pid)).collect();
        };
        join_all(
            handles
                .iter()
                .map(|h| self.kill_tree(h.pid, std::slice::from_ref(&h.name), Some(budget), true)),
        )
        .await
    }

    /// Full teardown of a launched application and its hosting browser
    pub async fn teardown(
        &self,
        handle: Option<&ActiveProcessHandle>,
        web: Option<&BrowserTeardown>,
        budget: Duration,
    ) -> TeardownReport {
        let Some(_pass) = self.gate.enter().await else {
            warn!("Termination gate busy, teardown skipped");
            return TeardownReport {
                skipped: true,
                ..TeardownReport::default()
            };
        };

        let process = match handle {
            Some(h) => {
                // Web hosts are found by URL below; a name sweep would also hit
                // browser windows of other apps
                let names = std::slice::from_ref(&h.name);
                Some(self.kill_tree(h.pid, names, Some(budget), web.is_none()).await)
            }
            None => None,
        };
        let browsers = match web {
            Some(web) => self.kill_browsers(&web.browsers, &web.url).await,
            None => Vec::new(),
        };

        TeardownReport {
            process,
            browsers,
            skipped: false,
        }
    }

    async fn kill_escalating(&self, handle: &ActiveProcessHandle, budget: Duration) -> KillOutcome {
        let pid = handle.pid;

        match self.control.terminate(pid) {
            Ok(Signalled::AlreadyExited) => {
                debug!("{} already exited", handle);
                return KillOutcome::AlreadyExited;
            }
            Ok(Signalled::Delivered) => {
                if self.wait_for_exit(pid, budget).await {
                    info!("{} exited after SIGTERM", handle);
                    return KillOutcome::Exited(KillTier::Graceful);
                }
                let err = TerminationError::StillAlive {
                    pid,
                    waited_ms: budget.as_millis() as u64,
                };
                warn!("{}", err);
            }
            Err(e) => warn!("Graceful kill of {} failed: {}", handle, e),
        }

        match self.control.force_kill(pid) {
            Ok(Signalled::AlreadyExited) => return KillOutcome::Exited(KillTier::ForceById),
            Ok(Signalled::Delivered) => {
                if self.wait_for_exit(pid, FORCE_KILL_SETTLE).await {
                    info!("{} killed by PID", handle);
                    return KillOutcome::Exited(KillTier::ForceById);
                }
                warn!("{} survived SIGKILL", handle);
            }
            Err(e) => warn!("Forceful kill of {} failed: {}", handle, e),
        }

        let control = Arc::clone(&self.control);
        let name = handle.name.clone();
        match tokio::task::spawn_blocking(move || control.kill_by_name(&name)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{}", e),
            Err(e) => warn!("Kill-by-name task for {} failed: {}", handle, e),
        }

        if self.control.is_alive(pid) {
            error!("{} survived every termination tier", handle);
            KillOutcome::Survived
        } else {
            KillOutcome::Exited(KillTier::ForceByName)
        }
    }

    async fn wait_for_exit(&self, pid: Pid, budget: Duration) -> bool {
        let deadline = Instant::now() + budget;
        loop {
            if !self.control.is_alive(pid) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(KILL_POLL_STEP.min(deadline - now)).await;
        }
    }

    async fn snapshot(&self) -> Vec<ProcessEntry> {
        let probe = Arc::clone(&self.probe);
        match tokio::task::spawn_blocking(move || probe.snapshot()).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                warn!("Process table unavailable for teardown: {}", e);
                Vec::new()
            }
            Err(e) => {
                warn!("Process table task failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Descendants leaves-first, root last; `root_budget` gives the root a graceful tier
    ///
    /// With `sweep_if_gone`, a root that had already exited widens the sweep to
    /// every orphaned instance of `extra_names`.
    async fn kill_tree(
        &self,
        root: Pid,
        extra_names: &[String],
        root_budget: Option<Duration>,
        sweep_if_gone: bool,
    ) -> TreeReport {
        let mut report = TreeReport::new(root);
        let snapshot = self.snapshot().await;
        let plan = plan_tree_kill(&snapshot, root);
        // A root that is already gone may have forked the real application,
        // which was re-parented before this snapshot
        let root_gone = sweep_if_gone && plan.root_name.is_none();
        let mut names = plan.names;
        names.extend(extra_names.iter().cloned());

        // Parent links before the kill; processes that belonged to this tree,
        // or appeared during it, are candidates for the sweep
        let parents_before: HashMap<Pid, Pid> = snapshot.iter().map(|e| (e.pid, e.ppid)).collect();
        let mut members: HashSet<Pid> = plan.descendants.iter().copied().collect();
        members.insert(root);

        for pid in plan.descendants {
            self.record_force_kill(pid, &mut report, false);
        }

        match root_budget {
            Some(budget) => {
                let name = plan
                    .root_name
                    .or_else(|| extra_names.first().cloned())
                    .unwrap_or_default();
                let handle = ActiveProcessHandle::new(root, name);
                match self.kill_escalating(&handle, budget).await {
                    KillOutcome::AlreadyExited => report.already_exited.push(root),
                    KillOutcome::Exited(_) => report.killed.push(root),
                    KillOutcome::Survived | KillOutcome::Skipped => report.failed.push(root),
                }
            }
            None => self.record_force_kill(root, &mut report, false),
        }

        if !names.is_empty() {
            let after = self.snapshot().await;
            let live: HashSet<Pid> = after.iter().map(|e| e.pid).collect();
            let orphans: Vec<Pid> = after
                .iter()
                .filter(|e| !e.zombie && e.pid != root && e.pid != std::process::id())
                .filter(|e| e.ppid <= 1 || !live.contains(&e.ppid))
                .filter(|e| {
                    let member = parents_before
                        .get(&e.pid)
                        .map_or(true, |ppid| members.contains(ppid));
                    member || (root_gone && extra_names.iter().any(|n| name_matches(&e.name, n)))
                })
                .filter(|e| names.iter().any(|n| name_matches(&e.name, n)))
                .map(|e| e.pid)
                .collect();
            for pid in orphans {
                self.record_force_kill(pid, &mut report, true);
            }
            if !report.orphans_swept.is_empty() {
                info!(
                    "Swept {} orphaned processes after tree kill of PID {}",
                    report.orphans_swept.len(),
                    root
                );
            }
        }

        debug!(
            "Tree kill of PID {}: {} killed, {} already exited, {} failed",
            root,
            report.killed.len(),
            report.already_exited.len(),
            report.failed.len()
        );
        report
    }

    fn record_force_kill(&self, pid: Pid, report: &mut TreeReport, orphan: bool) {
        match self.control.force_kill(pid) {
            Ok(Signalled::Delivered) if orphan => report.orphans_swept.push(pid),
            Ok(Signalled::Delivered) => report.killed.push(pid),
            Ok(Signalled::AlreadyExited) => report.already_exited.push(pid),
            Err(e) => {
                warn!("{}", e);
                report.failed.push(pid);
            }
        }
    }

    async fn kill_browsers(&self, browsers: &[String], url: &str) -> Vec<TreeReport> {
        let snapshot = self.snapshot().await;
        let hosts: HashSet<Pid> = snapshot
            .iter()
            .filter(|e| !e.zombie)
            .filter(|e| browsers.iter().any(|b| name_matches(&e.name, b)))
            .filter(|e| has_app_url(&e.cmdline, &self.app_mode_marker, url))
            .map(|e| e.pid)
            .collect();

        // Only tree roots; nested hosts die with their parent
        let roots: Vec<Pid> = snapshot
            .iter()
            .filter(|e| hosts.contains(&e.pid) && !hosts.contains(&e.ppid))
            .map(|e| e.pid)
            .collect();

        if roots.is_empty() {
            debug!("No browser instance hosts {}", url);
            return Vec::new();
        }

        info!("Terminating {} browser instances hosting {}", roots.len(), url);
        let mut reports = Vec::with_capacity(roots.len());
        for root in roots {
            reports.push(self.kill_tree(root, browsers, None, false).await);
        }
        reports
    }
}

/// Kill order for a process tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreePlan {
    /// Descendants, deepest first
    pub descendants: Vec<Pid>,
    pub root_name: Option<String>,
    /// Names seen anywhere in the tree, for the orphan sweep
    pub names: BTreeSet<String>,
}

/// Walk parent links breadth-first from `root`
pub fn plan_tree_kill(snapshot: &[ProcessEntry], root: Pid) -> TreePlan {
    let mut children: HashMap<Pid, Vec<&ProcessEntry>> = HashMap::new();
    for entry in snapshot {
        if entry.pid != root {
            children.entry(entry.ppid).or_default().push(entry);
        }
    }

    let root_entry = snapshot.iter().find(|e| e.pid == root);
    let mut plan = TreePlan {
        root_name: root_entry.map(|e| e.name.clone()),
        ..TreePlan::default()
    };
    if let Some(entry) = root_entry {
        plan.names.insert(entry.name.clone());
    }

    let mut visited = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    let mut order = Vec::new();
    while let Some(current) = queue.pop_front() {
        for child in children.get(&current).into_iter().flatten() {
            if order.len() >= MAX_TREE_PROCESSES {
                warn!("Process tree of PID {} exceeds {} entries", root, MAX_TREE_PROCESSES);
                break;
            }
            if !visited.insert(child.pid) {
                continue;
            }
            queue.push_back(child.pid);
            plan.names.insert(child.name.clone());
            if !child.zombie {
                order.push(child.pid);
            }
        }
    }

    order.reverse();
    plan.descendants = order;
    plan
}
