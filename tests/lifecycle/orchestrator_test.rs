/*!
 * Orchestrator Tests
 * State machine transitions, UI event ordering and recovery paths
 */

use crate::common::*;
use kiosk_orchestrator::core::errors::{TerminationError, TerminationResult};
use kiosk_orchestrator::lifecycle::{LifecycleState, OrchestratorBuilder, SoundId, UiEvent};
use kiosk_orchestrator::process::{ProcessControl, ProcessProbe, Signalled};
use kiosk_orchestrator::{ActiveProcessHandle, LaunchTarget, OrchestratorError, Pid, ProcessEntry};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn game() -> ProcessEntry {
    ProcessEntry::new(4242, 1, "retroarch", "/usr/bin/retroarch --fullscreen")
}

async fn running_native(
    system: &Arc<FakeSystem>,
) -> (kiosk_orchestrator::OrchestratorHandle, Arc<FakeDispatcher>) {
    let dispatcher = FakeDispatcher::new(Arc::clone(system), DispatchBehaviour::Confirm(game()));
    let handle = orchestrator(fast_config(), system, &dispatcher, false);
    handle.launch(LaunchTarget::native("/usr/bin/retroarch --fullscreen")).unwrap();
    handle.wait_for_state(LifecycleState::AppRunning, WAIT).await.unwrap();
    (handle, dispatcher)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_launch_hides_launcher_in_order() {
    let system = FakeSystem::new(vec![ProcessEntry::new(1, 0, "init", "/sbin/init")]);
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Confirm(game()));
    let handle = orchestrator(fast_config(), &system, &dispatcher, false);
    let mut events = handle.subscribe();

    handle.launch(LaunchTarget::native("/usr/bin/retroarch --fullscreen")).unwrap();
    handle.wait_for_state(LifecycleState::AppRunning, WAIT).await.unwrap();

    assert_eq!(
        drain(&mut events),
        vec![
            UiEvent::StateChanged(LifecycleState::Launching),
            UiEvent::ButtonsDisableRequested,
            UiEvent::PlaySoundRequested(SoundId::Launch),
            UiEvent::StateChanged(LifecycleState::WaitingForProcess),
            UiEvent::NavigationEnableRequested(false),
            UiEvent::VisibilityChangeRequested(false),
            UiEvent::StateChanged(LifecycleState::AppRunning),
        ]
    );

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.active, Some(ActiveProcessHandle::new(4242, "retroarch")));
    assert_eq!(snapshot.launched_url, None);
    assert!(snapshot.launch_id.is_some());
    assert!(!snapshot.transitioning);
    assert_eq!(dispatcher.dispatched().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_launch_while_busy_is_ignored() {
    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Silent);
    let handle = orchestrator(fast_config(), &system, &dispatcher, false);

    handle.launch(LaunchTarget::web("https://a.example")).unwrap();
    handle
        .wait_for_state(LifecycleState::WaitingForProcess, WAIT)
        .await
        .unwrap();
    let before = handle.snapshot();

    handle.launch(LaunchTarget::web("https://b.example")).unwrap();
    handle.launch(LaunchTarget::native("/usr/bin/mpv")).unwrap();
    settle(&handle).await;

    let after = handle.snapshot();
    assert_eq!(after.state, LifecycleState::WaitingForProcess);
    assert_eq!(after.launched_url.as_deref(), Some("https://a.example"));
    assert_eq!(after.launch_id, before.launch_id);
    assert_eq!(dispatcher.dispatched(), vec![LaunchTarget::web("https://a.example")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_launch_timeout_returns_to_idle() {
    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Silent);
    let config = fast_config().with_launch_timeout(Duration::from_millis(80));
    let handle = orchestrator(config, &system, &dispatcher, false);
    let mut events = handle.subscribe();

    handle.launch(LaunchTarget::native("/usr/bin/never-starts")).unwrap();
    handle
        .wait_for_state(LifecycleState::WaitingForProcess, WAIT)
        .await
        .unwrap();
    handle.wait_for_state(LifecycleState::Idle, WAIT).await.unwrap();

    let requests = ui_requests(&drain(&mut events));
    assert_eq!(
        &requests[requests.len() - 3..],
        &[
            UiEvent::VisibilityChangeRequested(true),
            UiEvent::ButtonsEnableRequested,
            UiEvent::NavigationEnableRequested(true),
        ]
    );

    // Not locked out
    dispatcher.set_behaviour(DispatchBehaviour::Confirm(game()));
    handle.launch(LaunchTarget::native("/usr/bin/retroarch")).unwrap();
    handle.wait_for_state(LifecycleState::AppRunning, WAIT).await.unwrap();
    assert_eq!(dispatcher.dispatched().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_result_after_abandoned_launch_is_torn_down() {
    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Confirm(game()));
    dispatcher.with_delay(Duration::from_millis(250));
    let config = fast_config().with_launch_timeout(Duration::from_millis(60));
    let handle = orchestrator(config, &system, &dispatcher, false);

    handle.launch(LaunchTarget::native("/usr/bin/retroarch")).unwrap();
    handle
        .wait_for_state(LifecycleState::WaitingForProcess, WAIT)
        .await
        .unwrap();
    handle.wait_for_state(LifecycleState::Idle, WAIT).await.unwrap();

    assert!(eventually(&handle, |s| s.teardowns_completed == 1).await);
    assert!(!system.is_listed(4242));
    assert!(handle.snapshot().active.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispatch_failure_returns_to_idle() {
    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Fail);
    let handle = orchestrator(fast_config(), &system, &dispatcher, false);
    let mut events = handle.subscribe();

    handle.launch(LaunchTarget::native("/missing/binary")).unwrap();
    let seen = events_until(&mut events, LifecycleState::Idle).await;

    assert!(seen.contains(&UiEvent::StateChanged(LifecycleState::Reappearing)));
    assert!(!seen.contains(&UiEvent::StateChanged(LifecycleState::AppRunning)));
    assert_eq!(seen.last(), Some(&UiEvent::StateChanged(LifecycleState::Idle)));
    assert!(handle.snapshot().active.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_confirmation_outside_waiting_is_ignored() {
    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Silent);
    let handle = orchestrator(fast_config(), &system, &dispatcher, false);
    let mut events = handle.subscribe();

    handle.process_launched(77, "stray").unwrap();
    handle.terminate().unwrap();
    handle.liveness_changed(false).unwrap();
    settle(&handle).await;

    assert_eq!(handle.state(), LifecycleState::Idle);
    assert!(handle.snapshot().active.is_none());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_external_confirmation_after_silent_dispatch() {
    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Silent);
    let handle = orchestrator(fast_config(), &system, &dispatcher, false);

    handle.launch(LaunchTarget::native("/usr/bin/retroarch")).unwrap();
    handle
        .wait_for_state(LifecycleState::WaitingForProcess, WAIT)
        .await
        .unwrap();
    handle.process_launched(4242, "retroarch").unwrap();
    handle.wait_for_state(LifecycleState::AppRunning, WAIT).await.unwrap();
    assert_eq!(
        handle.snapshot().active,
        Some(ActiveProcessHandle::new(4242, "retroarch"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_liveness_loss_skips_explicit_kill() {
    let system = FakeSystem::new(Vec::new());
    let (handle, _dispatcher) = running_native(&system).await;
    let mut events = handle.subscribe();

    handle.liveness_changed(false).unwrap();
    handle.wait_for_state(LifecycleState::Idle, WAIT).await.unwrap();
    settle(&handle).await;

    assert_eq!(
        ui_requests(&drain(&mut events)),
        vec![
            UiEvent::PlaySoundRequested(SoundId::Return),
            UiEvent::VisibilityChangeRequested(true),
            UiEvent::ButtonsEnableRequested,
            UiEvent::NavigationEnableRequested(true),
        ]
    );
    assert!(system.sent().is_empty());
    assert_eq!(handle.snapshot().teardowns_completed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_explicit_terminate_kills_and_restores() {
    let system = FakeSystem::new(Vec::new());
    let (handle, _dispatcher) = running_native(&system).await;

    handle.terminate().unwrap();
    handle.wait_for_state(LifecycleState::Idle, WAIT).await.unwrap();
    assert!(eventually(&handle, |s| s.teardowns_completed == 1).await);

    assert!(!system.is_listed(4242));
    assert_eq!(system.sent().first(), Some(&Sent::Term(4242)));
}

/// Control whose every call fails and whose targets never die
struct BrokenControl;

impl ProcessControl for BrokenControl {
    fn terminate(&self, pid: Pid) -> TerminationResult<Signalled> {
        Err(TerminationError::SignalFailed {
            pid,
            reason: "EPERM".into(),
        })
    }

    fn force_kill(&self, pid: Pid) -> TerminationResult<Signalled> {
        Err(TerminationError::SignalFailed {
            pid,
            reason: "EPERM".into(),
        })
    }

    fn kill_by_name(&self, name: &str) -> TerminationResult<()> {
        Err(TerminationError::KillByNameFailed {
            name: name.to_string(),
            reason: "EPERM".into(),
        })
    }

    fn is_alive(&self, _pid: Pid) -> bool {
        true
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_terminate_reaches_idle_when_kills_fail() {
    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Confirm(game()));
    let handle = OrchestratorBuilder::new(fast_config())
        .with_probe(Arc::clone(&system) as Arc<dyn ProcessProbe>)
        .with_control(Arc::new(BrokenControl))
        .with_dispatcher(dispatcher)
        .without_oracle()
        .spawn();

    handle.launch(LaunchTarget::native("/usr/bin/retroarch")).unwrap();
    handle.wait_for_state(LifecycleState::AppRunning, WAIT).await.unwrap();

    handle.terminate().unwrap();
    handle.wait_for_state(LifecycleState::Idle, WAIT).await.unwrap();
    assert!(eventually(&handle, |s| s.teardowns_completed == 1).await);
    assert!(system.is_listed(4242));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_cancels_pending_waits() {
    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Silent);
    let handle = orchestrator(fast_config(), &system, &dispatcher, false);

    handle.launch(LaunchTarget::native("/usr/bin/retroarch")).unwrap();
    handle
        .wait_for_state(LifecycleState::WaitingForProcess, WAIT)
        .await
        .unwrap();

    handle.shutdown().await.unwrap();
    assert_eq!(handle.state(), LifecycleState::Idle);
    assert!(handle.is_closed());
    assert_eq!(
        handle.launch(LaunchTarget::native("/usr/bin/retroarch")),
        Err(OrchestratorError::Closed)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wait_for_state_times_out() {
    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Silent);
    let handle = orchestrator(fast_config(), &system, &dispatcher, false);

    let result = handle
        .wait_for_state(LifecycleState::AppRunning, Duration::from_millis(30))
        .await;
    assert!(matches!(result, Err(OrchestratorError::WaitTimeout(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_event_stream_and_state_watch() {
    use futures::StreamExt;

    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Confirm(game()));
    let handle = OrchestratorBuilder::new(fast_config())
        .with_probe(Arc::clone(&system) as Arc<dyn ProcessProbe>)
        .with_control(Arc::clone(&system) as Arc<dyn ProcessControl>)
        .with_dispatcher(dispatcher)
        .with_event_capacity(16)
        .without_oracle()
        .spawn();
    let mut stream = handle.subscribe_stream();
    let mut states = handle.watch_state();

    handle.launch(LaunchTarget::native("/usr/bin/retroarch")).unwrap();
    let first = tokio::time::timeout(WAIT, stream.next()).await.unwrap();
    assert_eq!(
        first.map(|r| r.unwrap()),
        Some(UiEvent::StateChanged(LifecycleState::Launching))
    );

    states
        .wait_for(|s| *s == LifecycleState::AppRunning)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(handle.snapshot().time_in_state() >= Duration::from_millis(20));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_task_stops_when_every_handle_is_dropped() {
    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Silent);
    let handle = orchestrator(fast_config(), &system, &dispatcher, true);
    let machine_dispatcher = Arc::downgrade(&dispatcher);
    let mut states = handle.watch_state();

    drop(handle);
    drop(dispatcher);

    // The state channel closes once the coordination task has finished
    let closed = tokio::time::timeout(WAIT, states.changed()).await.unwrap();
    assert!(closed.is_err());
    assert!(machine_dispatcher.upgrade().is_none());
}

#[tokio::test]
async fn test_slow_dispatcher_leaves_runtime_responsive() {
    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Confirm(game()));
    dispatcher.with_delay(Duration::from_millis(400));
    let handle = orchestrator(fast_config(), &system, &dispatcher, false);

    handle.launch(LaunchTarget::native("/usr/bin/retroarch")).unwrap();
    handle
        .wait_for_state(LifecycleState::WaitingForProcess, WAIT)
        .await
        .unwrap();

    // Single-threaded runtime: a dispatcher blocking a worker would stall this timer
    let started = std::time::Instant::now();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(
        started.elapsed() < Duration::from_millis(300),
        "timer delayed {:?}",
        started.elapsed()
    );

    handle.wait_for_state(LifecycleState::AppRunning, WAIT).await.unwrap();
    assert_eq!(handle.snapshot().active.map(|a| a.pid), Some(4242));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_launch_outside_idle_is_noop(urls in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let system = FakeSystem::new(Vec::new());
            let (handle, dispatcher) = running_native(&system).await;
            let before = handle.snapshot();

            for url in &urls {
                handle.launch(LaunchTarget::web(format!("https://{url}.example"))).unwrap();
                handle.launch(LaunchTarget::native(url.clone())).unwrap();
            }
            settle(&handle).await;

            let after = handle.snapshot();
            assert_eq!(after.state, LifecycleState::AppRunning);
            assert_eq!(after.active, before.active);
            assert_eq!(after.launch_id, before.launch_id);
            assert_eq!(dispatcher.dispatched().len(), 1);
        });
    }
}
