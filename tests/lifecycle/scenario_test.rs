/*!
 * End-to-end Scenarios
 * Full sessions through the oracle and the termination engine over a fake OS
 */

use crate::common::*;
use kiosk_orchestrator::lifecycle::{LifecycleState, SoundId, UiEvent};
use kiosk_orchestrator::{LaunchTarget, ProcessEntry};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn browser_config() -> kiosk_orchestrator::OrchestratorConfig {
    fast_config().with_browser("/usr/bin/browser")
}

fn browser_window(pid: u32, url: &str) -> ProcessEntry {
    ProcessEntry::new(
        pid,
        1,
        "browser",
        format!("/usr/bin/browser --start-fullscreen --app={url}"),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_web_session_ends_when_window_closes() {
    let system = FakeSystem::new(vec![ProcessEntry::new(1, 0, "init", "/sbin/init")]);
    let dispatcher = FakeDispatcher::new(
        Arc::clone(&system),
        DispatchBehaviour::StartSilently(browser_window(100, "https://a.example")),
    );
    let handle = orchestrator(browser_config(), &system, &dispatcher, true);
    let mut events = handle.subscribe();

    handle.launch(LaunchTarget::web("https://a.example")).unwrap();
    handle
        .wait_for_state(LifecycleState::WaitingForProcess, WAIT)
        .await
        .unwrap();
    handle.process_launched(100, "browser").unwrap();

    let launch = events_until(&mut events, LifecycleState::AppRunning).await;
    assert_eq!(
        ui_requests(&launch),
        vec![
            UiEvent::ButtonsDisableRequested,
            UiEvent::PlaySoundRequested(SoundId::Launch),
            UiEvent::NavigationEnableRequested(false),
            UiEvent::VisibilityChangeRequested(false),
        ]
    );
    assert_eq!(handle.snapshot().launched_url.as_deref(), Some("https://a.example"));

    // User closes the window
    system.exit(100);

    let teardown = events_until(&mut events, LifecycleState::Idle).await;
    assert_eq!(
        teardown,
        vec![
            UiEvent::StateChanged(LifecycleState::Terminating),
            UiEvent::PlaySoundRequested(SoundId::Return),
            UiEvent::StateChanged(LifecycleState::Reappearing),
            UiEvent::VisibilityChangeRequested(true),
            UiEvent::ButtonsEnableRequested,
            UiEvent::NavigationEnableRequested(true),
            UiEvent::StateChanged(LifecycleState::Idle),
        ]
    );
    assert!(system.sent().is_empty(), "no explicit kill after natural exit");
    assert!(handle.snapshot().launched_url.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oracle_confirms_without_dispatcher() {
    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(
        Arc::clone(&system),
        DispatchBehaviour::StartSilently(browser_window(100, "https://a.example")),
    );
    let handle = orchestrator(browser_config(), &system, &dispatcher, true);

    handle.launch(LaunchTarget::web("https://a.example")).unwrap();
    handle.wait_for_state(LifecycleState::AppRunning, WAIT).await.unwrap();
    // Detected by the oracle only; no handle to kill
    assert!(handle.snapshot().active.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_window_of_other_url_does_not_count() {
    let system = FakeSystem::new(vec![browser_window(200, "https://b.example")]);
    let dispatcher = FakeDispatcher::new(Arc::clone(&system), DispatchBehaviour::Silent);
    let config = browser_config().with_launch_timeout(std::time::Duration::from_millis(200));
    let handle = orchestrator(config, &system, &dispatcher, true);
    let mut events = handle.subscribe();

    handle.launch(LaunchTarget::web("https://a.example")).unwrap();
    let seen = events_until(&mut events, LifecycleState::Idle).await;
    assert!(!seen.contains(&UiEvent::StateChanged(LifecycleState::AppRunning)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_double_terminate_runs_one_teardown() {
    let system = FakeSystem::new(vec![ProcessEntry::new(1, 0, "init", "/sbin/init")]);
    let dispatcher = FakeDispatcher::new(
        Arc::clone(&system),
        DispatchBehaviour::Confirm(ProcessEntry::new(4242, 1, "retroarch", "/usr/bin/retroarch")),
    );
    let handle = orchestrator(fast_config(), &system, &dispatcher, false);

    handle.launch(LaunchTarget::native("/usr/bin/retroarch")).unwrap();
    handle.wait_for_state(LifecycleState::AppRunning, WAIT).await.unwrap();

    handle.terminate().unwrap();
    handle.terminate().unwrap();
    handle.wait_for_state(LifecycleState::Idle, WAIT).await.unwrap();
    assert!(eventually(&handle, |s| s.teardowns_completed >= 1).await);
    settle(&handle).await;

    assert_eq!(handle.snapshot().teardowns_completed, 1);
    let terms = system
        .sent()
        .into_iter()
        .filter(|s| *s == Sent::Term(4242))
        .count();
    assert_eq!(terms, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_terminate_kills_tree_leaves_first() {
    let system = FakeSystem::new(vec![
        ProcessEntry::new(1, 0, "init", "/sbin/init"),
        ProcessEntry::new(4243, 4242, "retroarch-core", "core"),
        ProcessEntry::new(4244, 4243, "audio", "audio"),
    ]);
    let dispatcher = FakeDispatcher::new(
        Arc::clone(&system),
        DispatchBehaviour::Confirm(ProcessEntry::new(4242, 1, "retroarch", "/usr/bin/retroarch")),
    );
    let handle = orchestrator(fast_config(), &system, &dispatcher, false);

    handle.launch(LaunchTarget::native("/usr/bin/retroarch")).unwrap();
    handle.wait_for_state(LifecycleState::AppRunning, WAIT).await.unwrap();
    handle.terminate().unwrap();
    assert!(eventually(&handle, |s| s.teardowns_completed == 1).await);

    assert_eq!(
        &system.sent()[..3],
        &[Sent::Kill(4244), Sent::Kill(4243), Sent::Term(4242)]
    );
    assert!(!system.is_listed(4242));
    assert!(!system.is_listed(4243));
    assert!(!system.is_listed(4244));
    assert!(system.is_listed(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_web_terminate_spares_other_browser_windows() {
    let system = FakeSystem::new(vec![
        ProcessEntry::new(1, 0, "init", "/sbin/init"),
        browser_window(200, "https://b.example"),
    ]);
    let dispatcher = FakeDispatcher::new(
        Arc::clone(&system),
        DispatchBehaviour::Confirm(browser_window(100, "https://a.example")),
    );
    let handle = orchestrator(browser_config(), &system, &dispatcher, true);

    handle.launch(LaunchTarget::web("https://a.example")).unwrap();
    handle.wait_for_state(LifecycleState::AppRunning, WAIT).await.unwrap();
    handle.terminate().unwrap();
    handle.wait_for_state(LifecycleState::Idle, WAIT).await.unwrap();
    assert!(eventually(&handle, |s| s.teardowns_completed == 1).await);

    assert!(!system.is_listed(100));
    assert!(system.is_listed(200));
    assert!(!system.sent().contains(&Sent::Kill(200)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_app_exit_during_hide_still_restores_launcher() {
    let system = FakeSystem::new(Vec::new());
    let dispatcher = FakeDispatcher::new(
        Arc::clone(&system),
        DispatchBehaviour::Confirm(browser_window(100, "https://a.example")),
    );
    let config = browser_config().with_hide_delays(
        std::time::Duration::from_millis(250),
        std::time::Duration::from_millis(250),
    );
    let handle = orchestrator(config, &system, &dispatcher, true);
    let mut events = handle.subscribe();

    handle.launch(LaunchTarget::web("https://a.example")).unwrap();
    // Wait until the oracle has seen the window, then close it mid-hide
    assert!(eventually(&handle, |s| s.transitioning && s.active.is_some()).await);
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    system.exit(100);

    let seen = events_until(&mut events, LifecycleState::Idle).await;
    assert!(seen.contains(&UiEvent::StateChanged(LifecycleState::AppRunning)));
    assert_eq!(seen.last(), Some(&UiEvent::StateChanged(LifecycleState::Idle)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_dispatcher_confirmation_keeps_session() {
    let system = FakeSystem::new(vec![ProcessEntry::new(1, 0, "init", "/sbin/init")]);
    let dispatcher = FakeDispatcher::new(
        Arc::clone(&system),
        DispatchBehaviour::Confirm(browser_window(100, "https://a.example")),
    );
    // The window is up at once but the dispatcher answers after the oracle
    dispatcher.with_delay(std::time::Duration::from_millis(150));
    let handle = orchestrator(browser_config(), &system, &dispatcher, true);
    let mut events = handle.subscribe();

    handle.launch(LaunchTarget::web("https://a.example")).unwrap();
    events_until(&mut events, LifecycleState::AppRunning).await;
    assert!(eventually(&handle, |s| s.active.as_ref().map(|a| a.pid) == Some(100)).await);
    settle(&handle).await;

    assert_eq!(handle.state(), LifecycleState::AppRunning);
    assert!(!drain(&mut events).contains(&UiEvent::StateChanged(LifecycleState::Terminating)));
    assert!(system.sent().is_empty());
    assert!(system.is_listed(100));

    handle.terminate().unwrap();
    handle.wait_for_state(LifecycleState::Idle, WAIT).await.unwrap();
    assert!(eventually(&handle, |s| s.teardowns_completed == 1).await);
    assert!(!system.is_listed(100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_terminate_kills_native_app_found_by_oracle() {
    let system = FakeSystem::new(vec![ProcessEntry::new(1, 0, "init", "/sbin/init")]);
    let dispatcher = FakeDispatcher::new(
        Arc::clone(&system),
        DispatchBehaviour::StartSilently(ProcessEntry::new(
            4242,
            1,
            "retroarch",
            "/usr/bin/retroarch",
        )),
    );
    let config = fast_config().with_monitored("retroarch");
    let handle = orchestrator(config, &system, &dispatcher, true);

    handle.launch(LaunchTarget::native("/usr/bin/retroarch")).unwrap();
    handle.wait_for_state(LifecycleState::AppRunning, WAIT).await.unwrap();
    assert_eq!(handle.snapshot().active.map(|a| a.pid), Some(4242));

    handle.terminate().unwrap();
    handle.wait_for_state(LifecycleState::Idle, WAIT).await.unwrap();
    assert!(eventually(&handle, |s| s.teardowns_completed == 1).await);

    assert!(system.sent().contains(&Sent::Term(4242)));
    assert!(!system.is_listed(4242));
}
