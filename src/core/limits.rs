/*!
 * Limits and Default Timings
 *
 * Centralized location for every delay, budget and threshold used by the
 * orchestrator. Organized by subsystem. Values here are defaults only; the
 * runtime values live in `OrchestratorConfig`.
 */

use std::time::Duration;

// =============================================================================
// LIFECYCLE TIMINGS
// =============================================================================

/// Pause between the launch sound and the dispatcher hand-off
pub const DEFAULT_LAUNCH_DELAY: Duration = Duration::from_millis(300);

/// Bound on waiting for a launch confirmation
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Hide delay for browser-hosted targets
/// Longer than native so app-mode/fullscreen can settle
pub const DEFAULT_WEB_HIDE_DELAY: Duration = Duration::from_millis(2500);

/// Hide delay for native executables
pub const DEFAULT_NATIVE_HIDE_DELAY: Duration = Duration::from_millis(1000);

/// Pause before the launcher is shown again
pub const DEFAULT_REAPPEAR_DELAY: Duration = Duration::from_millis(500);

/// Window after an accepted terminate request in which further requests are dropped
pub const DEFAULT_TERMINATE_COOLDOWN: Duration = Duration::from_secs(1);

// =============================================================================
// LIVENESS ORACLE
// =============================================================================

/// Interval between liveness checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Minimum spacing between two published liveness flips
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

/// Upper bound for a single liveness check
pub const DEFAULT_CHECK_BUDGET: Duration = Duration::from_secs(2);

/// Bounded wait when acquiring the single-flight gate
pub const DEFAULT_GATE_WAIT: Duration = Duration::from_millis(100);

// =============================================================================
// TERMINATION
// =============================================================================

/// Time a process gets to exit after SIGTERM
pub const DEFAULT_KILL_BUDGET: Duration = Duration::from_millis(1500);

/// Polling step while waiting for a PID to disappear
pub const KILL_POLL_STEP: Duration = Duration::from_millis(50);

/// Time allowed for a SIGKILLed process to disappear before the by-name tier
pub const FORCE_KILL_SETTLE: Duration = Duration::from_millis(500);

/// Bounded wait when acquiring the termination gate
pub const TERMINATION_GATE_WAIT: Duration = Duration::from_secs(5);

/// Descendants collected from a single tree walk
/// [SECURITY] Stops a fork bomb from turning teardown into an unbounded walk
pub const MAX_TREE_PROCESSES: usize = 1024;

// =============================================================================
// PROCESS TABLE
// =============================================================================

/// Entries scanned from the procfs root before giving up
pub const MAX_PROC_SCAN_ENTRIES: usize = 65_536;

/// Maximum bytes read from a single procfs file
pub const MAX_PROC_READ_SIZE: u64 = 64 * 1024;

/// Kernel comm names are truncated to 15 characters
pub const MAX_COMM_LENGTH: usize = 15;

// =============================================================================
// BROWSER INTEGRATION
// =============================================================================

/// Command-line flag that starts a Chromium-family browser as a dedicated app window
pub const DEFAULT_APP_MODE_MARKER: &str = "--app=";

/// UI event channel capacity
pub const UI_EVENT_CAPACITY: usize = 64;
