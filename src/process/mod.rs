/*!
 * Process Module
 * Process table access, launching and termination
 */

pub mod control;
pub mod display;
pub mod launcher;
pub mod matching;
pub mod procfs;
pub mod termination;
pub mod traits;

// Re-export for convenience
pub use control::NixControl;
pub use display::WmctrlWindows;
pub use launcher::{split_command, CommandLauncher};
pub use matching::{has_app_url, name_matches};
pub use procfs::{ProcFs, WindowSource};
pub use termination::{
    BrowserTeardown, KillOutcome, KillTier, TeardownReport, TerminationEngine, TreeReport,
};
pub use traits::{LaunchDispatcher, ProcessControl, ProcessProbe, Signalled, WindowOwners};
