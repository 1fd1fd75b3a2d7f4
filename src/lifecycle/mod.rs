/*!
 * Lifecycle Module
 * Launcher state machine, its UI events and the handle used to drive it
 */

pub mod builder;
pub mod cooldown;
pub mod events;
pub mod handle;
pub mod machine;
pub mod state;

// Re-export for convenience
pub use builder::OrchestratorBuilder;
pub use cooldown::TerminateCooldown;
pub use events::{SoundId, UiEvent};
pub use handle::OrchestratorHandle;
pub use machine::MachineSnapshot;
pub use state::LifecycleState;
