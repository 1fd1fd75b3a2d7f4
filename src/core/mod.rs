/*!
 * Core Module
 * Fundamental types, configuration, error handling and coordination primitives
 */

pub mod config;
pub mod errors;
pub mod gate;
pub mod generation;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use config::{process_name_of, MonitoredProcessSet, OrchestratorConfig};
pub use errors::*;
pub use gate::{Gate, GatePass};
pub use generation::{CancelToken, GenerationCounter};
pub use types::*;
