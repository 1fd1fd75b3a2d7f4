/*!
 * Liveness Module
 * Polling oracle that tells the state machine whether the target still runs
 */

pub mod debounce;
pub mod oracle;

pub use debounce::Debouncer;
pub use oracle::{
    check_liveness, evaluate, find_live, Liveness, LivenessOracle, OracleTarget, OracleTask,
    OracleTiming,
};
