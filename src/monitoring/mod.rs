/*!
 * Monitoring
 * Tracing setup and launch-session correlation
 */

mod tracer;

pub use tracer::{
    generate_launch_id, init_tracing, launch_span, span_operation, try_init_tracing, OperationSpan,
};
