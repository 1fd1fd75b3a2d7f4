/*!
 * Structured Tracing
 * Subscriber setup and correlation spans for launch sessions
 *
 * Features:
 * - One correlation ID per launch, carried by every log line of the session
 * - JSON-formatted logs for structured parsing
 * - `log` records from the process layer forwarded into the same subscriber
 */

use crate::core::types::LaunchTarget;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Span};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Teardowns slower than this are logged as warnings
const SLOW_OPERATION: Duration = Duration::from_secs(3);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - KIOSK_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    if let Err(e) = try_init_tracing() {
        eprintln!("tracing already initialized: {e}");
    }
}

/// Like [`init_tracing`] but reports a second initialization instead of ignoring it
pub fn try_init_tracing() -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json_requested() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .compact(),
            )
            .try_init()?;
        info!("Structured tracing initialized");
    }
    Ok(())
}

fn json_requested() -> bool {
    std::env::var("KIOSK_TRACE_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Generate a unique ID for correlating a launch session
pub fn generate_launch_id() -> Uuid {
    Uuid::new_v4()
}

/// Span covering one launch session from request to restored launcher
pub fn launch_span(target: &LaunchTarget) -> (Uuid, Span) {
    let launch_id = generate_launch_id();
    let span = info_span!("launch", %launch_id, target = %target, web = target.is_web);
    (launch_id, span)
}

/// Times a background operation and logs its duration when dropped
pub struct OperationSpan {
    span: Span,
    start: Instant,
    name: &'static str,
}

impl OperationSpan {
    pub fn new(name: &'static str) -> Self {
        let span = info_span!(parent: Span::current(), "operation", operation = name);
        span.in_scope(|| debug!(operation = name, "operation started"));
        Self {
            span,
            start: Instant::now(),
            name,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for OperationSpan {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let _entered = self.span.enter();
        let duration_ms = elapsed.as_millis() as u64;
        if elapsed > SLOW_OPERATION {
            warn!(operation = self.name, duration_ms, slow = true, "slow operation");
        } else {
            debug!(operation = self.name, duration_ms, "operation completed");
        }
    }
}

/// Helper to create an operation span under the current span
#[inline]
pub fn span_operation(name: &'static str) -> OperationSpan {
    OperationSpan::new(name)
}
