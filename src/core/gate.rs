/*!
 * Bounded-Wait Gates
 *
 * Single-flight admission for liveness checks and teardowns. A caller that
 * cannot enter within the configured wait is turned away instead of queued,
 * so one stuck external call cannot starve every later attempt.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Single-permit gate with bounded-wait acquisition
#[derive(Debug, Clone)]
pub struct Gate {
    name: &'static str,
    permits: Arc<Semaphore>,
    wait: Duration,
    stats: Arc<GateStats>,
}

#[derive(Debug, Default)]
struct GateStats {
    entered: AtomicU64,
    turned_away: AtomicU64,
}

/// Proof of admission; the gate reopens when this drops
#[derive(Debug)]
pub struct GatePass {
    _permit: OwnedSemaphorePermit,
}

impl Gate {
    pub fn new(name: &'static str, wait: Duration) -> Self {
        Self {
            name,
            permits: Arc::new(Semaphore::new(1)),
            wait,
            stats: Arc::new(GateStats::default()),
        }
    }

    /// Enter the gate, waiting at most the configured bound
    pub async fn enter(&self) -> Option<GatePass> {
        let acquire = Arc::clone(&self.permits).acquire_owned();
        match tokio::time::timeout(self.wait, acquire).await {
            Ok(Ok(permit)) => {
                self.stats.entered.fetch_add(1, Ordering::Relaxed);
                Some(GatePass { _permit: permit })
            }
            Ok(Err(_)) | Err(_) => {
                self.stats.turned_away.fetch_add(1, Ordering::Relaxed);
                trace!(
                    gate = self.name,
                    wait_ms = self.wait.as_millis() as u64,
                    "Gate busy, turned away"
                );
                None
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn entered(&self) -> u64 {
        self.stats.entered.load(Ordering::Relaxed)
    }

    pub fn turned_away(&self) -> u64 {
        self.stats.turned_away.load(Ordering::Relaxed)
    }
}
