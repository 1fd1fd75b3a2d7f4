/*!
 * Terminate Cool-Down
 *
 * Requests arriving within the window after an accepted one are dropped,
 * not queued.
 */

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TerminateCooldown {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl TerminateCooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Accept and record the request unless it falls inside the window
    pub fn try_accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}
