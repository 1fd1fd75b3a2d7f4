/*!
 * Liveness Debouncer
 * Publishes a value only when it flips, and never twice within the window
 */

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    published: Option<bool>,
    last_emit: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            published: None,
            last_emit: None,
        }
    }

    /// Feed one sample; returns the value to publish, if any
    ///
    /// A flip suppressed by the window is not lost: the published value is
    /// unchanged, so the next sample after the window publishes it.
    pub fn observe(&mut self, value: bool, now: Instant) -> Option<bool> {
        if self.published == Some(value) {
            return None;
        }
        if let Some(last) = self.last_emit {
            if now.saturating_duration_since(last) < self.window {
                return None;
            }
        }
        self.published = Some(value);
        self.last_emit = Some(now);
        Some(value)
    }

    /// Forget the published value, used when a new target is armed
    pub fn reset(&mut self) {
        self.published = None;
        self.last_emit = None;
    }

    pub fn published(&self) -> Option<bool> {
        self.published
    }
}
