/*!
 * Generation Tokens
 *
 * Every pending wait (launch confirmation, hide delay, reappear delay) holds a
 * token for the generation that armed it. Advancing the counter cancels all
 * outstanding tokens at once; a cancelled wait is abandoned, not an error.
 */

use super::types::Generation;
use std::time::Duration;
use tokio::sync::watch;

/// Source of generation tokens
#[derive(Debug)]
pub struct GenerationCounter {
    tx: watch::Sender<Generation>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub fn current(&self) -> Generation {
        *self.tx.borrow()
    }

    /// Cancel every outstanding token and return the new generation
    pub fn advance(&self) -> Generation {
        self.tx.send_modify(|g| *g += 1);
        self.current()
    }

    /// Token bound to the current generation
    pub fn token(&self) -> CancelToken {
        CancelToken {
            generation: self.current(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }
}

impl Default for GenerationCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellable handle on one generation
#[derive(Debug, Clone)]
pub struct CancelToken {
    generation: Generation,
    rx: watch::Receiver<Generation>,
}

impl CancelToken {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() != self.generation
    }

    /// Resolves once the generation moves on or the counter is dropped
    pub async fn cancelled(&mut self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep unless cancelled first; `None` means abandoned
    pub async fn sleep(mut self, duration: Duration) -> Option<Generation> {
        let abandoned = tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.cancelled() => true,
        };
        if abandoned || self.is_cancelled() {
            None
        } else {
            Some(self.generation)
        }
    }
}
