//! Cancellable single-slot alarm.
//!
//! Each `arm` spawns one tokio timer task tagged with a generation number.
//! `stop` and re-arming bump the generation, so a fire that is already in
//! flight when the alarm is cancelled is discarded at the receiving end.
//! The owner is the only reader of the generation, which makes
//! cancellation race-free against a concurrent fire.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

struct Pending {
    deadline: DateTime<Utc>,
    cancel: CancellationToken,
}

pub struct Alarm {
    tx: mpsc::UnboundedSender<u64>,
    rx: mpsc::UnboundedReceiver<u64>,
    generation: u64,
    pending: Option<Pending>,
}

impl Alarm {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            generation: 0,
            pending: None,
        }
    }

    /// Arm the alarm for `at`, replacing any earlier arm. A deadline in the
    /// past fires immediately. Must be called from within a tokio runtime.
    pub fn arm(&mut self, at: DateTime<Utc>) {
        self.stop();

        let generation = self.generation;
        let delay = (at - Utc::now()).to_std().unwrap_or_default();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    // Unbounded: never blocks, and fails quietly once the alarm is dropped.
                    let _ = tx.send(generation);
                }
            }
        });

        trace!(generation, %at, "alarm armed");
        self.pending = Some(Pending {
            deadline: at,
            cancel,
        });
    }

    /// Cancel the pending arm, if any. Idempotent.
    pub fn stop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel.cancel();
        }
        self.generation += 1;
    }

    /// Resolve once the current arm fires. Pends forever while disarmed.
    ///
    /// Cancel-safe: dropping the future loses no fire.
    pub async fn fired(&mut self) -> DateTime<Utc> {
        loop {
            if self.pending.is_none() {
                std::future::pending::<()>().await;
            }
            let Some(generation) = self.rx.recv().await else {
                std::future::pending::<()>().await;
                continue;
            };
            if generation != self.generation {
                trace!(generation, current = self.generation, "discarding stale alarm fire");
                continue;
            }
            if let Some(pending) = self.pending.take() {
                self.generation += 1;
                return pending.deadline;
            }
        }
    }
}

impl Default for Alarm {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel.cancel();
        }
    }
}
