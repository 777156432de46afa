//! Session countdown
//!
//! The remaining time is always recomputed from the wall clock and the
//! session deadline. The ticker only sets the redraw cadence.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Redraw cadence of a mounted session
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Background task delivering one tick per period
///
/// Dropping the ticker stops the task.
pub struct CountdownTicker {
    token: CancellationToken,
    rx: mpsc::Receiver<()>,
}

impl CountdownTicker {
    /// Spawn on the current tokio runtime; `None` outside one
    pub fn spawn(period: Duration) -> Option<Self> {
        let handle = Handle::try_current().ok()?;
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        let task_token = token.clone();

        handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {
                        match tx.try_send(()) {
                            // A pending tick already covers this one
                            Ok(()) | Err(TrySendError::Full(())) => {}
                            Err(TrySendError::Closed(())) => break,
                        }
                    }
                }
            }
            debug!("Countdown ticker stopped");
        });

        Some(Self { token, rx })
    }

    /// Wait for the next tick; `None` once cancelled
    pub async fn tick(&mut self) -> Option<()> {
        if self.token.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = self.token.cancelled() => None,
            tick = self.rx.recv() => tick,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for CountdownTicker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
