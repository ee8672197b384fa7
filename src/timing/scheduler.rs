//! Deadline polling.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::TargetWindow;
use crate::clock::Clock;

/// Default delay between deadline checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Blocks the caller until a [`TargetWindow`] is due.
///
/// A plain check-then-sleep loop: tens of milliseconds of precision is all
/// the sale window needs.
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl Scheduler {
    /// Scheduler polling every [`DEFAULT_POLL_INTERVAL`].
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Wait until `now - offset_ms >= target_ms - lead_ms`.
    pub async fn wait_until(&self, target_ms: i64, offset_ms: i64, lead_ms: i64) {
        self.wait_for(&TargetWindow::new(target_ms, offset_ms, lead_ms))
            .await;
    }

    /// Wait until `window` is due.
    pub async fn wait_for(&self, window: &TargetWindow) {
        info!(
            target_ms = window.target_ms,
            lead_ms = window.lead_ms,
            offset_ms = window.offset_ms,
            "waiting for sale window"
        );
        let mut polls: u64 = 0;
        while !window.is_due(self.clock.now_ms()) {
            polls += 1;
            self.clock.sleep(self.poll_interval).await;
        }
        debug!(polls, "deadline check passed");
        info!("sale window reached");
    }
}
