//! Clock synchronization and deadline scheduling.
//!
//! A worker measures its offset from the service clock once
//! ([`ClockSynchronizer`]), draws a random lead from [`LEAD_CHOICES_MS`],
//! freezes both into a [`TargetWindow`], and blocks in [`Scheduler`] until
//! the corrected instant passes.

pub mod scheduler;
pub mod synchronizer;

use rand::seq::SliceRandom;

pub use scheduler::{Scheduler, DEFAULT_POLL_INTERVAL};
pub use synchronizer::ClockSynchronizer;

/// Leads a worker may fire ahead of the target, in milliseconds.
///
/// Spreads simultaneous workers across a ~100 ms window.
pub const LEAD_CHOICES_MS: [i64; 5] = [0, 0, 50, 50, 100];

/// Draw a lead from [`LEAD_CHOICES_MS`].
#[must_use]
pub fn draw_lead_ms() -> i64 {
    LEAD_CHOICES_MS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default()
}

/// Per-worker firing instant; immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetWindow {
    /// Sale opening instant on the service clock (Unix ms).
    pub target_ms: i64,
    /// Local clock minus service clock (ms); positive when local runs ahead.
    pub offset_ms: i64,
    /// How early this worker fires (ms).
    pub lead_ms: i64,
}

impl TargetWindow {
    /// Freeze a window.
    #[must_use]
    pub fn new(target_ms: i64, offset_ms: i64, lead_ms: i64) -> Self {
        Self {
            target_ms,
            offset_ms,
            lead_ms,
        }
    }

    /// Target with the lead applied, on the service clock.
    #[must_use]
    pub fn corrected_target_ms(&self) -> i64 {
        self.target_ms - self.lead_ms
    }

    /// Whether `local_now_ms` has reached the corrected target.
    #[must_use]
    pub fn is_due(&self, local_now_ms: i64) -> bool {
        local_now_ms - self.offset_ms >= self.corrected_target_ms()
    }
}
