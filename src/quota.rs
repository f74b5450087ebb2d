//! Per-channel daily send accounting.
//!
//! Each worker owns one tracker. The count covers successful sends only;
//! it resets when the UTC calendar day rolls over. Reaching the cap pauses
//! claiming and sending for that channel — health checks keep running so
//! the channel comes back by itself the next day.

use chrono::{DateTime, Utc};
use tracing::info;

#[derive(Debug)]
pub struct QuotaTracker {
    /// Maximum successful sends per calendar day.
    cap: u32,
    /// Sends recorded since the last reset.
    count: u32,
    /// When the current accounting window started.
    reset_at: DateTime<Utc>,
}

impl QuotaTracker {
    pub fn new(cap: u32, now: DateTime<Utc>) -> Self {
        Self {
            cap,
            count: 0,
            reset_at: now,
        }
    }

    /// Roll the window over if the calendar day has changed.
    fn roll_over(&mut self, now: DateTime<Utc>) {
        if now.date_naive() != self.reset_at.date_naive() {
            if self.count > 0 {
                info!(sent = self.count, cap = self.cap, "daily quota reset");
            }
            self.count = 0;
            self.reset_at = now;
        }
    }

    /// Whether the channel may send right now. Runs the reset check first.
    pub fn check(&mut self, now: DateTime<Utc>) -> bool {
        self.roll_over(now);
        self.count < self.cap
    }

    /// Record one successful send.
    pub fn record_send(&mut self) {
        self.count += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }
}
