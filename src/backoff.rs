//! Retry policy: a pure mapping from failure circumstances to what happens
//! next. No storage access, no clock — callers supply the attempt count and
//! apply the returned decision.

use chrono::Duration;

/// How a delivery attempt failed. Determines whether the failure counts
/// against the message's retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The channel was unreachable — the send never really happened.
    Connectivity,
    /// The transport attempted delivery and the provider reported an error.
    Delivery,
}

/// What to do with a message after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the lease back to the pool: pending, unassigned, claimable
    /// immediately. Does not consume a retry.
    Release,
    /// Schedule a retry after `delay`.
    Retry { delay: Duration },
    /// Retry budget exhausted — fail permanently.
    Fail,
}

/// Fixed-table backoff with a permanent-failure threshold.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Ascending retry delays, indexed by attempt number (1-based).
    /// Attempts beyond the table clamp to the last entry.
    table: Vec<Duration>,
    /// Attempts at or beyond this count fail permanently.
    max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            table: [5, 15, 30, 60, 120]
                .into_iter()
                .map(Duration::seconds)
                .collect(),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    pub fn new(table: Vec<Duration>, max_attempts: u32) -> Self {
        assert!(!table.is_empty(), "backoff table must not be empty");
        Self {
            table,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the retry that follows attempt `attempt` (1-based).
    /// Clamps to the last table entry for attempts beyond the table.
    pub fn delay(&self, attempt: u32) -> Duration {
        let idx = (attempt.max(1) as usize - 1).min(self.table.len() - 1);
        self.table[idx]
    }

    /// True once a message has used up its whole retry budget.
    pub fn is_terminal(&self, attempts: u32, max_attempts: Option<u32>) -> bool {
        attempts >= max_attempts.unwrap_or(self.max_attempts)
    }

    /// Decide the outcome of a failed attempt.
    ///
    /// `attempts_before` is the message's attempt count prior to this
    /// failure; `max_attempts` is the per-message override, if any.
    /// A connectivity failure is a lease release and never consumes a
    /// retry; a delivery failure consumes one and either reschedules or
    /// fails the message for good.
    pub fn decide(
        &self,
        kind: FailureKind,
        attempts_before: u32,
        max_attempts: Option<u32>,
    ) -> RetryDecision {
        match kind {
            FailureKind::Connectivity => RetryDecision::Release,
            FailureKind::Delivery => {
                let attempts = attempts_before + 1;
                if self.is_terminal(attempts, max_attempts) {
                    RetryDecision::Fail
                } else {
                    RetryDecision::Retry {
                        delay: self.delay(attempts),
                    }
                }
            }
        }
    }
}
