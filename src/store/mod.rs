//! Queue storage: durable, concurrency-safe keeping of messages.
//!
//! The store is the only resource shared across channel workers. All
//! cross-worker coordination happens through [`QueueStore::claim_next`],
//! which must behave as a single compare-and-swap: two concurrent callers
//! can never claim the same record. Everything else is a single-record
//! conditional update.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::{Error, Result};
use crate::model::{ChannelId, Message, MessageId, NewMessage, Status};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Validate a status transition, returning an error if disallowed.
pub(crate) fn validate_transition(from: Status, to: Status) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Durable message storage with atomic claim semantics.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Create a new pending message. Unassigned unless the builder pinned
    /// a channel; claimable from `scheduled_at` (defaults to `now`).
    async fn enqueue(&self, new: NewMessage, now: DateTime<Utc>) -> Result<Message>;

    /// Atomically claim the oldest eligible message for `channel`.
    ///
    /// Eligible: `pending`, `scheduled_at <= now`, and affinity either
    /// unassigned or already `channel`. The selected message transitions
    /// to `processing` with affinity set to `channel` in the same atomic
    /// step. Returns `None` when nothing is eligible — that is idleness,
    /// not an error.
    async fn claim_next(&self, channel: &ChannelId, now: DateTime<Utc>)
    -> Result<Option<Message>>;

    /// Hand a claimed message back to the pool: `pending`, unassigned,
    /// claimable immediately. Attempts are untouched — this is a lease
    /// release, not a delivery failure.
    async fn release(&self, id: MessageId, now: DateTime<Utc>) -> Result<Message>;

    /// Mark a claimed message as delivered.
    async fn record_success(&self, id: MessageId, now: DateTime<Utc>) -> Result<Message>;

    /// Record a failed delivery attempt.
    ///
    /// Increments `attempts` and stores the error. Non-terminal failures
    /// return to `pending` with `scheduled_at = next_scheduled_at`;
    /// terminal failures become `failed` with `failed_at = now`. Channel
    /// affinity is kept either way, for audit.
    async fn record_failure(
        &self,
        id: MessageId,
        error: &str,
        next_scheduled_at: DateTime<Utc>,
        terminal: bool,
        now: DateTime<Utc>,
    ) -> Result<Message>;

    /// Get a message by ID.
    async fn get(&self, id: MessageId) -> Result<Message>;

    /// List messages, optionally filtered by status, newest first.
    async fn list(&self, status: Option<Status>, limit: i64) -> Result<Vec<Message>>;

    /// Return abandoned `processing` messages (untouched for longer than
    /// `older_than`) to the unassigned pending pool. The seam for the
    /// operational sweep; workers never call this.
    async fn reclaim_stale(&self, older_than: Duration, now: DateTime<Utc>) -> Result<u64>;
}
