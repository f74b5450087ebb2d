//! In-memory queue store.
//!
//! One mutex guards the whole map, so select-and-transition inside
//! `claim_next` is a single critical section — the same atomicity the
//! Postgres backend gets from its conditional UPDATE. Used by tests and
//! by embedders that do not need durability across restarts.

use super::{QueueStore, validate_transition};
use crate::error::{Error, Result};
use crate::model::{ChannelId, Message, MessageId, NewMessage, Status};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    /// Monotonic insertion counter. Breaks `scheduled_at` ties so claim
    /// order stays FIFO even under a frozen test clock.
    next_seq: u64,
    rows: HashMap<MessageId, (u64, Message)>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn enqueue(&self, new: NewMessage, now: DateTime<Utc>) -> Result<Message> {
        let message = Message {
            id: MessageId::new(),
            recipient: new.recipient,
            content: new.content,
            channel: new.channel_hint,
            status: Status::Pending,
            attempts: 0,
            max_attempts: new.max_attempts,
            scheduled_at: new.scheduled_at.unwrap_or(now),
            last_attempt_at: None,
            error: None,
            created_at: now,
            updated_at: now,
            failed_at: None,
        };

        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.rows.insert(message.id, (seq, message.clone()));
        Ok(message)
    }

    async fn claim_next(
        &self,
        channel: &ChannelId,
        now: DateTime<Utc>,
    ) -> Result<Option<Message>> {
        let mut inner = self.inner.lock().unwrap();

        let candidate = inner
            .rows
            .values()
            .filter(|(_, m)| {
                m.status == Status::Pending
                    && m.scheduled_at <= now
                    && m.channel.as_ref().is_none_or(|c| c == channel)
            })
            .min_by_key(|(seq, m)| (m.scheduled_at, *seq))
            .map(|(_, m)| m.id);

        let Some(id) = candidate else {
            return Ok(None);
        };

        let (_, message) = inner.rows.get_mut(&id).expect("candidate exists");
        message.status = Status::Processing;
        message.channel = Some(channel.clone());
        message.updated_at = now;
        Ok(Some(message.clone()))
    }

    async fn release(&self, id: MessageId, now: DateTime<Utc>) -> Result<Message> {
        let mut inner = self.inner.lock().unwrap();
        let (_, message) = inner
            .rows
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("message {id}")))?;

        validate_transition(message.status, Status::Pending)?;
        message.status = Status::Pending;
        message.channel = None;
        message.scheduled_at = now;
        message.updated_at = now;
        Ok(message.clone())
    }

    async fn record_success(&self, id: MessageId, now: DateTime<Utc>) -> Result<Message> {
        let mut inner = self.inner.lock().unwrap();
        let (_, message) = inner
            .rows
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("message {id}")))?;

        validate_transition(message.status, Status::Sent)?;
        message.status = Status::Sent;
        message.last_attempt_at = Some(now);
        message.updated_at = now;
        Ok(message.clone())
    }

    async fn record_failure(
        &self,
        id: MessageId,
        error: &str,
        next_scheduled_at: DateTime<Utc>,
        terminal: bool,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        let mut inner = self.inner.lock().unwrap();
        let (_, message) = inner
            .rows
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("message {id}")))?;

        let to = if terminal {
            Status::Failed
        } else {
            Status::Pending
        };
        validate_transition(message.status, to)?;

        message.attempts += 1;
        message.error = Some(error.to_string());
        message.last_attempt_at = Some(now);
        message.updated_at = now;
        message.status = to;
        if terminal {
            message.failed_at = Some(now);
        } else {
            message.scheduled_at = next_scheduled_at;
        }
        Ok(message.clone())
    }

    async fn get(&self, id: MessageId) -> Result<Message> {
        let inner = self.inner.lock().unwrap();
        inner
            .rows
            .get(&id)
            .map(|(_, m)| m.clone())
            .ok_or_else(|| Error::NotFound(format!("message {id}")))
    }

    async fn list(&self, status: Option<Status>, limit: i64) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        let mut items: Vec<(u64, Message)> = inner
            .rows
            .values()
            .filter(|(_, m)| status.is_none_or(|s| m.status == s))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.0.cmp(&a.0));
        items.truncate(limit.max(0) as usize);
        Ok(items.into_iter().map(|(_, m)| m).collect())
    }

    async fn reclaim_stale(&self, older_than: Duration, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - older_than;
        let mut inner = self.inner.lock().unwrap();
        let mut reclaimed = 0;
        for (_, message) in inner.rows.values_mut() {
            if message.status == Status::Processing && message.updated_at <= cutoff {
                message.status = Status::Pending;
                message.channel = None;
                message.scheduled_at = now;
                message.updated_at = now;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}
