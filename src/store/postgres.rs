//! Postgres-backed queue store via SQLx.
//!
//! Claim is a single `UPDATE ... WHERE id = (SELECT ... FOR UPDATE SKIP
//! LOCKED) RETURNING` statement, so concurrent workers contend inside the
//! database and exactly one wins. All other transitions are conditional
//! single-row updates guarded by the expected current status.

use super::{QueueStore, validate_transition};
use crate::error::{Error, Result};
use crate::model::{ChannelId, Message, MessageId, NewMessage, Status};
use crate::telemetry::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use opentelemetry::KeyValue;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check — run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl QueueStore for PgStore {
    async fn enqueue(&self, new: NewMessage, now: DateTime<Utc>) -> Result<Message> {
        let id = Uuid::new_v4();
        let scheduled_at = new.scheduled_at.unwrap_or(now);

        sqlx::query(
            "INSERT INTO messages (id, recipient, content, channel, status, attempts, max_attempts, scheduled_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'pending', 0, $5, $6, $7, $7)",
        )
        .bind(id)
        .bind(&new.recipient)
        .bind(&new.content)
        .bind(new.channel_hint.as_ref().map(|c| c.as_str()))
        .bind(new.max_attempts.map(|n| n as i32))
        .bind(scheduled_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        metrics::messages_enqueued().add(
            1,
            &[KeyValue::new(
                "channel_hint",
                new.channel_hint
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unassigned".to_string()),
            )],
        );

        self.get(MessageId(id)).await
    }

    async fn claim_next(
        &self,
        channel: &ChannelId,
        now: DateTime<Utc>,
    ) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(
            "UPDATE messages SET status = 'processing', channel = $1, updated_at = $2
             WHERE id = (
                 SELECT id FROM messages
                 WHERE status = 'pending'
                   AND scheduled_at <= $2
                   AND (channel IS NULL OR channel = $1)
                 ORDER BY scheduled_at ASC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, recipient, content, channel, status, attempts, max_attempts, scheduled_at, last_attempt_at, error, created_at, updated_at, failed_at",
        )
        .bind(channel.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        metrics::claim_operations().add(
            1,
            &[
                KeyValue::new("channel", channel.to_string()),
                KeyValue::new("outcome", if row.is_some() { "hit" } else { "miss" }),
            ],
        );

        row.map(MessageRow::try_into_message).transpose()
    }

    async fn release(&self, id: MessageId, now: DateTime<Utc>) -> Result<Message> {
        validate_transition(Status::Processing, Status::Pending)?;

        let rows_affected = sqlx::query(
            "UPDATE messages SET status = 'pending', channel = NULL, scheduled_at = $1, updated_at = $1
             WHERE id = $2 AND status = 'processing'",
        )
        .bind(now)
        .bind(id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(Error::InvalidTransition {
                from: "processing".to_string(),
                to: "pending".to_string(),
            });
        }

        metrics::status_transitions().add(
            1,
            &[
                KeyValue::new("from", "processing"),
                KeyValue::new("to", "pending"),
            ],
        );

        self.get(id).await
    }

    async fn record_success(&self, id: MessageId, now: DateTime<Utc>) -> Result<Message> {
        validate_transition(Status::Processing, Status::Sent)?;

        let rows_affected = sqlx::query(
            "UPDATE messages SET status = 'sent', last_attempt_at = $1, updated_at = $1
             WHERE id = $2 AND status = 'processing'",
        )
        .bind(now)
        .bind(id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(Error::InvalidTransition {
                from: "processing".to_string(),
                to: "sent".to_string(),
            });
        }

        metrics::status_transitions().add(
            1,
            &[
                KeyValue::new("from", "processing"),
                KeyValue::new("to", "sent"),
            ],
        );

        self.get(id).await
    }

    async fn record_failure(
        &self,
        id: MessageId,
        error: &str,
        next_scheduled_at: DateTime<Utc>,
        terminal: bool,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        let to = if terminal {
            Status::Failed
        } else {
            Status::Pending
        };
        validate_transition(Status::Processing, to)?;

        let rows_affected = if terminal {
            sqlx::query(
                "UPDATE messages SET status = 'failed', attempts = attempts + 1, error = $1, last_attempt_at = $2, failed_at = $2, updated_at = $2
                 WHERE id = $3 AND status = 'processing'",
            )
            .bind(error)
            .bind(now)
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                "UPDATE messages SET status = 'pending', attempts = attempts + 1, error = $1, last_attempt_at = $2, scheduled_at = $3, updated_at = $2
                 WHERE id = $4 AND status = 'processing'",
            )
            .bind(error)
            .bind(now)
            .bind(next_scheduled_at)
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if rows_affected == 0 {
            return Err(Error::InvalidTransition {
                from: "processing".to_string(),
                to: to.to_string(),
            });
        }

        metrics::status_transitions().add(
            1,
            &[
                KeyValue::new("from", "processing"),
                KeyValue::new("to", to.to_string()),
            ],
        );

        self.get(id).await
    }

    async fn get(&self, id: MessageId) -> Result<Message> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT id, recipient, content, channel, status, attempts, max_attempts, scheduled_at, last_attempt_at, error, created_at, updated_at, failed_at
             FROM messages WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("message {id}")))?
            .try_into_message()
    }

    async fn list(&self, status: Option<Status>, limit: i64) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, recipient, content, channel, status, attempts, max_attempts, scheduled_at, last_attempt_at, error, created_at, updated_at, failed_at
             FROM messages
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(status.map(|s| s.to_string()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(MessageRow::try_into_message)
            .collect()
    }

    async fn reclaim_stale(&self, older_than: Duration, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - older_than;
        let rows_affected = sqlx::query(
            "UPDATE messages SET status = 'pending', channel = NULL, scheduled_at = $1, updated_at = $1
             WHERE status = 'processing' AND updated_at <= $2",
        )
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    recipient: String,
    content: String,
    channel: Option<String>,
    status: String,
    attempts: i32,
    max_attempts: Option<i32>,
    scheduled_at: DateTime<Utc>,
    last_attempt_at: Option<DateTime<Utc>>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    failed_at: Option<DateTime<Utc>>,
}

impl MessageRow {
    fn try_into_message(self) -> Result<Message> {
        Ok(Message {
            id: MessageId(self.id),
            recipient: self.recipient,
            content: self.content,
            channel: self.channel.map(ChannelId),
            status: self.status.parse()?,
            attempts: self.attempts as u32,
            max_attempts: self.max_attempts.map(|n| n as u32),
            scheduled_at: self.scheduled_at,
            last_attempt_at: self.last_attempt_at,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            failed_at: self.failed_at,
        })
    }
}
