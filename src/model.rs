//! Core data model.
//!
//! A message is a unit of outbound work: an opaque payload bound for a
//! recipient, owned by at most one channel at a time, moving through a
//! small delivery lifecycle until it lands in a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A queued outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,

    /// Who the message is for. Opaque to the queue — the transport
    /// interprets it (a session id, an email address, ...).
    pub recipient: String,

    /// The payload. Immutable once enqueued.
    pub content: String,

    /// Channel affinity: which channel currently owns or last owned this
    /// message. `None` means unassigned — any channel may claim it.
    pub channel: Option<ChannelId>,

    /// Current lifecycle status.
    pub status: Status,

    /// Number of failed delivery attempts so far.
    pub attempts: u32,

    /// Maximum delivery attempts before the message fails permanently.
    /// None = use the configured default.
    pub max_attempts: Option<u32>,

    /// Earliest instant at which the message becomes claimable.
    pub scheduled_at: DateTime<Utc>,

    /// When the most recent delivery attempt was made.
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Error from the most recent failed attempt.
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set when the message fails permanently.
    pub failed_at: Option<DateTime<Utc>>,
}

/// Newtype for message IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of a logical send path (a chat session, an email transport).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Delivery lifecycle status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Waiting for a channel worker to claim it.
    Pending,
    /// Claimed — exactly one worker owns it right now.
    Processing,
    /// Delivered. Terminal.
    Sent,
    /// Exhausted its retry budget. Terminal.
    Failed,
}

impl Status {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Sent)
                | (Processing, Pending) // retry, or lease release
                | (Processing, Failed) // exhausted attempts
        )
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Sent | Status::Failed)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Sent => "sent",
            Status::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "processing" => Ok(Status::Processing),
            "sent" => Ok(Status::Sent),
            "failed" => Ok(Status::Failed),
            other => Err(crate::error::Error::Other(format!(
                "unknown message status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

/// Connectivity state of a channel, as reported by the transport and
/// tracked by the health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    /// No connection to the provider.
    Disconnected,
    /// Fully operational.
    Connected,
    /// Connected but impaired; still usable for sending.
    Degraded,
    /// Automatic reconnection exhausted. Requires manual intervention.
    MaxRetriesReached,
}

impl ConnectivityState {
    /// Whether the channel may attempt sends in this state.
    pub fn is_sendable(self) -> bool {
        matches!(
            self,
            ConnectivityState::Connected | ConnectivityState::Degraded
        )
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectivityState::Disconnected => "disconnected",
            ConnectivityState::Connected => "connected",
            ConnectivityState::Degraded => "degraded",
            ConnectivityState::MaxRetriesReached => "max_retries_reached",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ConnectivityState {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnected" => Ok(ConnectivityState::Disconnected),
            "connected" => Ok(ConnectivityState::Connected),
            "degraded" => Ok(ConnectivityState::Degraded),
            "max_retries_reached" => Ok(ConnectivityState::MaxRetriesReached),
            other => Err(crate::error::Error::Other(format!(
                "unknown connectivity state: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for enqueuing new messages. The store's public API for intake.
pub struct NewMessage {
    pub(crate) recipient: String,
    pub(crate) content: String,
    pub(crate) channel_hint: Option<ChannelId>,
    pub(crate) max_attempts: Option<u32>,
    pub(crate) scheduled_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    pub fn new(recipient: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            content: content.into(),
            channel_hint: None,
            max_attempts: None,
            scheduled_at: None,
        }
    }

    /// Pin the message to a specific channel at enqueue time.
    pub fn channel(mut self, channel: impl Into<ChannelId>) -> Self {
        self.channel_hint = Some(channel.into());
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    /// Defer delivery until the given instant.
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }
}
