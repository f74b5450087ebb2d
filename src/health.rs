//! Channel health monitoring.
//!
//! Runs as part of every worker iteration. The monitor itself enforces the
//! floor between reconnection attempts, so callers can check as often as
//! they like. Reconnection is capped; exhausting the cap flags the channel
//! for manual intervention and stops automatic recovery until either an
//! operator clears the flag or the transport reports healthy again.

use crate::model::{ChannelId, ConnectivityState};
use crate::telemetry::metrics;
use crate::transport::Transport;
use chrono::{DateTime, Duration, Utc};
use opentelemetry::KeyValue;
use tracing::{info, warn};

#[derive(Debug)]
pub struct HealthMonitor {
    channel: ChannelId,
    /// Minimum gap between reconnection attempts.
    reconnect_interval: Duration,
    /// Reconnection attempts before the channel is flagged.
    max_reconnect_attempts: u32,
    last_checked: Option<DateTime<Utc>>,
    last_reconnect_at: Option<DateTime<Utc>>,
    reconnect_attempts: u32,
    flagged: bool,
}

impl HealthMonitor {
    pub fn new(channel: ChannelId, reconnect_interval: Duration, max_reconnect_attempts: u32) -> Self {
        Self {
            channel,
            reconnect_interval,
            max_reconnect_attempts,
            last_checked: None,
            last_reconnect_at: None,
            reconnect_attempts: 0,
            flagged: false,
        }
    }

    /// Check the channel's connectivity, attempting a bounded reconnect if
    /// it is down. Returns the state the worker should act on.
    pub async fn check(&mut self, transport: &dyn Transport, now: DateTime<Utc>) -> ConnectivityState {
        self.last_checked = Some(now);

        let reported = transport.check_health(&self.channel).await;
        if reported.is_sendable() {
            if self.flagged || self.reconnect_attempts > 0 {
                info!(channel = %self.channel, state = %reported, "channel recovered");
            }
            self.reconnect_attempts = 0;
            self.flagged = false;
            return reported;
        }

        if self.flagged {
            return ConnectivityState::MaxRetriesReached;
        }

        if !self.reconnect_due(now) {
            return reported;
        }

        self.last_reconnect_at = Some(now);
        match transport.connect(&self.channel).await {
            Ok(()) => {
                info!(channel = %self.channel, "reconnected");
                metrics::reconnect_attempts().add(
                    1,
                    &[
                        KeyValue::new("channel", self.channel.to_string()),
                        KeyValue::new("result", "ok"),
                    ],
                );
                self.reconnect_attempts = 0;
                ConnectivityState::Connected
            }
            Err(e) => {
                self.reconnect_attempts += 1;
                metrics::reconnect_attempts().add(
                    1,
                    &[
                        KeyValue::new("channel", self.channel.to_string()),
                        KeyValue::new("result", "error"),
                    ],
                );
                if self.reconnect_attempts >= self.max_reconnect_attempts {
                    self.flagged = true;
                    warn!(
                        channel = %self.channel,
                        attempts = self.reconnect_attempts,
                        "reconnection attempts exhausted, flagging for manual intervention"
                    );
                    ConnectivityState::MaxRetriesReached
                } else {
                    warn!(
                        channel = %self.channel,
                        attempt = self.reconnect_attempts,
                        error = %e,
                        "reconnect failed"
                    );
                    reported
                }
            }
        }
    }

    fn reconnect_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_reconnect_at {
            None => true,
            Some(last) => now - last >= self.reconnect_interval,
        }
    }

    /// Clear the manual-intervention flag and the attempt counter.
    /// Operator tooling calls this after fixing the underlying channel.
    pub fn clear_flag(&mut self) {
        self.flagged = false;
        self.reconnect_attempts = 0;
    }

    /// Pre-flag the channel (used when bootstrap already exhausted its
    /// own retry budget).
    pub fn flag(&mut self) {
        self.flagged = true;
        self.reconnect_attempts = self.max_reconnect_attempts;
    }

    pub fn is_flagged(&self) -> bool {
        self.flagged
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }
}
