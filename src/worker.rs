//! Per-channel delivery loop.
//!
//! Each channel runs one worker. A cycle is: health check, quota check,
//! claim one message, attempt the send, record the outcome. The next
//! cycle is scheduled only after the previous one fully completes, with a
//! randomized pause in between so channels never send in lockstep. Slow
//! transports cannot stall other channels — workers share nothing but the
//! store.

use crate::backoff::{BackoffPolicy, RetryDecision};
use crate::clock::Clock;
use crate::config::{ChannelConfig, DeliveryConfig};
use crate::error::Result;
use crate::health::HealthMonitor;
use crate::model::ChannelId;
use crate::quota::QuotaTracker;
use crate::store::QueueStore;
use crate::telemetry::delivery::{record_status_transition, start_delivery_span};
use crate::telemetry::metrics;
use crate::transport::{Transport, TransportError};
use opentelemetry::KeyValue;
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{Instrument, debug, error, info, warn};

pub struct ChannelWorker {
    channel: ChannelId,
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    policy: BackoffPolicy,
    quota: QuotaTracker,
    health: HealthMonitor,
    jitter_min: std::time::Duration,
    jitter_max: std::time::Duration,
    transport_timeout: std::time::Duration,
    shutdown: Arc<Notify>,
}

impl ChannelWorker {
    pub fn new(
        channel: &ChannelConfig,
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: &DeliveryConfig,
        shutdown: Arc<Notify>,
    ) -> Self {
        let id = channel.id();
        let now = clock.now();
        Self {
            quota: QuotaTracker::new(channel.daily_quota, now),
            health: HealthMonitor::new(
                id.clone(),
                config.health_check_interval,
                config.max_reconnect_attempts,
            ),
            policy: BackoffPolicy::new(config.backoff_table.clone(), config.max_attempts),
            channel: id,
            store,
            transport,
            clock,
            jitter_min: config.jitter_min,
            jitter_max: config.jitter_max,
            transport_timeout: config.transport_timeout,
            shutdown,
        }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    /// Flag the channel for manual intervention (bootstrap exhausted).
    pub fn flag_channel(&mut self) {
        self.health.flag();
    }

    /// Clear the manual-intervention flag. Operator tooling.
    pub fn clear_channel_flag(&mut self) {
        self.health.clear_flag();
    }

    pub fn is_flagged(&self) -> bool {
        self.health.is_flagged()
    }

    /// Run the delivery loop until shutdown is signaled.
    pub async fn run(mut self) {
        info!(channel = %self.channel, "channel worker started");
        loop {
            // Store errors are logged and the loop proceeds to its next
            // scheduled cycle rather than crashing.
            if let Err(e) = self.run_once().await {
                error!(channel = %self.channel, error = %e, "delivery cycle error");
            }

            let pause = self.jitter();
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!(channel = %self.channel, "channel worker shutting down");
                    return;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// One full delivery cycle, without the inter-cycle pause.
    ///
    /// Skips are not errors: an unhealthy channel, an exhausted quota, or
    /// an empty queue all end the cycle quietly and leave the next one to
    /// run as scheduled.
    pub async fn run_once(&mut self) -> Result<()> {
        let now = self.clock.now();

        let state = self.health.check(self.transport.as_ref(), now).await;
        if !state.is_sendable() {
            debug!(channel = %self.channel, state = %state, "channel not sendable, skipping cycle");
            return Ok(());
        }

        if !self.quota.check(now) {
            metrics::quota_exhausted()
                .add(1, &[KeyValue::new("channel", self.channel.to_string())]);
            debug!(
                channel = %self.channel,
                sent = self.quota.count(),
                cap = self.quota.cap(),
                "daily quota reached, skipping cycle"
            );
            return Ok(());
        }

        let Some(message) = self.store.claim_next(&self.channel, now).await? else {
            return Ok(()); // queue empty
        };

        let span = start_delivery_span(&self.channel, &message.id);

        async {
            record_status_transition(&span, "pending", "processing");

            let started = Instant::now();
            let sent = match tokio::time::timeout(
                self.transport_timeout,
                self.transport
                    .send(&self.channel, &message.recipient, &message.content),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Delivery(format!(
                    "send timed out after {:?}",
                    self.transport_timeout
                ))),
            };
            let elapsed_ms = started.elapsed().as_millis() as f64;

            // Re-read the clock: the send itself takes time.
            let now = self.clock.now();

            match sent {
                Ok(()) => {
                    record_status_transition(&span, "processing", "sent");
                    self.store.record_success(message.id, now).await?;
                    self.quota.record_send();
                    metrics::delivery_outcomes().add(
                        1,
                        &[
                            KeyValue::new("channel", self.channel.to_string()),
                            KeyValue::new("outcome", "sent"),
                        ],
                    );
                    metrics::send_duration_ms().record(
                        elapsed_ms,
                        &[
                            KeyValue::new("channel", self.channel.to_string()),
                            KeyValue::new("outcome", "sent"),
                        ],
                    );
                    info!(id = %message.id, attempts = message.attempts, "message delivered");
                }
                Err(e) => {
                    metrics::send_duration_ms().record(
                        elapsed_ms,
                        &[
                            KeyValue::new("channel", self.channel.to_string()),
                            KeyValue::new("outcome", "error"),
                        ],
                    );
                    match self
                        .policy
                        .decide(e.kind(), message.attempts, message.max_attempts)
                    {
                        RetryDecision::Release => {
                            record_status_transition(&span, "processing", "pending");
                            self.store.release(message.id, now).await?;
                            metrics::delivery_outcomes().add(
                                1,
                                &[
                                    KeyValue::new("channel", self.channel.to_string()),
                                    KeyValue::new("outcome", "released"),
                                ],
                            );
                            warn!(
                                id = %message.id,
                                error = %e,
                                "channel unreachable, lease released to pool"
                            );
                        }
                        RetryDecision::Retry { delay } => {
                            record_status_transition(&span, "processing", "pending");
                            self.store
                                .record_failure(message.id, &e.to_string(), now + delay, false, now)
                                .await?;
                            metrics::delivery_outcomes().add(
                                1,
                                &[
                                    KeyValue::new("channel", self.channel.to_string()),
                                    KeyValue::new("outcome", "retry"),
                                ],
                            );
                            warn!(
                                id = %message.id,
                                attempt = message.attempts + 1,
                                retry_in_secs = delay.num_seconds(),
                                error = %e,
                                "delivery failed, retry scheduled"
                            );
                        }
                        RetryDecision::Fail => {
                            record_status_transition(&span, "processing", "failed");
                            self.store
                                .record_failure(message.id, &e.to_string(), now, true, now)
                                .await?;
                            metrics::delivery_outcomes().add(
                                1,
                                &[
                                    KeyValue::new("channel", self.channel.to_string()),
                                    KeyValue::new("outcome", "failed"),
                                ],
                            );
                            error!(
                                id = %message.id,
                                attempts = message.attempts + 1,
                                error = %e,
                                "message failed permanently"
                            );
                        }
                    }
                }
            }

            Ok(())
        }
        .instrument(span.clone())
        .await
    }

    /// Randomized pause between cycles. Desynchronizes channels so they
    /// never send in detectable bursts.
    fn jitter(&self) -> std::time::Duration {
        let min = self.jitter_min.min(self.jitter_max);
        let max = self.jitter_max.max(self.jitter_min);
        if min == max {
            return min;
        }
        let ms = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
        std::time::Duration::from_millis(ms)
    }
}
