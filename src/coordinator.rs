//! Queue coordinator: owns the configured channels and their workers.
//!
//! Constructed once at process start with injected dependencies, so tests
//! can run as many independent instances as they like. `start` boots each
//! channel with its own capped retry — a channel that cannot connect is
//! flagged for manual intervention but its worker still runs, ready to
//! pick up a fix. Channels fail independently; one bad bootstrap never
//! stops the others.

use crate::clock::Clock;
use crate::config::{ChannelRegistry, DeliveryConfig};
use crate::error::{Error, Result};
use crate::model::ChannelId;
use crate::store::QueueStore;
use crate::transport::Transport;
use crate::worker::ChannelWorker;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

struct WorkerHandle {
    channel: ChannelId,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

pub struct Coordinator {
    registry: ChannelRegistry,
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: DeliveryConfig,
    workers: Vec<WorkerHandle>,
}

impl Coordinator {
    pub fn new(
        registry: ChannelRegistry,
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            registry,
            store,
            transport,
            clock,
            config,
            workers: Vec::new(),
        }
    }

    /// Bootstrap every configured channel and spawn its worker loop.
    pub async fn start(&mut self) -> Result<()> {
        if !self.workers.is_empty() {
            return Err(Error::Other("coordinator already started".to_string()));
        }
        if self.registry.is_empty() {
            warn!("no channels configured, nothing to start");
            return Ok(());
        }

        let channels: Vec<_> = self.registry.iter().cloned().collect();
        for channel_config in channels {
            let id = channel_config.id();
            let bootstrapped = self.bootstrap_channel(&id).await;

            let shutdown = Arc::new(Notify::new());
            let mut worker = ChannelWorker::new(
                &channel_config,
                Arc::clone(&self.store),
                Arc::clone(&self.transport),
                Arc::clone(&self.clock),
                &self.config,
                Arc::clone(&shutdown),
            );
            if !bootstrapped {
                worker.flag_channel();
            }

            let handle = tokio::spawn(worker.run());
            self.workers.push(WorkerHandle {
                channel: id,
                shutdown,
                handle,
            });
        }

        info!(channels = self.workers.len(), "coordinator started");
        Ok(())
    }

    /// Connect a channel, retrying with its own capped backoff. Returns
    /// false once the budget is spent — the caller flags the channel and
    /// moves on.
    async fn bootstrap_channel(&self, id: &ChannelId) -> bool {
        let mut delay = self.config.bootstrap_initial_delay;
        for attempt in 1..=self.config.bootstrap_max_attempts {
            match self.transport.connect(id).await {
                Ok(()) => {
                    info!(channel = %id, "channel connected");
                    return true;
                }
                Err(e) => {
                    warn!(channel = %id, attempt, error = %e, "channel bootstrap failed");
                    if attempt < self.config.bootstrap_max_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        error!(
            channel = %id,
            attempts = self.config.bootstrap_max_attempts,
            "channel bootstrap exhausted retries, flagging for manual intervention"
        );
        false
    }

    /// Signal every worker to stop after its current cycle.
    pub fn shutdown(&self) {
        for worker in &self.workers {
            worker.shutdown.notify_one();
        }
    }

    /// Wait for all workers to finish. Call after [`Coordinator::shutdown`].
    pub async fn join(&mut self) {
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.handle.await {
                error!(channel = %worker.channel, error = %e, "worker task panicked");
            }
        }
    }

    pub fn channel_count(&self) -> usize {
        self.workers.len()
    }
}
