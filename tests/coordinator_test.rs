//! Coordinator lifecycle tests: start, drain, bootstrap failure, shutdown.

use async_trait::async_trait;
use chrono::Utc;
use courier_rs::clock::SystemClock;
use courier_rs::config::{ChannelConfig, ChannelRegistry, DeliveryConfig};
use courier_rs::coordinator::Coordinator;
use courier_rs::model::{ChannelId, ConnectivityState, NewMessage, Status};
use courier_rs::store::{MemoryStore, QueueStore};
use courier_rs::transport::{Transport, TransportError, TransportResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Transport where everything works unless a channel is marked down.
#[derive(Default)]
struct FakeTransport {
    down: Mutex<HashMap<String, bool>>,
    sent: AtomicUsize,
    connects: AtomicUsize,
}

impl FakeTransport {
    fn mark_down(&self, channel: &str) {
        self.down.lock().unwrap().insert(channel.to_string(), true);
    }

    fn is_down(&self, channel: &ChannelId) -> bool {
        self.down
            .lock()
            .unwrap()
            .get(channel.as_str())
            .copied()
            .unwrap_or(false)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, channel: &ChannelId, _: &str, _: &str) -> TransportResult<()> {
        if self.is_down(channel) {
            return Err(TransportError::Connectivity("down".to_string()));
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn check_health(&self, channel: &ChannelId) -> ConnectivityState {
        if self.is_down(channel) {
            ConnectivityState::Disconnected
        } else {
            ConnectivityState::Connected
        }
    }

    async fn connect(&self, channel: &ChannelId) -> TransportResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.is_down(channel) {
            Err(TransportError::Connectivity("connect refused".to_string()))
        } else {
            Ok(())
        }
    }
}

fn registry(names: &[&str]) -> ChannelRegistry {
    ChannelRegistry::from_channels(
        names
            .iter()
            .map(|name| ChannelConfig {
                name: name.to_string(),
                daily_quota: 100,
                hooks: None,
            })
            .collect(),
    )
}

/// Tight delays so lifecycle tests finish fast.
fn test_config() -> DeliveryConfig {
    DeliveryConfig {
        jitter_min: std::time::Duration::from_millis(5),
        jitter_max: std::time::Duration::from_millis(10),
        bootstrap_initial_delay: std::time::Duration::from_millis(1),
        ..Default::default()
    }
}

fn coordinator(
    registry: ChannelRegistry,
    store: &Arc<MemoryStore>,
    transport: &Arc<FakeTransport>,
) -> Coordinator {
    Coordinator::new(
        registry,
        Arc::clone(store) as Arc<dyn QueueStore>,
        Arc::clone(transport) as Arc<dyn Transport>,
        Arc::new(SystemClock),
        test_config(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_channels_drain_the_queue() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(FakeTransport::default());

    for i in 0..3 {
        store
            .enqueue(NewMessage::new(format!("r{i}"), "hello"), Utc::now())
            .await
            .unwrap();
    }

    let mut coordinator = coordinator(registry(&["a", "b"]), &store, &transport);
    coordinator.start().await.unwrap();
    assert_eq!(coordinator.channel_count(), 2);

    // Poll until everything is sent (2s timeout).
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        let sent = store.list(Some(Status::Sent), 10).await.unwrap();
        if sent.len() == 3 {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("queue did not drain, {} of 3 sent", sent.len());
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    coordinator.shutdown();
    coordinator.join().await;
    assert_eq!(transport.sent.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bootstrap_failure_flags_channel_but_keeps_it_running() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(FakeTransport::default());
    transport.mark_down("a");

    let message = store
        .enqueue(NewMessage::new("x", "payload"), Utc::now())
        .await
        .unwrap();

    let mut coordinator = coordinator(registry(&["a"]), &store, &transport);
    coordinator.start().await.unwrap();
    assert_eq!(coordinator.channel_count(), 1);

    // Bootstrap burned its whole retry budget.
    assert_eq!(transport.connects.load(Ordering::SeqCst), 3);

    // The worker loop runs but the flagged channel never claims.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(store.get(message.id).await.unwrap().status, Status::Pending);
    assert_eq!(transport.sent.load(Ordering::SeqCst), 0);
    // And it does not keep dialing out either.
    assert_eq!(transport.connects.load(Ordering::SeqCst), 3);

    coordinator.shutdown();
    coordinator.join().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_bad_channel_does_not_stop_the_other() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(FakeTransport::default());
    transport.mark_down("a");

    let message = store
        .enqueue(NewMessage::new("x", "payload"), Utc::now())
        .await
        .unwrap();

    let mut coordinator = coordinator(registry(&["a", "b"]), &store, &transport);
    coordinator.start().await.unwrap();

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        if store.get(message.id).await.unwrap().status == Status::Sent {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("healthy channel never delivered");
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let delivered = store.get(message.id).await.unwrap();
    assert_eq!(delivered.channel, Some(ChannelId::from("b")));
    assert_eq!(delivered.attempts, 0);

    coordinator.shutdown();
    coordinator.join().await;
}

#[tokio::test]
async fn start_twice_is_an_error() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(FakeTransport::default());

    let mut coordinator = coordinator(registry(&["a"]), &store, &transport);
    coordinator.start().await.unwrap();
    assert!(coordinator.start().await.is_err());

    coordinator.shutdown();
    coordinator.join().await;
}

#[tokio::test]
async fn empty_registry_starts_nothing() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(FakeTransport::default());

    let mut coordinator = coordinator(ChannelRegistry::empty(), &store, &transport);
    coordinator.start().await.unwrap();
    assert_eq!(coordinator.channel_count(), 0);
}
