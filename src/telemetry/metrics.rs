//! Metric instrument factories for courier-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"courier-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for courier-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("courier-rs")
}

/// Counter: messages enqueued.
/// Labels: `channel_hint` (channel name | "unassigned").
pub fn messages_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("courier.messages.enqueued")
        .with_description("Number of messages enqueued")
        .build()
}

/// Counter: claim operations.
/// Labels: `channel`, `outcome` ("hit" | "miss").
pub fn claim_operations() -> Counter<u64> {
    meter()
        .u64_counter("courier.claims")
        .with_description("Number of claim operations")
        .build()
}

/// Counter: message status transitions.
/// Labels: `from`, `to`.
pub fn status_transitions() -> Counter<u64> {
    meter()
        .u64_counter("courier.messages.status_transitions")
        .with_description("Number of message status transitions")
        .build()
}

/// Counter: delivery outcomes per worker iteration.
/// Labels: `channel`, `outcome` ("sent" | "retry" | "failed" | "released").
pub fn delivery_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("courier.deliveries")
        .with_description("Number of delivery attempts by outcome")
        .build()
}

/// Counter: reconnection attempts by the health monitor.
/// Labels: `channel`, `result` ("ok" | "error").
pub fn reconnect_attempts() -> Counter<u64> {
    meter()
        .u64_counter("courier.channel.reconnects")
        .with_description("Number of channel reconnection attempts")
        .build()
}

/// Counter: iterations skipped because the daily quota was exhausted.
/// Labels: `channel`.
pub fn quota_exhausted() -> Counter<u64> {
    meter()
        .u64_counter("courier.channel.quota_exhausted")
        .with_description("Worker iterations skipped due to exhausted daily quota")
        .build()
}

/// Histogram: transport send duration in milliseconds.
/// Labels: `channel`, `outcome`.
pub fn send_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("courier.send.duration_ms")
        .with_description("Transport send duration in milliseconds")
        .with_unit("ms")
        .build()
}
