//! Delivery span helpers.
//!
//! Provides span creation and state-transition recording for messages
//! flowing through a channel worker.

use crate::model::{ChannelId, MessageId};
use tracing::Span;

/// Start a span for one delivery attempt.
///
/// The `message.status` field is declared empty and can be updated via
/// [`record_status_transition`].
pub fn start_delivery_span(channel: &ChannelId, message_id: &MessageId) -> Span {
    tracing::info_span!(
        "message.deliver",
        "message.channel" = %channel,
        "message.id" = %message_id,
        "message.status" = tracing::field::Empty,
    )
}

/// Record a status transition event on the given span.
pub fn record_status_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "status_transition");
    });
}
