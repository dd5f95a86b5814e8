//! Prometheus metrics for the chat relay.
//!
//! - Connection metrics (open and identified connections)
//! - Message metrics (broadcast by kind, deliveries, skipped deliveries)
//! - Bot reply metrics
//! - Inbound frame metrics (received, dropped by reason)

mod helpers;

pub use helpers::{encode_metrics, BotMetrics, ConnectionMetrics, FrameMetrics, MessageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "chat_relay";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of open WebSocket connections
    pub static ref CONNECTIONS_OPEN: IntGauge = register_int_gauge!(
        format!("{}_connections_open", METRIC_PREFIX),
        "Number of open WebSocket connections"
    ).unwrap();

    /// Number of connections that have identified
    pub static ref CONNECTIONS_IDENTIFIED: IntGauge = register_int_gauge!(
        format!("{}_connections_identified", METRIC_PREFIX),
        "Number of connections with an identity attached"
    ).unwrap();

    /// Total connections accepted
    pub static ref CONNECTIONS_OPENED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections accepted"
    ).unwrap();

    /// Connection duration in seconds
    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0, 14400.0]
    ).unwrap();

    // ============================================================================
    // Message Metrics
    // ============================================================================

    /// Messages broadcast, by message kind
    pub static ref MESSAGES_BROADCAST_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_broadcast_total", METRIC_PREFIX),
        "Total messages broadcast to the room",
        &["kind"]
    ).unwrap();

    /// Per-connection deliveries
    pub static ref MESSAGES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Total messages queued to open connections"
    ).unwrap();

    /// Deliveries skipped because the connection was closing or closed
    pub static ref MESSAGES_SKIPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_skipped_total", METRIC_PREFIX),
        "Total deliveries skipped for closed connections"
    ).unwrap();

    /// Messages replayed from history to joining connections
    pub static ref HISTORY_REPLAYED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_history_replayed_total", METRIC_PREFIX),
        "Total history messages replayed to joining connections"
    ).unwrap();

    /// Current number of messages held in history
    pub static ref HISTORY_LENGTH: IntGauge = register_int_gauge!(
        format!("{}_history_length", METRIC_PREFIX),
        "Messages currently retained in history"
    ).unwrap();

    // ============================================================================
    // Bot Metrics
    // ============================================================================

    /// Bot replies scheduled, by rule
    pub static ref BOT_REPLIES_SCHEDULED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_bot_replies_scheduled_total", METRIC_PREFIX),
        "Total automated replies scheduled",
        &["rule"]
    ).unwrap();

    /// Bot replies that fired and were broadcast
    pub static ref BOT_REPLIES_SENT_TOTAL: IntCounter = register_int_counter!(
        format!("{}_bot_replies_sent_total", METRIC_PREFIX),
        "Total automated replies broadcast"
    ).unwrap();

    // ============================================================================
    // Frame Metrics
    // ============================================================================

    /// Inbound frames received, by action
    pub static ref FRAMES_RECEIVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_frames_received_total", METRIC_PREFIX),
        "Total inbound frames received",
        &["action"]
    ).unwrap();

    /// Inbound frames dropped, by reason
    pub static ref FRAMES_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_frames_dropped_total", METRIC_PREFIX),
        "Total inbound frames dropped",
        &["reason"]
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics() {
        // lazy_static registers on first access
        CONNECTIONS_OPEN.set(1);

        let result = encode_metrics();
        assert!(result.is_ok());
        let output = result.unwrap();
        assert!(output.contains("chat_relay_connections_open"));
    }

    #[test]
    fn test_message_metrics() {
        MessageMetrics::record_broadcast(crate::relay::MessageKind::Visitor, 3, 1);
        MessageMetrics::record_replayed(10);
        MessageMetrics::set_history_length(10);
        // Just verify no panics
    }

    #[test]
    fn test_frame_metrics() {
        FrameMetrics::record_received("identify");
        FrameMetrics::record_malformed();
        FrameMetrics::record_anonymous_send();
        FrameMetrics::record_unsupported();
        // Just verify no panics
    }
}
