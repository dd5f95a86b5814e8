//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::relay::MessageKind;

use super::{
    BOT_REPLIES_SCHEDULED_TOTAL, BOT_REPLIES_SENT_TOTAL, CONNECTIONS_IDENTIFIED, CONNECTIONS_OPEN,
    CONNECTIONS_OPENED_TOTAL, CONNECTION_DURATION, FRAMES_DROPPED_TOTAL, FRAMES_RECEIVED_TOTAL,
    HISTORY_LENGTH, HISTORY_REPLAYED_TOTAL, MESSAGES_BROADCAST_TOTAL, MESSAGES_DELIVERED_TOTAL,
    MESSAGES_SKIPPED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        CONNECTIONS_OPENED_TOTAL.inc();
        CONNECTIONS_OPEN.inc();
    }

    pub fn record_closed(duration_secs: f64) {
        CONNECTIONS_OPEN.dec();
        CONNECTION_DURATION.observe(duration_secs);
    }

    pub fn set_identified(count: usize) {
        CONNECTIONS_IDENTIFIED.set(count as i64);
    }
}

/// Helper struct for recording message metrics
pub struct MessageMetrics;

impl MessageMetrics {
    /// Record one broadcast and its per-connection outcome
    pub fn record_broadcast(kind: MessageKind, delivered: usize, skipped: usize) {
        MESSAGES_BROADCAST_TOTAL.with_label_values(&[kind.as_str()]).inc();
        MESSAGES_DELIVERED_TOTAL.inc_by(delivered as u64);
        MESSAGES_SKIPPED_TOTAL.inc_by(skipped as u64);
    }

    pub fn record_replayed(count: usize) {
        HISTORY_REPLAYED_TOTAL.inc_by(count as u64);
    }

    pub fn set_history_length(len: usize) {
        HISTORY_LENGTH.set(len as i64);
    }
}

/// Helper struct for recording bot reply metrics
pub struct BotMetrics;

impl BotMetrics {
    pub fn record_scheduled(rule: &str) {
        BOT_REPLIES_SCHEDULED_TOTAL.with_label_values(&[rule]).inc();
    }

    pub fn record_sent() {
        BOT_REPLIES_SENT_TOTAL.inc();
    }
}

/// Helper struct for recording inbound frame metrics
pub struct FrameMetrics;

impl FrameMetrics {
    pub fn record_received(action: &str) {
        FRAMES_RECEIVED_TOTAL.with_label_values(&[action]).inc();
    }

    /// Unparseable or invalid frame
    pub fn record_malformed() {
        FRAMES_DROPPED_TOTAL.with_label_values(&["malformed"]).inc();
    }

    /// Chat text sent before identify
    pub fn record_anonymous_send() {
        FRAMES_DROPPED_TOTAL.with_label_values(&["anonymous"]).inc();
    }

    /// Binary frames or unknown actions
    pub fn record_unsupported() {
        FRAMES_DROPPED_TOTAL.with_label_values(&["unsupported"]).inc();
    }
}
