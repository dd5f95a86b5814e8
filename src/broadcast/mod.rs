//! Fan-out of chat messages to connected clients.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::connection_manager::ConnectionRegistry;
use crate::metrics::MessageMetrics;
use crate::relay::ChatMessage;
use crate::websocket::OutboundMessage;

/// Result of a broadcast attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    /// Number of connections the message was queued to
    pub delivered_to: usize,
    /// Number of closing or closed connections that were skipped
    pub skipped: usize,
}

/// Statistics for the broadcast engine
#[derive(Debug, Default)]
pub struct BroadcastStats {
    pub total_broadcasts: AtomicU64,
    pub total_delivered: AtomicU64,
    pub total_skipped: AtomicU64,
    pub total_direct: AtomicU64,
}

impl BroadcastStats {
    pub fn snapshot(&self) -> BroadcastStatsSnapshot {
        BroadcastStatsSnapshot {
            total_broadcasts: self.total_broadcasts.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_skipped: self.total_skipped.load(Ordering::Relaxed),
            total_direct: self.total_direct.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of broadcast statistics
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastStatsSnapshot {
    pub total_broadcasts: u64,
    pub total_delivered: u64,
    pub total_skipped: u64,
    pub total_direct: u64,
}

/// Delivers messages to every open connection in the registry.
///
/// Delivery is fire-and-forget: no acknowledgement, no retry. Callers must
/// serialize `broadcast` invocations to keep per-connection order stable.
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    stats: BroadcastStats,
}

impl BroadcastEngine {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            stats: BroadcastStats::default(),
        }
    }

    pub fn stats(&self) -> BroadcastStatsSnapshot {
        self.stats.snapshot()
    }

    /// Serialize once and queue the message to every open connection
    #[tracing::instrument(
        name = "broadcast.broadcast",
        skip(self, message),
        fields(message_id = %message.id(), kind = message.kind().as_str())
    )]
    pub fn broadcast(&self, message: &ChatMessage) -> DeliveryResult {
        let outbound = match OutboundMessage::preserialize(message) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "Failed to pre-serialize message, falling back to per-connection serialization");
                OutboundMessage::Chat(message.clone())
            }
        };

        let mut delivered = 0;
        let mut skipped = 0;

        for handle in self.registry.all() {
            if !handle.is_open() {
                skipped += 1;
                continue;
            }
            match handle.send(outbound.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    // Writer went away between the check and the send
                    skipped += 1;
                }
            }
        }

        self.stats.total_broadcasts.fetch_add(1, Ordering::Relaxed);
        self.stats.total_delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats.total_skipped.fetch_add(skipped as u64, Ordering::Relaxed);
        MessageMetrics::record_broadcast(message.kind(), delivered, skipped);

        tracing::debug!(delivered = delivered, skipped = skipped, "Broadcast message");

        DeliveryResult {
            delivered_to: delivered,
            skipped,
        }
    }

    /// Queue a single message to one connection. Returns false if the
    /// connection is unknown or closed.
    pub fn send_to(&self, connection_id: Uuid, message: &ChatMessage) -> bool {
        let Some(handle) = self.registry.get(connection_id) else {
            return false;
        };

        let sent = handle.send(OutboundMessage::Chat(message.clone())).is_ok();
        if sent {
            self.stats.total_direct.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }

    /// Replay an ordered sequence to one connection, returning how many were queued
    pub fn replay(&self, connection_id: Uuid, messages: &[ChatMessage]) -> usize {
        let mut sent = 0;
        for message in messages {
            if !self.send_to(connection_id, message) {
                break;
            }
            sent += 1;
        }
        MessageMetrics::record_replayed(sent);
        sent
    }
}
