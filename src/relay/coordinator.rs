use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::broadcast::{BroadcastEngine, BroadcastStatsSnapshot, DeliveryResult};
use crate::config::ChatConfig;
use crate::connection_manager::{ConnectionHandle, ConnectionRegistry};
use crate::error::RegistryError;
use crate::history::HistoryBuffer;
use crate::metrics::{BotMetrics, ConnectionMetrics, FrameMetrics, MessageMetrics};
use crate::responder::{Responder, ScheduledReply};
use crate::websocket::{ClientFrame, FrameLimits, OutboundMessage};

use super::{ChatMessage, Identity, MessageKind};

/// What the coordinator did with one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Identified,
    Sent { reply_scheduled: bool },
    /// Well-formed frame with an action the relay does not handle
    Ignored,
    /// Chat text from a connection that has not identified
    DroppedAnonymous,
    Malformed,
    UnknownConnection,
}

/// History plus fan-out. The history mutex is the single-writer lock: it is
/// held across every append-then-broadcast so each connection observes
/// broadcasts in the order they were made.
struct Room {
    history: Mutex<HistoryBuffer>,
    broadcaster: BroadcastEngine,
}

impl Room {
    async fn publish(&self, message: ChatMessage) -> DeliveryResult {
        let mut history = self.history.lock().await;
        self.append_and_broadcast(&mut history, message)
    }

    fn append_and_broadcast(&self, history: &mut HistoryBuffer, message: ChatMessage) -> DeliveryResult {
        history.append(message.clone());
        MessageMetrics::set_history_length(history.len());
        self.broadcaster.broadcast(&message)
    }
}

/// Orchestrates the registry, history, broadcast engine and responder.
///
/// One instance is created per server process and shared through `AppState`.
pub struct RelayCoordinator {
    registry: Arc<ConnectionRegistry>,
    room: Arc<Room>,
    responder: Responder,
    frame_limits: FrameLimits,
}

impl RelayCoordinator {
    pub fn new(config: &ChatConfig) -> Self {
        Self::with_responder(config, Responder::new(config))
    }

    pub fn with_responder(config: &ChatConfig, responder: Responder) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let room = Arc::new(Room {
            history: Mutex::new(HistoryBuffer::new(config.history_capacity)),
            broadcaster: BroadcastEngine::new(registry.clone()),
        });

        Self {
            registry,
            room,
            responder,
            frame_limits: FrameLimits::from(config),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn broadcast_stats(&self) -> BroadcastStatsSnapshot {
        self.room.broadcaster.stats()
    }

    pub async fn history_snapshot(&self) -> Vec<ChatMessage> {
        self.room.history.lock().await.snapshot()
    }

    /// Returns (length, capacity)
    pub async fn history_usage(&self) -> (usize, usize) {
        let history = self.room.history.lock().await;
        (history.len(), history.capacity())
    }

    /// Register a freshly accepted transport. The connection starts anonymous.
    pub async fn connect(&self, sender: mpsc::UnboundedSender<OutboundMessage>) -> Arc<ConnectionHandle> {
        let _room = self.room.history.lock().await;
        self.registry.register(sender)
    }

    /// Decode and apply one inbound text frame. Never fails: bad frames are
    /// logged and dropped without touching relay state.
    pub async fn handle_frame(&self, connection_id: Uuid, text: &str) -> FrameOutcome {
        let frame = match ClientFrame::parse(text, self.frame_limits) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(connection_id = %connection_id, "Ignoring frame with unknown action");
                FrameMetrics::record_unsupported();
                return FrameOutcome::Ignored;
            }
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Dropping malformed frame");
                FrameMetrics::record_malformed();
                return FrameOutcome::Malformed;
            }
        };

        match frame {
            ClientFrame::Identify { username, is_admin } => {
                FrameMetrics::record_received("identify");
                match self.identify(connection_id, Identity::new(username, is_admin)).await {
                    Ok(()) => FrameOutcome::Identified,
                    Err(e) => {
                        tracing::warn!(error = %e, "Identify for unregistered connection");
                        FrameOutcome::UnknownConnection
                    }
                }
            }
            ClientFrame::Message { text } => {
                FrameMetrics::record_received("message");
                self.send_message(connection_id, &text).await
            }
        }
    }

    /// Attach an identity, announce the join, then replay history to the new
    /// connection. The replay includes the join notice just broadcast.
    #[tracing::instrument(
        name = "relay.identify",
        skip(self, identity),
        fields(username = %identity.display_name, is_operator = identity.is_operator)
    )]
    pub async fn identify(&self, connection_id: Uuid, identity: Identity) -> Result<(), RegistryError> {
        let mut history = self.room.history.lock().await;

        let display_name = identity.display_name.clone();
        self.registry.set_identity(connection_id, identity).await?;
        self.refresh_identified_gauge().await;

        let join = ChatMessage::join(&display_name);
        self.room.append_and_broadcast(&mut history, join);

        let snapshot = history.snapshot();
        let replayed = self.room.broadcaster.replay(connection_id, &snapshot);

        tracing::info!(replayed = replayed, "Connection identified");
        Ok(())
    }

    /// Post chat text from an identified connection. Visitor messages are
    /// handed to the responder, which may schedule a delayed bot reply.
    #[tracing::instrument(name = "relay.send", skip(self, text))]
    pub async fn send_message(&self, connection_id: Uuid, text: &str) -> FrameOutcome {
        let Some(handle) = self.registry.get(connection_id) else {
            return FrameOutcome::UnknownConnection;
        };
        let Some(identity) = handle.identity().await else {
            tracing::debug!("Dropping message from anonymous connection");
            FrameMetrics::record_anonymous_send();
            return FrameOutcome::DroppedAnonymous;
        };

        let kind = identity.message_kind();
        let message = ChatMessage::new(kind, identity.display_name, text);
        let result = self.room.publish(message).await;
        tracing::debug!(delivered = result.delivered_to, "Message posted");

        let reply_scheduled = kind == MessageKind::Visitor
            && match self.responder.maybe_respond(text) {
                Some(reply) => {
                    self.schedule_reply(reply);
                    true
                }
                None => false,
            };

        FrameOutcome::Sent { reply_scheduled }
    }

    /// Broadcast a system notice to the whole room
    pub async fn announce(&self, text: &str) -> DeliveryResult {
        self.room
            .publish(ChatMessage::new(MessageKind::System, "System", text))
            .await
    }

    /// Remove a closed connection and, if it had identified, announce the leave
    #[tracing::instrument(name = "relay.disconnect", skip(self))]
    pub async fn disconnect(&self, connection_id: Uuid) {
        let mut history = self.room.history.lock().await;

        let Some(handle) = self.registry.remove(connection_id) else {
            return;
        };
        self.refresh_identified_gauge().await;

        if let Some(identity) = handle.identity().await {
            let leave = ChatMessage::leave(&identity.display_name);
            self.room.append_and_broadcast(&mut history, leave);
            tracing::info!(username = %identity.display_name, "Identified connection left");
        }
    }

    async fn refresh_identified_gauge(&self) {
        let stats = self.registry.stats().await;
        ConnectionMetrics::set_identified(stats.identified_connections);
    }

    /// Post the reply after its delay. The task is never cancelled; it fires
    /// even if the originating connection has gone.
    fn schedule_reply(&self, reply: ScheduledReply) {
        BotMetrics::record_scheduled(reply.rule.as_str());
        tracing::debug!(
            rule = reply.rule.as_str(),
            delay_ms = reply.delay.as_millis() as u64,
            "Scheduled bot reply"
        );

        let room = self.room.clone();
        let deadline = tokio::time::Instant::now() + reply.delay;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            room.publish(reply.message).await;
            BotMetrics::record_sent();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quiet_config() -> ChatConfig {
        ChatConfig {
            fallback_probability: 0.0,
            greeting_delay_ms: 10,
            support_delay_ms: 10,
            fallback_delay_ms: 10,
            ..Default::default()
        }
    }

    fn coordinator(config: &ChatConfig) -> RelayCoordinator {
        RelayCoordinator::with_responder(config, Responder::with_seed(config, 1))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> Vec<ChatMessage> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            let json = item.to_json().expect("chat item").expect("serializable");
            out.push(serde_json::from_str(&json).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_identify_broadcasts_join_and_replays_history() {
        let relay = coordinator(&quiet_config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = relay.connect(tx).await;

        let outcome = relay
            .handle_frame(conn.id, r#"{"action":"identify","username":"Alice","isAdmin":false}"#)
            .await;
        assert_eq!(outcome, FrameOutcome::Identified);

        let history = relay.history_snapshot().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind(), MessageKind::Join);

        // Broadcast copy plus replayed copy of the same join notice
        let received = drain(&mut rx);
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].id(), history[0].id());
        assert_eq!(received[1].id(), history[0].id());
    }

    #[tokio::test]
    async fn test_message_before_identify_is_dropped() {
        let relay = coordinator(&quiet_config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = relay.connect(tx).await;

        let outcome = relay
            .handle_frame(conn.id, r#"{"action":"message","text":"hello"}"#)
            .await;

        assert_eq!(outcome, FrameOutcome::DroppedAnonymous);
        assert!(relay.history_snapshot().await.is_empty());
        assert!(drain(&mut rx).is_empty());
        assert_eq!(relay.broadcast_stats().total_broadcasts, 0);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_frames_leave_state_untouched() {
        let relay = coordinator(&quiet_config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = relay.connect(tx).await;

        assert_eq!(relay.handle_frame(conn.id, "{oops").await, FrameOutcome::Malformed);
        assert_eq!(
            relay.handle_frame(conn.id, r#"{"action":"identify"}"#).await,
            FrameOutcome::Malformed
        );
        assert_eq!(
            relay.handle_frame(conn.id, r#"{"action":"typing"}"#).await,
            FrameOutcome::Ignored
        );

        assert!(relay.history_snapshot().await.is_empty());
        assert!(conn.identity().await.is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_operator_messages_get_no_bot_reply() {
        let config = quiet_config();
        let relay = coordinator(&config);
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = relay.connect(tx).await;
        relay.identify(conn.id, Identity::new("Olga", true)).await.unwrap();

        let outcome = relay.send_message(conn.id, "hello everyone").await;
        assert_eq!(outcome, FrameOutcome::Sent { reply_scheduled: false });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let history = relay.history_snapshot().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].kind(), MessageKind::Operator);
        assert_eq!(history[1].sender(), "Olga");
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_reply_fires_after_sender_disconnects() {
        let config = quiet_config();
        let relay = coordinator(&config);

        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = relay.connect(tx_a).await;
        let b = relay.connect(tx_b).await;
        relay.identify(a.id, Identity::new("Alice", false)).await.unwrap();
        relay.identify(b.id, Identity::new("Bob", false)).await.unwrap();
        drain(&mut rx_b);

        let outcome = relay.send_message(a.id, "hi").await;
        assert_eq!(outcome, FrameOutcome::Sent { reply_scheduled: true });
        relay.disconnect(a.id).await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        let kinds: Vec<_> = drain(&mut rx_b).iter().map(|m| m.kind()).collect();
        assert_eq!(kinds, vec![MessageKind::Visitor, MessageKind::Leave, MessageKind::Bot]);
    }

    #[tokio::test]
    async fn test_disconnect_anonymous_is_silent() {
        let relay = coordinator(&quiet_config());
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = relay.connect(tx_a).await;
        relay.connect(tx_b).await;

        relay.disconnect(a.id).await;

        assert!(relay.registry().get(a.id).is_none());
        assert!(relay.history_snapshot().await.is_empty());
        assert!(drain(&mut rx_b).is_empty());

        // Closing twice is harmless
        relay.disconnect(a.id).await;
    }

    #[tokio::test]
    async fn test_announce_posts_system_message() {
        let relay = coordinator(&quiet_config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        relay.connect(tx).await;

        let result = relay.announce("Maintenance in 5 minutes").await;
        assert_eq!(result.delivered_to, 1);

        let received = drain(&mut rx);
        assert_eq!(received[0].kind(), MessageKind::System);
        assert_eq!(relay.history_usage().await, (1, 100));
    }

    #[tokio::test]
    async fn test_identify_unknown_connection() {
        let relay = coordinator(&quiet_config());
        let outcome = relay
            .handle_frame(Uuid::new_v4(), r#"{"action":"identify","username":"Ghost"}"#)
            .await;
        assert_eq!(outcome, FrameOutcome::UnknownConnection);
        assert!(relay.history_snapshot().await.is_empty());
    }
}
