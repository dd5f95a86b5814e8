use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionRegistry;
use crate::websocket::OutboundMessage;

/// Background task that pings connections and closes idle ones.
///
/// Idle connections are only asked to close; the socket handler then runs the
/// normal disconnect path, so leave notices and registry removal still apply.
pub struct HeartbeatTask {
    config: WebSocketConfig,
    registry: Arc<ConnectionRegistry>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        registry: Arc<ConnectionRegistry>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            shutdown,
        }
    }

    /// Run the heartbeat and cleanup tasks
    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval.max(1));
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval.max(1));
        let connection_timeout = self.config.connection_timeout;

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats();
                }
                _ = cleanup_timer.tick() => {
                    self.close_idle_connections(connection_timeout);
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Queue a ping to every open connection
    fn send_heartbeats(&self) -> usize {
        let connections = self.registry.all();
        let mut sent = 0;

        for handle in &connections {
            if handle.send(OutboundMessage::Ping).is_ok() {
                sent += 1;
            } else {
                tracing::debug!(
                    connection_id = %handle.id,
                    "Failed to queue heartbeat, connection may be dead"
                );
            }
        }

        tracing::debug!(total = connections.len(), sent = sent, "Heartbeat round completed");
        sent
    }

    /// Ask connections idle past the timeout to close
    fn close_idle_connections(&self, timeout_secs: u64) -> usize {
        let idle = self.registry.find_idle_connections(timeout_secs);

        for handle in &idle {
            tracing::info!(
                connection_id = %handle.id,
                last_activity = %handle.last_activity(),
                "Closing idle connection"
            );
            let _ = handle.send(OutboundMessage::Close);
        }

        if !idle.is_empty() {
            tracing::info!(
                closed = idle.len(),
                timeout_secs = timeout_secs,
                "Closed idle connections"
            );
        }

        idle.len()
    }
}
