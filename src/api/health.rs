//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::broadcast::BroadcastStatsSnapshot;
use crate::connection_manager::ConnectionStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryStats {
    pub length: usize,
    pub capacity: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStats,
    pub broadcast: BroadcastStatsSnapshot,
    pub history: HistoryStats,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        connections: state.relay.registry().len(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let connections = state.relay.registry().stats().await;
    let (length, capacity) = state.relay.history_usage().await;

    Json(StatsResponse {
        connections,
        broadcast: state.relay.broadcast_stats(),
        history: HistoryStats { length, capacity },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_health_reports_connections() {
        let state = AppState::new(Settings::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        state.relay.connect(tx).await;

        let Json(response) = health(State(state)).await;
        assert_eq!(response.status, "healthy");
        assert_eq!(response.connections, 1);
    }

    #[tokio::test]
    async fn test_stats_reports_history() {
        let state = AppState::new(Settings::default());
        state.relay.announce("hello").await;

        let Json(response) = stats(State(state)).await;
        assert_eq!(response.history.length, 1);
        assert_eq!(response.history.capacity, 100);
        assert_eq!(response.broadcast.total_broadcasts, 1);
    }
}
