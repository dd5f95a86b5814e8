use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use chat_relay::config::Settings;
use chat_relay::error::AppError;
use chat_relay::server::{create_app, AppState};
use chat_relay::tasks::HeartbeatTask;
use chat_relay::telemetry::init_telemetry;
use chat_relay::websocket::OutboundMessage;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new().map_err(AppError::from)?;
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!(
        history_capacity = settings.chat.history_capacity,
        "Configuration loaded"
    );

    let state = AppState::new(settings.clone());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let heartbeat_task = HeartbeatTask::new(
        settings.websocket.clone(),
        state.relay.registry().clone(),
        shutdown_tx.subscribe(),
    );
    let heartbeat_handle = tokio::spawn(async move {
        heartbeat_task.run().await;
    });

    let app = create_app(state.clone());

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(state, shutdown_tx))
        .await?;

    tracing::info!("Waiting for background tasks to finish...");
    let _ = heartbeat_handle.await;

    // Pending bot replies are dropped with the runtime
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(state: AppState, shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    state.relay.announce("The chat is going offline for maintenance.").await;
    for handle in state.relay.registry().all() {
        let _ = handle.send(OutboundMessage::Close);
    }

    let _ = shutdown_tx.send(());
}
