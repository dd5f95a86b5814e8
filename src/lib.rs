// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Relay core
pub mod broadcast;
pub mod connection_manager;
pub mod history;
pub mod relay;
pub mod responder;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod tasks;
