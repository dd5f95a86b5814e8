use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Chat room behaviour: history retention, bot replies and input limits
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Number of messages retained and replayed to newly joined clients
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Display name used for automated replies
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    #[serde(default = "default_greeting_delay_ms")]
    pub greeting_delay_ms: u64,
    #[serde(default = "default_support_delay_ms")]
    pub support_delay_ms: u64,
    #[serde(default = "default_fallback_delay_ms")]
    pub fallback_delay_ms: u64,
    /// Probability (0.0-1.0) of a generic reply when no keyword matches
    #[serde(default = "default_fallback_probability")]
    pub fallback_probability: f64,
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default = "default_max_username_length")]
    pub max_username_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Heartbeat interval in seconds (server sends ping)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Connection timeout in seconds (disconnect if no activity)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Cleanup task interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

/// OpenTelemetry export settings
#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_history_capacity() -> usize {
    100
}

fn default_bot_name() -> String {
    "Support Bot".to_string()
}

fn default_greeting_delay_ms() -> u64 {
    1000
}

fn default_support_delay_ms() -> u64 {
    1000
}

fn default_fallback_delay_ms() -> u64 {
    1500
}

fn default_fallback_probability() -> f64 {
    0.3
}

fn default_max_message_length() -> usize {
    2000
}

fn default_max_username_length() -> usize {
    50
}

fn default_heartbeat_interval() -> u64 {
    30 // 30 seconds
}

fn default_connection_timeout() -> u64 {
    120 // 2 minutes
}

fn default_cleanup_interval() -> u64 {
    60 // 1 minute
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "chat-relay".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("chat.history_capacity", default_history_capacity() as i64)?
            .set_default("websocket.heartbeat_interval", default_heartbeat_interval() as i64)?
            .set_default("websocket.connection_timeout", default_connection_timeout() as i64)?
            .set_default("websocket.cleanup_interval", default_cleanup_interval() as i64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // RELAY_SERVER__PORT, RELAY_CHAT__HISTORY_CAPACITY, RELAY_OTEL__ENABLED, etc.
            .add_source(
                Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.history_capacity == 0 {
            return Err(ConfigError::Message(
                "chat.history_capacity must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.chat.fallback_probability) {
            return Err(ConfigError::Message(format!(
                "chat.fallback_probability must be within 0.0..=1.0, got {}",
                self.chat.fallback_probability
            )));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            bot_name: default_bot_name(),
            greeting_delay_ms: default_greeting_delay_ms(),
            support_delay_ms: default_support_delay_ms(),
            fallback_delay_ms: default_fallback_delay_ms(),
            fallback_probability: default_fallback_probability(),
            max_message_length: default_max_message_length(),
            max_username_length: default_max_username_length(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            connection_timeout: default_connection_timeout(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
