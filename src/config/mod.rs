mod settings;

pub use settings::{ChatConfig, OtelConfig, ServerConfig, Settings, WebSocketConfig};
