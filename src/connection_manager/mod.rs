//! Connection registry for live WebSocket sessions.

mod registry;
mod stats;
mod types;

pub use registry::ConnectionRegistry;
pub use stats::ConnectionStats;
pub use types::ConnectionHandle;
