use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::relay::RelayCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub relay: Arc<RelayCoordinator>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let relay = Arc::new(RelayCoordinator::new(&settings.chat));
        Self::with_relay(settings, relay)
    }

    /// Build state around an existing coordinator (e.g. one with a seeded responder)
    pub fn with_relay(settings: Settings, relay: Arc<RelayCoordinator>) -> Self {
        Self {
            settings: Arc::new(settings),
            relay,
            started_at: Instant::now(),
        }
    }
}
