use std::sync::Arc;

use chrono::{DateTime, Utc};
use hvac_cloud::AuthManager;
use tokio::sync::RwLock;

use crate::coordinator::Coordinator;
use crate::plugins::display_light_monitor::DisplayLightMonitor;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub auth: Arc<AuthManager>,
    pub display_light_monitor: Arc<DisplayLightMonitor>,
    pub last_poll_at: Arc<RwLock<Option<DateTime<Utc>>>>,
}
