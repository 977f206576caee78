//! Startup orchestrator (spec §2, §5): wires every subsystem together,
//! resolves the Coordinator/plugin-dispatcher cyclic dependency, and
//! spawns the poll loop, the auth-refresh cron, and the display-light
//! sweep.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use hvac_accessory::{AccessoryCache, Cooldown, LoggingAccessoryAdapter};
use hvac_automode::{AutoModeConfig, AutoModeController};
use hvac_cloud::{AuthManager, CloudClient};
use hvac_core::storage::CoordinatorStateStore;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::plugins::core_passthrough::CorePassthrough;
use crate::plugins::display_light_monitor::DisplayLightMonitor;
use crate::plugins::hvac_auto_mode::HvacAutoMode;
use crate::plugins::{CoordinatorHandle, Plugin, PluginDispatcher};
use crate::state::AppState;

/// The running subsystems' join handles, held by [`crate::run`] so they
/// can be aborted in shutdown order (spec §5).
pub struct RunningTasks {
    pub poll: JoinHandle<()>,
    pub refresh: JoinHandle<()>,
    pub display_light: JoinHandle<()>,
}

impl RunningTasks {
    /// Stops subsystems in the spec §5 shutdown order: poll, then
    /// refresh, then the display-light monitor.
    pub fn shutdown(&self) {
        self.poll.abort();
        self.refresh.abort();
        self.display_light.abort();
    }
}

pub async fn build_state(cfg: &Config) -> Result<AppState> {
    let http = reqwest::Client::new();

    let auth = Arc::new(AuthManager::new(
        http.clone(),
        cfg.oauth_token_url.clone(),
        cfg.cloud_client_id.clone(),
        cfg.cloud_client_secret.clone(),
        cfg.token_path.clone(),
    ));
    auth.load().await?;

    let cloud = Arc::new(CloudClient::new(http, cfg.cloud_base_url.clone(), auth.clone()));

    let mut accessory_cache = AccessoryCache::new(cfg.accessory_cache_path.clone());
    accessory_cache.load().await?;

    let mut auto_mode = AutoModeController::new(cfg.auto_mode_state_path.clone(), AutoModeConfig::default());
    auto_mode.load().await?;

    // Cyclic wiring (spec §9): the handle is constructed first and
    // handed to plugins; it is bound to the Coordinator only once the
    // latter exists, via a weak reference to avoid an Arc cycle.
    let handle = Arc::new(CoordinatorHandle::new());

    let display_light_monitor = Arc::new(DisplayLightMonitor::new(handle.clone()));
    let plugins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(CorePassthrough),
        Arc::new(HvacAutoMode::new(auto_mode, handle.clone())),
        display_light_monitor.clone(),
    ];
    let dispatcher = Arc::new(PluginDispatcher::new(plugins));

    let accessory = Arc::new(LoggingAccessoryAdapter);
    let cooldown = Cooldown::new(Duration::from_secs(2));
    let state_store = CoordinatorStateStore::new(cfg.device_state_path.clone());

    let coordinator =
        Arc::new(Coordinator::new(cloud, dispatcher, accessory, accessory_cache, cooldown, state_store));
    handle.bind(Arc::downgrade(&coordinator));

    coordinator.load().await?;
    if let Err(err) = coordinator.reload().await {
        tracing::warn!(error = %err, "initial device reload failed, starting with an empty paired set");
    }

    Ok(AppState { coordinator, auth, display_light_monitor, last_poll_at: Arc::new(RwLock::new(None)) })
}

/// Spawns the three independent periodic tasks described in spec §5:
/// the poll loop (cycles never overlap — a slow cycle skips its next
/// tick), the hourly auth-refresh cron, and the display-light sweep.
pub fn spawn_tasks(state: &AppState, cfg: &Config) -> RunningTasks {
    let poll = {
        let state = state.clone();
        let interval = cfg.poll_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = state.coordinator.poll_cycle().await {
                    tracing::warn!(error = %err, "poll cycle failed");
                }
                *state.last_poll_at.write().await = Some(Utc::now());
            }
        })
    };

    let refresh = {
        let auth = state.auth.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(3600));
            loop {
                ticker.tick().await;
                if !auth.check_and_refresh_token().await {
                    tracing::warn!("proactive token refresh failed, will retry next cycle");
                }
            }
        })
    };

    let display_light = state.display_light_monitor.clone().spawn_scan_loop(cfg.display_light_scan_interval);

    RunningTasks { poll, refresh, display_light }
}
