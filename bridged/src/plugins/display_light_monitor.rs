//! Display-light monitor (spec §4.6): independently sweeps thermostat
//! devices on its own timer and turns a stray display light back off.
//! It joins the dispatcher chain only so it shows up alongside the
//! other handlers; its real work happens in [`DisplayLightMonitor::spawn_scan_loop`],
//! a separate task from the main poll cycle (spec §5's concurrency model).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hvac_core::model::Device;
use tokio::task::JoinHandle;

use super::{CoordinatorHandle, Plugin};

pub struct DisplayLightMonitor {
    handle: Arc<CoordinatorHandle>,
    scanning: AtomicBool,
}

impl DisplayLightMonitor {
    pub fn new(handle: Arc<CoordinatorHandle>) -> Self {
        Self { handle, scanning: AtomicBool::new(false) }
    }

    /// Spawns the periodic sweep. A tick is skipped outright if the
    /// previous sweep is still running, rather than queuing up.
    pub fn spawn_scan_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if self.scanning.swap(true, Ordering::AcqRel) {
                    tracing::debug!("display-light sweep still running, skipping this tick");
                    continue;
                }
                self.sweep().await;
                self.scanning.store(false, Ordering::Release);
            }
        })
    }

    async fn sweep(&self) {
        let Some(coordinator) = self.handle.coordinator() else { return };
        // Fetches fresh per-device status itself (spec §4.6) rather than
        // reusing the coordinator's cached snapshot, which is only as
        // fresh as the last poll cycle.
        if let Err(err) = coordinator.sweep_display_lights().await {
            tracing::warn!(error = %err, "display-light sweep failed");
        }
    }
}

#[async_trait]
impl Plugin for DisplayLightMonitor {
    fn name(&self) -> &'static str {
        "display-light-monitor"
    }

    fn should_handle_device(&self, device: &Device) -> bool {
        device.is_thermostat_like()
    }
}
