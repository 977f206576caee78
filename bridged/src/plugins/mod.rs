//! Plugin dispatcher (spec §4.6): a fixed-order chain of device
//! handlers with pre/post hooks for state translation.

pub mod core_passthrough;
pub mod display_light_monitor;
pub mod hvac_auto_mode;

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use hvac_accessory::{HookOutcome, ProposedState};
use hvac_core::model::{Device, DeviceState};

use crate::coordinator::Coordinator;

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn should_handle_device(&self, _device: &Device) -> bool {
        true
    }

    async fn before_set_smartthings_state(&self, _device: &Device, proposed: ProposedState) -> HookOutcome {
        HookOutcome::Modified(proposed)
    }

    async fn before_set_homekit_state(&self, _device: &Device, proposed: ProposedState) -> HookOutcome {
        HookOutcome::Modified(proposed)
    }

    async fn after_device_update(&self, _device: &Device, _new: &DeviceState, _old: Option<&DeviceState>) {}

    async fn on_poll_cycle(&self, _all_devices: &[Device]) {}
}

/// Completes the cyclic wiring between the dispatcher's plugins and the
/// Coordinator (spec §9): plugins are constructed, and this handle
/// handed to them, before the Coordinator exists. Once the Coordinator
/// is built, the orchestrator calls [`CoordinatorHandle::bind`] exactly
/// once. A weak reference avoids an `Arc` cycle — the Coordinator holds
/// the dispatcher (and therefore the plugins) strongly.
#[derive(Default)]
pub struct CoordinatorHandle {
    coordinator: OnceLock<Weak<Coordinator>>,
}

impl CoordinatorHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, coordinator: Weak<Coordinator>) {
        let _ = self.coordinator.set(coordinator);
    }

    pub fn coordinator(&self) -> Option<Arc<Coordinator>> {
        self.coordinator.get().and_then(Weak::upgrade)
    }
}

pub struct PluginDispatcher {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginDispatcher {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub async fn run_before_smartthings_state(&self, device: &Device, mut proposed: ProposedState) -> HookOutcome {
        for plugin in &self.plugins {
            if !plugin.should_handle_device(device) {
                continue;
            }
            match plugin.before_set_smartthings_state(device, proposed).await {
                HookOutcome::Cancel => return HookOutcome::Cancel,
                HookOutcome::Modified(next) => proposed = next,
            }
        }
        HookOutcome::Modified(proposed)
    }

    pub async fn run_before_homekit_state(&self, device: &Device, mut proposed: ProposedState) -> HookOutcome {
        for plugin in &self.plugins {
            if !plugin.should_handle_device(device) {
                continue;
            }
            match plugin.before_set_homekit_state(device, proposed).await {
                HookOutcome::Cancel => return HookOutcome::Cancel,
                HookOutcome::Modified(next) => proposed = next,
            }
        }
        HookOutcome::Modified(proposed)
    }

    pub async fn run_after_device_update(&self, device: &Device, new: &DeviceState, old: Option<&DeviceState>) {
        for plugin in &self.plugins {
            if plugin.should_handle_device(device) {
                plugin.after_device_update(device, new, old).await;
            }
        }
    }

    pub async fn run_on_poll_cycle(&self, all_devices: &[Device]) {
        for plugin in &self.plugins {
            plugin.on_poll_cycle(all_devices).await;
        }
    }
}
