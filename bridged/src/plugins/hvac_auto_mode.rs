//! HVAC auto-mode handler (spec §4.6): bridges accessory-facing "auto"
//! mode requests to the shared-compressor [`AutoModeController`], and
//! broadcasts the controller's decisions back down to enrolled devices.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hvac_accessory::{HookOutcome, ProposedState, ThermostatEvent};
use hvac_automode::{AutoModeController, DeviceView, GlobalMode};
use hvac_core::model::{Device, DeviceId, OperatingMode};
use tokio::sync::Mutex;

use super::{CoordinatorHandle, Plugin};

fn global_to_operating(mode: GlobalMode) -> OperatingMode {
    match mode {
        GlobalMode::Heat => OperatingMode::Heat,
        GlobalMode::Cool => OperatingMode::Cool,
        GlobalMode::Off => OperatingMode::Off,
    }
}

pub struct HvacAutoMode {
    controller: Mutex<AutoModeController>,
    handle: Arc<CoordinatorHandle>,
}

impl HvacAutoMode {
    pub fn new(controller: AutoModeController, handle: Arc<CoordinatorHandle>) -> Self {
        Self { controller: Mutex::new(controller), handle }
    }
}

#[async_trait]
impl Plugin for HvacAutoMode {
    fn name(&self) -> &'static str {
        "hvac-auto-mode"
    }

    fn should_handle_device(&self, device: &Device) -> bool {
        device.is_thermostat_like()
    }

    /// Requesting "auto" enrolls the device and hands it whatever the
    /// shared compressor currently runs; requesting any concrete mode
    /// unenrolls it.
    async fn before_set_smartthings_state(&self, device: &Device, proposed: ProposedState) -> HookOutcome {
        let mut controller = self.controller.lock().await;
        match proposed.mode {
            Some(OperatingMode::Auto) => {
                let _ = controller.enroll(device.id.clone()).await;
                let running = global_to_operating(controller.current_mode());
                HookOutcome::Modified(ProposedState { mode: Some(running), ..proposed })
            }
            Some(_) => {
                let _ = controller.unenroll(&device.id).await;
                HookOutcome::Modified(proposed)
            }
            None => HookOutcome::Modified(proposed),
        }
    }

    /// Enrolled devices always report "auto" upward, regardless of what
    /// mode the shared compressor is actually running.
    async fn before_set_homekit_state(&self, device: &Device, mut proposed: ProposedState) -> HookOutcome {
        if self.controller.lock().await.is_enrolled(&device.id) {
            proposed.mode = Some(OperatingMode::Auto);
        }
        HookOutcome::Modified(proposed)
    }

    async fn on_poll_cycle(&self, _all_devices: &[Device]) {
        let enrolled: Vec<_> = {
            let controller = self.controller.lock().await;
            controller.enrolled_ids().cloned().collect()
        };
        if enrolled.is_empty() {
            return;
        }

        let Some(coordinator) = self.handle.coordinator() else { return };
        let snapshot = coordinator.device_and_state_snapshot().await;
        let views: Vec<DeviceView> = snapshot
            .iter()
            .filter(|(device, _)| enrolled.contains(&device.id))
            .map(|(device, state)| DeviceView {
                id: device.id.clone(),
                name: device.name.clone(),
                current_temperature_f: state.current_temperature_f,
                lower_bound_f: state.heating_setpoint_f.unwrap_or(68.0),
                upper_bound_f: state.cooling_setpoint_f.unwrap_or(72.0),
                weight: 1.0,
            })
            .collect();

        let now = Utc::now();
        let decision = {
            let controller = self.controller.lock().await;
            controller.evaluate(&views, now)
        };
        let changed = {
            let mut controller = self.controller.lock().await;
            controller.apply_decision(&decision, now).await.unwrap_or(false)
        };

        if !changed {
            return;
        }
        tracing::info!(mode = ?decision.desired_mode, reason = %decision.human_reason, "auto-mode switched");

        // Open question (spec §9): broadcast unconditionally to every
        // enrolled device, even ones already running the new mode.
        let target_mode = global_to_operating(decision.desired_mode);
        for device_id in enrolled {
            let event = ThermostatEvent {
                device_id: device_id.clone(),
                mode: Some(target_mode),
                heating_setpoint_f: None,
                cooling_setpoint_f: None,
            };
            if let Err(err) = coordinator.handle_thermostat_event(event).await {
                tracing::warn!(device_id = %device_id, error = %err, "auto-mode broadcast failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use hvac_automode::AutoModeConfig;
    use hvac_core::capability::CapabilitySet;

    use super::*;

    fn device(id: &str) -> Device {
        Device { id: DeviceId::from(id), name: "Office AC".to_string(), manufacturer: None, capabilities: CapabilitySet::default() }
    }

    fn plugin() -> HvacAutoMode {
        let dir = tempfile::tempdir().unwrap();
        let controller = AutoModeController::new(dir.path().join("auto-mode.json"), AutoModeConfig::default());
        HvacAutoMode::new(controller, Arc::new(CoordinatorHandle::new()))
    }

    #[tokio::test]
    async fn requesting_auto_enrolls_the_device_and_rewrites_its_mode() {
        let plugin = plugin();
        let device = device("dev-1");
        let proposed = ProposedState { mode: Some(OperatingMode::Auto), heating_setpoint_f: None, cooling_setpoint_f: None };

        let outcome = plugin.before_set_smartthings_state(&device, proposed).await;
        let HookOutcome::Modified(result) = outcome else { panic!("expected Modified") };

        // The shared compressor starts off, so a brand new enrollee is
        // handed "off" until the controller decides otherwise.
        assert_eq!(result.mode, Some(OperatingMode::Off));
        assert!(plugin.controller.lock().await.is_enrolled(&device.id));
    }

    #[tokio::test]
    async fn requesting_a_concrete_mode_unenrolls_the_device() {
        let plugin = plugin();
        let device = device("dev-1");
        plugin.controller.lock().await.enroll(device.id.clone()).await.unwrap();

        let proposed = ProposedState { mode: Some(OperatingMode::Heat), heating_setpoint_f: None, cooling_setpoint_f: None };
        plugin.before_set_smartthings_state(&device, proposed).await;

        assert!(!plugin.controller.lock().await.is_enrolled(&device.id));
    }

    #[tokio::test]
    async fn homekit_state_always_reports_auto_for_an_enrolled_device() {
        let plugin = plugin();
        let device = device("dev-1");
        plugin.controller.lock().await.enroll(device.id.clone()).await.unwrap();

        let proposed = ProposedState { mode: Some(OperatingMode::Cool), heating_setpoint_f: None, cooling_setpoint_f: None };
        let outcome = plugin.before_set_homekit_state(&device, proposed).await;
        let HookOutcome::Modified(result) = outcome else { panic!("expected Modified") };

        assert_eq!(result.mode, Some(OperatingMode::Auto));
    }

    #[tokio::test]
    async fn poll_cycle_with_no_enrolled_devices_is_a_no_op() {
        let plugin = plugin();
        // The coordinator handle is never bound; if the early-return on an
        // empty enrollment set didn't fire, this would panic on unwrap.
        plugin.on_poll_cycle(&[]).await;
    }
}
