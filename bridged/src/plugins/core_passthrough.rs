//! Core passthrough handler (spec §4.6): matches non-thermostat-like
//! devices and does nothing but log.

use async_trait::async_trait;
use hvac_core::model::{Device, DeviceState};

use super::Plugin;

#[derive(Default)]
pub struct CorePassthrough;

#[async_trait]
impl Plugin for CorePassthrough {
    fn name(&self) -> &'static str {
        "core-passthrough"
    }

    fn should_handle_device(&self, device: &Device) -> bool {
        !device.is_thermostat_like()
    }

    async fn after_device_update(&self, device: &Device, new: &DeviceState, _old: Option<&DeviceState>) {
        tracing::debug!(device_id = %device.id, mode = ?new.mode, "non-hvac device updated");
    }
}
