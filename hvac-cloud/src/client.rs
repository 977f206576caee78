//! Cloud REST client (spec §4.3/§4.4): device enumeration, status
//! polling, and command execution, all wrapped in the shared retry
//! primitive and gated on the auth manager's token.

use std::sync::Arc;

use chrono::Utc;
use hvac_core::capability::{CapabilitySet, ThermostatCapabilities as C, extract_capability_ids};
use hvac_core::model::{Device, DeviceId, DeviceState, PowerState};
use hvac_core::retry::RetryPolicy;
use serde::de::DeserializeOwned;

use crate::auth::AuthManager;
use crate::commands::{self, changes_temperature_or_mode};
use crate::error::CloudError;
use crate::types::{CloudCommand, CommandsRequest, DeviceListResponse, DeviceWire, StatusResponse};

pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<AuthManager>,
    retry: RetryPolicy,
}

fn wire_to_device(wire: &DeviceWire) -> Device {
    let top = wire.top_level_capability_ids();
    let components = wire.component_capability_ids();
    let ids = extract_capability_ids(&top, &components);
    Device {
        id: DeviceId::from(wire.device_id.clone()),
        name: wire.display_name(),
        manufacturer: wire.manufacturer_name.clone(),
        capabilities: CapabilitySet::from_ids(ids),
    }
}

impl CloudClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, auth: Arc<AuthManager>) -> Self {
        Self { http, base_url: base_url.into(), auth, retry: RetryPolicy::default() }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CloudError> {
        let url = format!("{}{}", self.base_url, path);
        let http = self.http.clone();
        let token = self.auth.access_token().await.ok_or(CloudError::Unauthenticated)?;
        self.retry
            .run("cloud_get", CloudError::classification, || {
                let http = http.clone();
                let url = url.clone();
                let token = token.clone();
                async move {
                    let resp = http.get(&url).bearer_auth(&token).send().await?;
                    let status = resp.status();
                    if status.is_success() {
                        resp.json::<T>().await.map_err(CloudError::Request)
                    } else {
                        let body = resp.text().await.unwrap_or_default();
                        Err(CloudError::from_status(status, body))
                    }
                }
            })
            .await
    }

    async fn get_device_wire(&self, device_id: &str) -> Result<DeviceWire, CloudError> {
        self.get_json(&format!("/devices/{device_id}")).await
    }

    /// Enumerates paired devices. On an unauthenticated cloud, returns
    /// an empty list rather than an error. Device detail fetches happen
    /// concurrently; a per-device failure falls back to the summary
    /// returned by the list call instead of failing the whole call.
    pub async fn list_devices(&self) -> Result<Vec<Device>, CloudError> {
        if !self.auth.ensure_valid_token().await {
            return Ok(Vec::new());
        }
        let list: DeviceListResponse = self.get_json("/devices").await?;
        let devices = futures::future::join_all(list.items.iter().map(|summary| self.refine_device(summary))).await;
        Ok(devices)
    }

    async fn refine_device(&self, summary: &DeviceWire) -> Device {
        match self.get_device_wire(&summary.device_id).await {
            Ok(detail) => wire_to_device(&detail),
            Err(err) => {
                tracing::warn!(
                    device_id = %summary.device_id,
                    error = %err,
                    "device detail fetch failed, falling back to list summary"
                );
                wire_to_device(summary)
            }
        }
    }

    pub async fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, CloudError> {
        if !self.auth.ensure_valid_token().await {
            return Ok(None);
        }
        match self.get_device_wire(&id.0).await {
            Ok(wire) => Ok(Some(wire_to_device(&wire))),
            Err(CloudError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Fetches and normalizes a device's live status. `device` supplies
    /// the capability context ([`DeviceState::normalized`] needs to know
    /// whether `airConditionerMode` is advertised).
    pub async fn get_status(&self, device: &Device) -> Result<Option<DeviceState>, CloudError> {
        if !self.auth.ensure_valid_token().await {
            return Ok(None);
        }
        let status: StatusResponse = self.get_json(&format!("/devices/{}/status", device.id)).await?;
        Ok(Some(normalize_status(device, &status)))
    }

    async fn post_commands(&self, device: &Device, commands: &[CloudCommand]) -> Result<(), CloudError> {
        let url = format!("{}/devices/{}/commands", self.base_url, device.id);
        let http = self.http.clone();
        let token = self.auth.access_token().await.ok_or(CloudError::Unauthenticated)?;
        let body = CommandsRequest { commands: commands.to_vec() };
        self.retry
            .run("cloud_execute_commands", CloudError::classification, || {
                let http = http.clone();
                let url = url.clone();
                let token = token.clone();
                let body = body.clone();
                async move {
                    let resp = http.post(&url).bearer_auth(&token).json(&body).send().await?;
                    let status = resp.status();
                    if status.is_success() {
                        Ok(())
                    } else {
                        let text = resp.text().await.unwrap_or_default();
                        Err(CloudError::from_status(status, text))
                    }
                }
            })
            .await
    }

    /// Executes a command batch. Unauthenticated writes fail immediately
    /// with no network attempt and no retry. A batch that changes
    /// temperature or mode is followed by a best-effort, silently
    /// swallowed display-light-off for the same device.
    pub async fn execute_commands(&self, device: &Device, commands: Vec<CloudCommand>) -> Result<(), CloudError> {
        if !self.auth.ensure_valid_token().await {
            return Err(CloudError::Unauthenticated);
        }
        self.post_commands(device, &commands).await?;
        if changes_temperature_or_mode(&commands) {
            let suppression = vec![commands::translate_set_display_light(false)];
            if let Err(err) = self.post_commands(device, &suppression).await {
                tracing::debug!(
                    device_id = %device.id,
                    error = %err,
                    "best-effort display-light-off failed, ignoring"
                );
            }
        }
        Ok(())
    }

    pub async fn set_display_light(&self, device: &Device, on: bool) -> Result<(), CloudError> {
        if !self.auth.ensure_valid_token().await {
            return Err(CloudError::Unauthenticated);
        }
        self.post_commands(device, &[commands::translate_set_display_light(on)]).await
    }
}

fn normalize_status(device: &Device, status: &StatusResponse) -> DeviceState {
    let raw_mode = status
        .attribute_str("thermostatMode", "thermostatMode")
        .or_else(|| status.attribute_str("airConditionerMode", "airConditionerMode"))
        .unwrap_or_else(|| "off".to_string());
    let power = match status.attribute_str("switch", "switch").as_deref() {
        Some("on") => PowerState::On,
        _ => PowerState::Off,
    };
    let has_ac_mode = device.capabilities.contains(C::AIR_CONDITIONER_MODE);
    let current_temperature_f = status.attribute_f64("temperatureMeasurement", "temperature");
    let heating_setpoint_f = status.attribute_f64("thermostatHeatingSetpoint", "heatingSetpoint");
    let cooling_setpoint_f = status.attribute_f64("thermostatCoolingSetpoint", "coolingSetpoint");
    let display_light_on = commands::display_light_on_from_status(status);
    DeviceState::normalized(
        &raw_mode,
        power,
        has_ac_mode,
        current_temperature_f,
        heating_setpoint_f,
        cooling_setpoint_f,
        display_light_on,
        Utc::now(),
    )
}
