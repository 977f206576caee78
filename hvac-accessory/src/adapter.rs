//! Boundary trait for the accessory-protocol bridge (spec §2: "external
//! collaborator with a defined interface only" — pairing, discovery, and
//! QR generation are a library integration out of scope for this crate).

use anyhow::Result;
use async_trait::async_trait;
use hvac_core::model::{Device, DeviceId, DeviceState};
use tokio::sync::mpsc;

use crate::cache::AccessoryCacheEntry;
use crate::event::ThermostatEvent;

#[async_trait]
pub trait AccessoryAdapter: Send + Sync {
    /// Publishes (or re-publishes) `device` as an accessory using the
    /// stable identity from the accessory cache.
    async fn publish_accessory(&self, device: &Device, identity: &AccessoryCacheEntry) -> Result<()>;

    /// Removes a previously published accessory, e.g. after the cloud
    /// drops the device or the user excludes it.
    async fn unpublish_accessory(&self, device_id: &DeviceId) -> Result<()>;

    /// Pushes a reconciled device state to the accessory.
    async fn push_state(&self, device_id: &DeviceId, state: &DeviceState) -> Result<()>;

    /// Hands back a channel of user-intent thermostat events as they
    /// arrive from the local controller. Events are delivered one at a
    /// time, in the order the user issued them for a given device.
    async fn subscribe_thermostat_events(&self) -> Result<mpsc::Receiver<ThermostatEvent>>;
}

/// An [`AccessoryAdapter`] that only logs — stands in for the real
/// local-controller library integration, which this workspace treats as
/// an external collaborator (spec §1, §2). Its event channel never
/// yields anything, since there is no real local controller behind it
/// to originate user-intent events.
#[derive(Default)]
pub struct LoggingAccessoryAdapter;

#[async_trait]
impl AccessoryAdapter for LoggingAccessoryAdapter {
    async fn publish_accessory(&self, device: &Device, identity: &AccessoryCacheEntry) -> Result<()> {
        tracing::info!(device_id = %device.id, uuid = %identity.uuid, "publishing accessory");
        Ok(())
    }

    async fn unpublish_accessory(&self, device_id: &DeviceId) -> Result<()> {
        tracing::info!(device_id = %device_id, "unpublishing accessory");
        Ok(())
    }

    async fn push_state(&self, device_id: &DeviceId, state: &DeviceState) -> Result<()> {
        tracing::debug!(device_id = %device_id, mode = ?state.mode, "pushing state to accessory");
        Ok(())
    }

    async fn subscribe_thermostat_events(&self) -> Result<mpsc::Receiver<ThermostatEvent>> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }
}
