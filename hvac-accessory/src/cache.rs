//! Accessory cache (spec §3/§6): maps a cloud device ID to the stable
//! local-protocol identity assigned the first time it was published, so
//! the local controller treats it as the same accessory across restarts.

use std::collections::HashMap;
use std::path::PathBuf;

use hvac_core::CoreError;
use hvac_core::model::{Device, DeviceId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessoryCacheEntry {
    pub device_id: DeviceId,
    pub name: String,
    pub uuid: Uuid,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: String,
    pub firmware_revision: String,
}

pub struct AccessoryCache {
    path: PathBuf,
    entries: HashMap<DeviceId, AccessoryCacheEntry>,
}

impl AccessoryCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), entries: HashMap::new() }
    }

    pub async fn load(&mut self) -> Result<(), CoreError> {
        if let Some(list) = hvac_core::storage::read_json::<Vec<AccessoryCacheEntry>>(&self.path).await? {
            self.entries = list.into_iter().map(|e| (e.device_id.clone(), e)).collect();
        }
        Ok(())
    }

    async fn save(&self) -> Result<(), CoreError> {
        let list: Vec<AccessoryCacheEntry> = self.entries.values().cloned().collect();
        hvac_core::storage::write_json_atomic(&self.path, &list).await
    }

    pub fn get(&self, id: &DeviceId) -> Option<&AccessoryCacheEntry> {
        self.entries.get(id)
    }

    /// Returns the cached identity for `device`, minting and persisting a
    /// fresh stable UUID on first publish.
    pub async fn get_or_create(&mut self, device: &Device) -> Result<AccessoryCacheEntry, CoreError> {
        if let Some(existing) = self.entries.get(&device.id) {
            return Ok(existing.clone());
        }
        let entry = AccessoryCacheEntry {
            device_id: device.id.clone(),
            name: device.name.clone(),
            uuid: Uuid::new_v4(),
            manufacturer: device.manufacturer.clone(),
            model: None,
            serial_number: device.id.to_string(),
            firmware_revision: "unknown".to_string(),
        };
        self.entries.insert(device.id.clone(), entry.clone());
        self.save().await?;
        Ok(entry)
    }

    pub async fn remove(&mut self, id: &DeviceId) -> Result<(), CoreError> {
        if self.entries.remove(id).is_some() {
            self.save().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvac_core::capability::CapabilitySet;

    fn device(id: &str) -> Device {
        Device { id: DeviceId::from(id), name: "Living Room AC".to_string(), manufacturer: Some("Samsung".to_string()), capabilities: CapabilitySet::default() }
    }

    #[tokio::test]
    async fn get_or_create_assigns_a_stable_uuid_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = AccessoryCache::new(dir.path().join("accessories.json"));

        let first = cache.get_or_create(&device("dev-1")).await.unwrap();
        let second = cache.get_or_create(&device("dev-1")).await.unwrap();
        assert_eq!(first.uuid, second.uuid);
    }

    #[tokio::test]
    async fn cache_survives_a_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accessories.json");
        let mut cache = AccessoryCache::new(&path);
        let entry = cache.get_or_create(&device("dev-1")).await.unwrap();

        let mut reloaded = AccessoryCache::new(&path);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.get(&DeviceId::from("dev-1")), Some(&entry));
    }
}
