//! Atomic JSON persistence primitives, and the coordinator state file
//! format from spec §6. Every persisted-state file in this workspace
//! (token, coordinator state, auto-mode state, accessory cache) goes
//! through [`write_json_atomic`]/[`read_json`] so a crash mid-save can
//! never leave a truncated file on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tokio::fs;

use crate::error::CoreError;
use crate::model::{DeviceId, DeviceState, OperatingMode};

/// Writes `value` as pretty JSON to `path` via temp-file + rename.
pub async fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let tmp_path = tmp_path_for(path);
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp_path, &bytes).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Reads and decodes a JSON file, treating a missing file as `Ok(None)`
/// rather than an error (spec: "if the file is missing, proceed without
/// auth"/analogous for other stores — absence is a normal cold-start).
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Wire format for the persisted coordinator state (spec §6):
/// `{pairedDevices, averageTemperature, currentMode, deviceStates}`
/// with `deviceStates` as an order-insignificant list of `(id, state)`
/// pairs rather than a JSON object, matching the spec exactly.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStateFile {
    pub paired_devices: Vec<DeviceId>,
    pub average_temperature: Option<f64>,
    pub current_mode: OperatingMode,
    pub device_states: Vec<(DeviceId, DeviceState)>,
}

impl CoordinatorStateFile {
    pub fn from_parts(
        paired_devices: Vec<DeviceId>,
        states: &HashMap<DeviceId, DeviceState>,
        average_temperature: Option<f64>,
        current_mode: OperatingMode,
    ) -> Self {
        Self {
            paired_devices,
            average_temperature,
            current_mode,
            device_states: states.iter().map(|(id, st)| (id.clone(), st.clone())).collect(),
        }
    }

    pub fn into_parts(self) -> (Vec<DeviceId>, HashMap<DeviceId, DeviceState>, Option<f64>, OperatingMode) {
        let states = self.device_states.into_iter().collect();
        (self.paired_devices, states, self.average_temperature, self.current_mode)
    }
}

/// File-backed store for the coordinator state, loaded at startup and
/// written atomically after every mutation (spec §3).
pub struct CoordinatorStateStore {
    path: PathBuf,
}

impl CoordinatorStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<Option<CoordinatorStateFile>, CoreError> {
        read_json(&self.path).await
    }

    pub async fn save(&self, state: &CoordinatorStateFile) -> Result<(), CoreError> {
        write_json_atomic(&self.path, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::model::PowerState;

    #[tokio::test]
    async fn round_trips_coordinator_state_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.json");
        let store = CoordinatorStateStore::new(&path);

        assert!(store.load().await.unwrap().is_none());

        let mut states = HashMap::new();
        states.insert(
            DeviceId::from("dev-1"),
            DeviceState::normalized("cool", PowerState::On, false, Some(72.0), None, Some(70.0), None, Utc::now()),
        );
        let file = CoordinatorStateFile::from_parts(
            vec![DeviceId::from("dev-1")],
            &states,
            Some(70.0),
            OperatingMode::Cool,
        );
        store.save(&file).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.paired_devices, vec![DeviceId::from("dev-1")]);
        assert_eq!(loaded.device_states.len(), 1);
        assert_eq!(loaded.current_mode, OperatingMode::Cool);
    }

    #[tokio::test]
    async fn save_never_leaves_a_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("coordinator.json");
        let store = CoordinatorStateStore::new(&path);
        let file = CoordinatorStateFile::from_parts(vec![], &HashMap::new(), None, OperatingMode::Off);
        store.save(&file).await.unwrap();

        assert!(path.exists());
        assert!(!tmp_path_for(&path).exists());
    }
}
