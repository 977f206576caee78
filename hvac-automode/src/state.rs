//! Types shared by the Auto-Mode Controller: the global mode enum, the
//! transient per-evaluation device view and decision, and the persisted
//! state file shape (spec §3/§6).

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use hvac_core::model::DeviceId;
use serde::{Deserialize, Serialize};

/// The shared compressor's global mode. Unlike [`hvac_core::model::OperatingMode`]
/// there is no `auto` value here — `auto` is an accessory-facing fiction the
/// plugin dispatcher reports for enrolled devices; the compressor itself is
/// only ever heating, cooling, or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalMode {
    Heat,
    Cool,
    Off,
}

/// A device's contribution to one evaluation: current temperature and the
/// comfort band it wants held, weighted by how much it should count
/// relative to other enrolled devices.
#[derive(Debug, Clone)]
pub struct DeviceView {
    pub id: DeviceId,
    pub name: String,
    pub current_temperature_f: Option<f64>,
    pub lower_bound_f: f64,
    pub upper_bound_f: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBreakdown {
    pub id: DeviceId,
    pub name: String,
    pub heat_demand: f64,
    pub cool_demand: f64,
}

/// Result of one [`crate::controller::AutoModeController::evaluate`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub desired_mode: GlobalMode,
    pub total_heat: f64,
    pub total_cool: f64,
    pub per_device_breakdown: Vec<DeviceBreakdown>,
    pub human_reason: String,
    pub suppressed: bool,
    pub seconds_until_allowed: Option<u64>,
}

mod epoch_millis {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        dt.timestamp_millis().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let millis = i64::deserialize(d)?;
        Utc.timestamp_millis_opt(millis).single().ok_or_else(|| serde::de::Error::custom("invalid epoch millis"))
    }
}

/// Persisted shape (spec §6): `{currentMode, lastSwitchTime, lastOnTime,
/// lastOffTime, enrolledDeviceIds}`, instants as epoch millis so a restart
/// can never shorten a timing lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoModeStateFile {
    pub current_mode: GlobalMode,
    #[serde(with = "epoch_millis")]
    pub last_switch_time: DateTime<Utc>,
    #[serde(with = "epoch_millis")]
    pub last_on_time: DateTime<Utc>,
    #[serde(with = "epoch_millis")]
    pub last_off_time: DateTime<Utc>,
    pub enrolled_device_ids: BTreeSet<DeviceId>,
}

pub(crate) fn epoch_zero() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().expect("epoch zero is a valid instant")
}

pub struct AutoModeStateStore {
    path: PathBuf,
}

impl AutoModeStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<Option<AutoModeStateFile>, hvac_core::CoreError> {
        hvac_core::storage::read_json(&self.path).await
    }

    pub async fn save(&self, state: &AutoModeStateFile) -> Result<(), hvac_core::CoreError> {
        hvac_core::storage::write_json_atomic(&self.path, state).await
    }
}
