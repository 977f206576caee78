//! Device and device-state data model (spec §3).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::CapabilitySet;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Device metadata, as discovered from the cloud device list/detail calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub manufacturer: Option<String>,
    pub capabilities: CapabilitySet,
}

impl Device {
    pub fn is_thermostat_like(&self) -> bool {
        self.capabilities.is_thermostat_like()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    Heat,
    Cool,
    Auto,
    Off,
}

impl OperatingMode {
    /// Maps a raw vendor mode string onto the closed operating-mode
    /// enumeration. `wind` and `dry` (vendor fan/dehumidify variants
    /// reported by some AC models) normalize to `cool` per spec §3.
    /// Any other unrecognized string normalizes to `off` (fail safe —
    /// see DESIGN.md).
    pub fn from_vendor_str(raw: &str) -> Self {
        match raw {
            "heat" => Self::Heat,
            "cool" | "wind" | "dry" => Self::Cool,
            "auto" => Self::Auto,
            "off" => Self::Off,
            _ => Self::Off,
        }
    }

    pub fn as_cloud_str(&self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::Auto => "auto",
            Self::Off => "off",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    On,
    Off,
}

/// Live device state, as reconciled from cloud status polls (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub current_temperature_f: Option<f64>,
    pub heating_setpoint_f: Option<f64>,
    pub cooling_setpoint_f: Option<f64>,
    pub effective_setpoint_f: Option<f64>,
    pub mode: OperatingMode,
    pub power: PowerState,
    pub display_light_on: Option<bool>,
    pub last_refreshed: DateTime<Utc>,
}

impl DeviceState {
    /// Builds a state from raw, not-yet-normalized inputs, applying the
    /// switch/off-mode invariant, vendor-mode normalization, and the
    /// effective-setpoint derivation in one place so no caller can
    /// construct an inconsistent `DeviceState`.
    pub fn normalized(
        raw_mode: &str,
        power: PowerState,
        has_air_conditioner_mode: bool,
        current_temperature_f: Option<f64>,
        heating_setpoint_f: Option<f64>,
        cooling_setpoint_f: Option<f64>,
        display_light_on: Option<bool>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut mode = OperatingMode::from_vendor_str(raw_mode);
        if power == PowerState::Off && has_air_conditioner_mode {
            mode = OperatingMode::Off;
        }
        let effective_setpoint_f = match mode {
            OperatingMode::Cool => cooling_setpoint_f,
            _ => heating_setpoint_f.or(cooling_setpoint_f),
        };
        Self {
            current_temperature_f,
            heating_setpoint_f,
            cooling_setpoint_f,
            effective_setpoint_f,
            mode,
            power,
            display_light_on,
            last_refreshed: now,
        }
    }

    /// True when `other` differs enough from `self` to be worth pushing
    /// to the accessory protocol (spec §4.4 material-delta rule).
    pub fn differs_materially(&self, other: &DeviceState) -> bool {
        if self.mode != other.mode {
            return true;
        }
        let temp_delta = match (self.current_temperature_f, other.current_temperature_f) {
            (Some(a), Some(b)) => (a - b).abs() > 0.5,
            (None, None) => false,
            _ => true,
        };
        if temp_delta {
            return true;
        }
        match (self.effective_setpoint_f, other.effective_setpoint_f) {
            (Some(a), Some(b)) => (a - b).abs() > 0.5,
            (None, None) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn switch_off_forces_off_mode_when_ac_mode_advertised() {
        let state = DeviceState::normalized("cool", PowerState::Off, true, Some(72.0), None, Some(70.0), None, now());
        assert_eq!(state.mode, OperatingMode::Off);
    }

    #[test]
    fn switch_off_does_not_force_off_without_ac_mode_capability() {
        let state = DeviceState::normalized("cool", PowerState::Off, false, Some(72.0), None, Some(70.0), None, now());
        assert_eq!(state.mode, OperatingMode::Cool);
    }

    #[test]
    fn wind_and_dry_normalize_to_cool() {
        for raw in ["wind", "dry"] {
            let state = DeviceState::normalized(raw, PowerState::On, true, None, None, Some(70.0), None, now());
            assert_eq!(state.mode, OperatingMode::Cool);
        }
    }

    #[test]
    fn effective_setpoint_uses_cooling_when_mode_is_cool() {
        let state =
            DeviceState::normalized("cool", PowerState::On, true, None, Some(68.0), Some(74.0), None, now());
        assert_eq!(state.effective_setpoint_f, Some(74.0));
    }

    #[test]
    fn effective_setpoint_falls_back_to_heating_then_cooling() {
        let heat_state =
            DeviceState::normalized("heat", PowerState::On, false, None, Some(68.0), Some(74.0), None, now());
        assert_eq!(heat_state.effective_setpoint_f, Some(68.0));

        let no_heat_state =
            DeviceState::normalized("heat", PowerState::On, false, None, None, Some(74.0), None, now());
        assert_eq!(no_heat_state.effective_setpoint_f, Some(74.0));
    }

    #[test]
    fn mode_change_is_a_material_delta() {
        let a = DeviceState::normalized("heat", PowerState::On, false, Some(70.0), Some(68.0), None, None, now());
        let b = DeviceState::normalized("cool", PowerState::On, false, Some(70.0), Some(68.0), None, None, now());
        assert!(a.differs_materially(&b));
    }

    #[test]
    fn small_temperature_drift_is_not_material() {
        let a = DeviceState::normalized("heat", PowerState::On, false, Some(70.0), Some(68.0), None, None, now());
        let b = DeviceState::normalized("heat", PowerState::On, false, Some(70.3), Some(68.0), None, None, now());
        assert!(!a.differs_materially(&b));
    }

    #[test]
    fn large_temperature_swing_is_material() {
        let a = DeviceState::normalized("heat", PowerState::On, false, Some(70.0), Some(68.0), None, None, now());
        let b = DeviceState::normalized("heat", PowerState::On, false, Some(71.0), Some(68.0), None, None, now());
        assert!(a.differs_materially(&b));
    }
}
