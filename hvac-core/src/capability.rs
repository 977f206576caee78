//! Normalizes the cloud's weakly-typed capability arrays into a closed,
//! bitflag-backed set plus the thermostat-like predicate from spec §3.

use std::collections::BTreeSet;

bitflags::bitflags! {
    /// The subset of cloud capability IDs this bridge cares about. Any
    /// capability string outside this set is kept as opaque metadata
    /// (see [`CapabilitySet::raw`]) rather than dropped.
    #[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ThermostatCapabilities: u16 {
        const TEMPERATURE_MEASUREMENT            = 0b0000_0001;
        const THERMOSTAT                         = 0b0000_0010;
        const THERMOSTAT_COOLING_SETPOINT         = 0b0000_0100;
        const THERMOSTAT_HEATING_SETPOINT         = 0b0000_1000;
        const THERMOSTAT_MODE                     = 0b0001_0000;
        const SWITCH                              = 0b0010_0000;
        const AIR_CONDITIONER_MODE                = 0b0100_0000;
        const CUSTOM_THERMOSTAT_SETPOINT_CONTROL  = 0b1000_0000;
    }
}

impl ThermostatCapabilities {
    fn from_id(id: &str) -> Option<Self> {
        match id {
            "temperatureMeasurement" => Some(Self::TEMPERATURE_MEASUREMENT),
            "thermostat" => Some(Self::THERMOSTAT),
            "thermostatCoolingSetpoint" => Some(Self::THERMOSTAT_COOLING_SETPOINT),
            "thermostatHeatingSetpoint" => Some(Self::THERMOSTAT_HEATING_SETPOINT),
            "thermostatMode" => Some(Self::THERMOSTAT_MODE),
            "switch" => Some(Self::SWITCH),
            "airConditionerMode" => Some(Self::AIR_CONDITIONER_MODE),
            "customThermostatSetpointControl" => Some(Self::CUSTOM_THERMOSTAT_SETPOINT_CONTROL),
            _ => None,
        }
    }
}

/// The normalized capability set for a device: recognized flags plus the
/// raw capability ids reported by the cloud (recognized or not), for
/// debugging and for plugins that need to see unrecognized capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct CapabilitySet {
    pub flags: ThermostatCapabilities,
    pub raw: BTreeSet<String>,
}

impl CapabilitySet {
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flags = ThermostatCapabilities::empty();
        let mut raw = BTreeSet::new();
        for id in ids {
            let id = id.as_ref();
            if let Some(flag) = ThermostatCapabilities::from_id(id) {
                flags |= flag;
            }
            raw.insert(id.to_string());
        }
        Self { flags, raw }
    }

    pub fn contains(&self, cap: ThermostatCapabilities) -> bool {
        self.flags.contains(cap)
    }

    /// A device is thermostat-like iff it advertises any direct HVAC
    /// capability, or advertises ambient temperature plus at least one
    /// setpoint capability.
    pub fn is_thermostat_like(&self) -> bool {
        use ThermostatCapabilities as C;
        if self.flags.intersects(C::THERMOSTAT | C::THERMOSTAT_MODE | C::AIR_CONDITIONER_MODE | C::CUSTOM_THERMOSTAT_SETPOINT_CONTROL)
        {
            return true;
        }
        self.flags.contains(C::TEMPERATURE_MEASUREMENT)
            && self.flags.intersects(C::THERMOSTAT_COOLING_SETPOINT | C::THERMOSTAT_HEATING_SETPOINT)
    }
}

/// Capability-array extraction rule: prefer the top-level array; fall
/// back to the union of every component's array only when the top-level
/// one is empty.
pub fn extract_capability_ids<'a>(
    top_level: &'a [String],
    components: &'a [Vec<String>],
) -> Vec<&'a str> {
    if !top_level.is_empty() {
        return top_level.iter().map(String::as_str).collect();
    }
    let mut set: BTreeSet<&'a str> = BTreeSet::new();
    for component in components {
        for id in component {
            set.insert(id.as_str());
        }
    }
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_array_wins_when_non_empty() {
        let top = vec!["thermostat".to_string()];
        let components = vec![vec!["switch".to_string()]];
        let ids = extract_capability_ids(&top, &components);
        assert_eq!(ids, vec!["thermostat"]);
    }

    #[test]
    fn falls_back_to_component_union_when_top_level_empty() {
        let top: Vec<String> = vec![];
        let components =
            vec![vec!["switch".to_string()], vec!["airConditionerMode".to_string(), "switch".to_string()]];
        let ids = extract_capability_ids(&top, &components);
        assert_eq!(ids, vec!["airConditionerMode", "switch"]);
    }

    #[test]
    fn thermostat_mode_alone_is_thermostat_like() {
        let caps = CapabilitySet::from_ids(["thermostatMode"]);
        assert!(caps.is_thermostat_like());
    }

    #[test]
    fn air_conditioner_mode_alone_is_thermostat_like() {
        let caps = CapabilitySet::from_ids(["airConditionerMode", "switch"]);
        assert!(caps.is_thermostat_like());
    }

    #[test]
    fn temperature_with_setpoint_is_thermostat_like() {
        let caps = CapabilitySet::from_ids(["temperatureMeasurement", "thermostatCoolingSetpoint"]);
        assert!(caps.is_thermostat_like());
    }

    #[test]
    fn temperature_alone_is_not_thermostat_like() {
        let caps = CapabilitySet::from_ids(["temperatureMeasurement"]);
        assert!(!caps.is_thermostat_like());
    }

    #[test]
    fn plain_switch_is_not_thermostat_like() {
        let caps = CapabilitySet::from_ids(["switch"]);
        assert!(!caps.is_thermostat_like());
    }

    #[test]
    fn unrecognized_capability_is_kept_as_raw_metadata_only() {
        let caps = CapabilitySet::from_ids(["colorControl", "switch"]);
        assert!(caps.raw.contains("colorControl"));
        assert!(caps.contains(ThermostatCapabilities::SWITCH));
        assert!(!caps.flags.contains(ThermostatCapabilities::THERMOSTAT));
    }
}
