//! Command translation table (spec §4.3): maps a device-agnostic intent
//! onto the vendor-specific capability/command pairs the cloud expects,
//! given the device's advertised capabilities.

use hvac_core::capability::ThermostatCapabilities as C;
use hvac_core::capability::CapabilitySet;
use hvac_core::model::OperatingMode;
use serde_json::json;

use crate::types::{CloudCommand, StatusResponse};

fn switch_command(on: bool) -> CloudCommand {
    CloudCommand {
        component: "main".to_string(),
        capability: "switch".to_string(),
        command: if on { "on" } else { "off" }.to_string(),
        arguments: vec![],
    }
}

/// Sets the operating mode. Devices with `thermostatMode` get a single
/// `setThermostatMode` command. Devices with only `airConditionerMode`
/// (no direct thermostat mode capability) need a `switch` command plus
/// `setAirConditionerMode` to turn on, or just `switch.off` to turn off —
/// the vendor models "off" as a power state, not a mode value.
pub fn translate_set_mode(caps: &CapabilitySet, mode: OperatingMode) -> Vec<CloudCommand> {
    if caps.contains(C::THERMOSTAT_MODE) {
        return vec![CloudCommand {
            component: "main".to_string(),
            capability: "thermostatMode".to_string(),
            command: "setThermostatMode".to_string(),
            arguments: vec![json!(mode.as_cloud_str())],
        }];
    }
    if caps.contains(C::AIR_CONDITIONER_MODE) {
        return match mode {
            OperatingMode::Off => vec![switch_command(false)],
            _ => vec![
                switch_command(true),
                CloudCommand {
                    component: "main".to_string(),
                    capability: "airConditionerMode".to_string(),
                    command: "setAirConditionerMode".to_string(),
                    arguments: vec![json!(mode.as_cloud_str())],
                },
            ],
        };
    }
    Vec::new()
}

pub fn translate_set_cooling_setpoint(temp_f: f64) -> CloudCommand {
    CloudCommand {
        component: "main".to_string(),
        capability: "thermostatCoolingSetpoint".to_string(),
        command: "setCoolingSetpoint".to_string(),
        arguments: vec![json!(temp_f)],
    }
}

pub fn translate_set_heating_setpoint(temp_f: f64) -> CloudCommand {
    CloudCommand {
        component: "main".to_string(),
        capability: "thermostatHeatingSetpoint".to_string(),
        command: "setHeatingSetpoint".to_string(),
        arguments: vec![json!(temp_f)],
    }
}

/// The vendor's display-light token is inverted relative to the visible
/// effect: `Light_On` turns the panel light OFF, `Light_Off` turns it ON.
/// This and [`display_light_on_from_status`] are the only functions in
/// the workspace allowed to know that; every other caller uses the
/// intuitive `on: bool`.
pub fn translate_set_display_light(on: bool) -> CloudCommand {
    let token = if on { "Light_Off" } else { "Light_On" };
    CloudCommand {
        component: "main".to_string(),
        capability: "execute".to_string(),
        command: "execute".to_string(),
        arguments: vec![json!("mode/vs/0"), json!({ "x.com.samsung.da.options": [token] })],
    }
}

/// Reads the display-light panel state back out of a status response, by
/// decoding the same inverted `execute`/`data` token shape used to set it.
pub fn display_light_on_from_status(status: &StatusResponse) -> Option<bool> {
    let data = status.attribute_value("execute", "data")?;
    let token = data.get(1)?.get("x.com.samsung.da.options")?.get(0)?.as_str()?;
    match token {
        "Light_On" => Some(false),
        "Light_Off" => Some(true),
        _ => None,
    }
}

/// True when a command batch changes temperature setpoint or mode,
/// triggering the post-write best-effort display-light-off (spec §4.3).
pub fn changes_temperature_or_mode(commands: &[CloudCommand]) -> bool {
    commands.iter().any(|c| {
        matches!(
            c.capability.as_str(),
            "thermostatCoolingSetpoint" | "thermostatHeatingSetpoint" | "thermostatMode" | "airConditionerMode"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(ids: &[&str]) -> CapabilitySet {
        CapabilitySet::from_ids(ids.iter().copied())
    }

    #[test]
    fn samsung_ac_off_emits_only_switch_off() {
        let c = caps(&["switch", "airConditionerMode"]);
        let commands = translate_set_mode(&c, OperatingMode::Off);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].capability, "switch");
        assert_eq!(commands[0].command, "off");
    }

    #[test]
    fn samsung_ac_heat_from_off_emits_switch_on_then_set_mode() {
        let c = caps(&["switch", "airConditionerMode"]);
        let commands = translate_set_mode(&c, OperatingMode::Heat);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].capability, "switch");
        assert_eq!(commands[0].command, "on");
        assert_eq!(commands[1].capability, "airConditionerMode");
        assert_eq!(commands[1].command, "setAirConditionerMode");
        assert_eq!(commands[1].arguments, vec![json!("heat")]);
    }

    #[test]
    fn thermostat_mode_devices_get_a_single_command() {
        let c = caps(&["thermostatMode"]);
        let commands = translate_set_mode(&c, OperatingMode::Cool);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].capability, "thermostatMode");
        assert_eq!(commands[0].arguments, vec![json!("cool")]);
    }

    #[test]
    fn display_light_round_trips_through_the_inverted_vendor_tokens() {
        let on = translate_set_display_light(true);
        assert_eq!(on.arguments[1], json!({ "x.com.samsung.da.options": ["Light_Off"] }));
        let off = translate_set_display_light(false);
        assert_eq!(off.arguments[1], json!({ "x.com.samsung.da.options": ["Light_On"] }));
    }

    #[test]
    fn mode_and_setpoint_commands_trigger_display_light_suppression() {
        assert!(changes_temperature_or_mode(&[translate_set_cooling_setpoint(70.0)]));
        assert!(changes_temperature_or_mode(&[translate_set_heating_setpoint(68.0)]));
        assert!(!changes_temperature_or_mode(&[switch_command(true)]));
    }

    #[test]
    fn display_light_on_from_status_inverts_the_vendor_token() {
        let reported_on: StatusResponse = serde_json::from_value(serde_json::json!({
            "components": {
                "main": {
                    "execute": { "data": { "value": ["mode/vs/0", { "x.com.samsung.da.options": ["Light_Off"] }] } }
                }
            }
        }))
        .unwrap();
        assert_eq!(display_light_on_from_status(&reported_on), Some(true));

        let reported_off: StatusResponse = serde_json::from_value(serde_json::json!({
            "components": {
                "main": {
                    "execute": { "data": { "value": ["mode/vs/0", { "x.com.samsung.da.options": ["Light_On"] }] } }
                }
            }
        }))
        .unwrap();
        assert_eq!(display_light_on_from_status(&reported_off), Some(false));
    }

    #[test]
    fn display_light_on_from_status_is_none_when_absent() {
        let status: StatusResponse = serde_json::from_value(serde_json::json!({ "components": { "main": {} } })).unwrap();
        assert_eq!(display_light_on_from_status(&status), None);
    }
}
