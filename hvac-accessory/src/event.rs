//! Accessory-protocol event and proposed-state types (spec §4.4, §9).
//! Hook chains return a [`HookOutcome`] rather than a nullable so
//! cancellation is explicit in the type rather than a `None` a reader
//! has to guess the meaning of.

use hvac_core::model::{DeviceId, OperatingMode};

/// A user-intent event emitted by the accessory protocol when someone
/// changes a thermostat's mode or setpoint from the local controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatEvent {
    pub device_id: DeviceId,
    pub mode: Option<OperatingMode>,
    pub heating_setpoint_f: Option<f64>,
    pub cooling_setpoint_f: Option<f64>,
}

/// The coordinator's working draft of a device's next state, built from
/// a [`ThermostatEvent`] (upstream) or a cloud status poll (downstream),
/// and threaded through the plugin hook chain before being committed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProposedState {
    pub mode: Option<OperatingMode>,
    pub heating_setpoint_f: Option<f64>,
    pub cooling_setpoint_f: Option<f64>,
}

/// Outcome of one hook in a `beforeSetSmartThingsState`/`beforeSetHomeKitState`
/// chain: either the (possibly rewritten) proposed state, or an explicit
/// cancellation that aborts the write.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    Modified(ProposedState),
    Cancel,
}
