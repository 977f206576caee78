//! Wire types for the cloud REST surface (spec §6). These are
//! deliberately permissive (lots of `Option`) because the cloud's
//! capability model is weakly typed — unknown or absent fields are
//! simply not used rather than rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentWire {
    #[serde(default)]
    pub capabilities: Vec<CapabilityRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceWire {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "manufacturerName")]
    pub manufacturer_name: Option<String>,
    /// Present on some vendors' devices; empty on most, in which case
    /// capabilities live only under `components` (spec §4.3 extraction rule).
    #[serde(default)]
    pub capabilities: Vec<CapabilityRef>,
    #[serde(default)]
    pub components: Vec<ComponentWire>,
}

impl DeviceWire {
    pub fn display_name(&self) -> String {
        self.label.clone().or_else(|| self.name.clone()).unwrap_or_else(|| self.device_id.clone())
    }

    pub fn top_level_capability_ids(&self) -> Vec<String> {
        self.capabilities.iter().map(|c| c.id.clone()).collect()
    }

    pub fn component_capability_ids(&self) -> Vec<Vec<String>> {
        self.components.iter().map(|c| c.capabilities.iter().map(|cap| cap.id.clone()).collect()).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceListResponse {
    #[serde(default)]
    pub items: Vec<DeviceWire>,
}

/// A single capability attribute's reported value, e.g.
/// `{"temperature": {"value": 72.0, "unit": "F"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeValue {
    #[serde(default)]
    pub value: serde_json::Value,
}

pub type CapabilityStatus = BTreeMap<String, AttributeValue>;

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub components: BTreeMap<String, BTreeMap<String, CapabilityStatus>>,
}

impl StatusResponse {
    fn main(&self) -> Option<&BTreeMap<String, CapabilityStatus>> {
        self.components.get("main").or_else(|| self.components.values().next())
    }

    pub fn attribute_f64(&self, capability: &str, attribute: &str) -> Option<f64> {
        self.main()?.get(capability)?.get(attribute)?.value.as_f64()
    }

    pub fn attribute_str(&self, capability: &str, attribute: &str) -> Option<String> {
        self.main()?.get(capability)?.get(attribute)?.value.as_str().map(str::to_string)
    }

    pub fn attribute_value(&self, capability: &str, attribute: &str) -> Option<&serde_json::Value> {
        Some(&self.main()?.get(capability)?.get(attribute)?.value)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CloudCommand {
    pub component: String,
    pub capability: String,
    pub command: String,
    pub arguments: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandsRequest {
    pub commands: Vec<CloudCommand>,
}
