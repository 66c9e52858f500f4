//! Device records tracked by the mock

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Category;

/// Per-device attribute map (power, mode, level, humidity, ...)
pub type Attributes = Map<String, Value>;

/// A device known to the mock
///
/// Records are created when the device list is generated and are never
/// removed. `category` is assigned once from the model and never changes;
/// only `attributes` are mutated, and only by successful control operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub uuid: String,
    pub cid: String,
    pub model: String,
    pub config_module: String,
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub attributes: Attributes,
}

impl DeviceRecord {
    /// Identity values a response template may reference by name.
    ///
    /// Names follow the vendor's JSON keys, so `{deviceType}` and `{type}`
    /// both resolve to the model.
    pub fn identity(&self, key: &str) -> Option<Value> {
        let value = match key {
            "uuid" => &self.uuid,
            "cid" => &self.cid,
            "model" | "deviceType" | "type" => &self.model,
            "configModule" => &self.config_module,
            "deviceName" => &self.name,
            _ => return None,
        };
        Some(Value::String(value.clone()))
    }

    /// Whether an identifier from a request (uuid or cid) names this device
    pub fn is_identified_by(&self, id: &str) -> bool {
        self.uuid == id || self.cid == id
    }
}
