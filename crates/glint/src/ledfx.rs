use alloc::string::String;

use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Engine configuration, as an open `JSON` object.
pub type LedfxConfig = Map<String, Value>;

/// Device or effect schemas, as an open `JSON` object.
pub type LedfxSchema = Map<String, Value>;

/// Basic information about an engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct LedfxInfo {
    /// Engine address.
    pub url: String,
    /// Engine name.
    pub name: String,
    /// Engine version.
    pub version: String,
}

/// A device registered on an engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct LedfxDevice {
    /// Device identifier.
    pub id: String,
    /// Device name.
    pub name: String,
    /// Device type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Device configuration.
    pub config: Map<String, Value>,
    /// Whether the device is active.
    pub active: bool,
}

/// An effect registered on an engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct LedfxEffect {
    /// Effect identifier.
    pub id: String,
    /// Effect name.
    pub name: String,
    /// Effect configuration.
    pub config: Map<String, Value>,
    /// Whether the effect is active.
    pub active: bool,
}

/// Devices indexed by identifier.
pub type LedfxDevices = IndexMap<String, LedfxDevice, DefaultHashBuilder>;

/// Effects indexed by identifier.
pub type LedfxEffects = IndexMap<String, LedfxEffect, DefaultHashBuilder>;

/// A partial description of a device or an effect, used to create or
/// update them.
///
/// Only the fields set through the builder methods are sent to an engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct LedfxUpdate {
    /// Identifier.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    /// Name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    /// Type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<String>,
    /// Configuration.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub config: Option<Map<String, Value>>,
    /// Whether it is active.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub active: Option<bool>,
}

impl LedfxUpdate {
    /// Creates an empty [`LedfxUpdate`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            id: None,
            name: None,
            kind: None,
            config: None,
            active: None,
        }
    }

    /// Sets the identifier.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the type.
    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Map<String, Value>) -> Self {
        self.config = Some(config);
        self
    }

    /// Activates or deactivates.
    #[must_use]
    pub const fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }
}

#[cfg(test)]
#[cfg(feature = "deserialize")]
mod tests {
    use serde_json::json;

    use crate::{deserialize, serialize};

    use super::{LedfxDevices, LedfxUpdate};

    #[test]
    fn devices_keep_order() {
        let devices: LedfxDevices = deserialize(json!({
            "strip-b": { "id": "strip-b", "name": "B", "type": "wled", "active": true },
            "strip-a": { "id": "strip-a", "name": "A", "type": "e131" },
        }));

        let ids: alloc::vec::Vec<&str> = devices.keys().map(alloc::string::String::as_str).collect();
        assert_eq!(ids, ["strip-b", "strip-a"]);
        assert_eq!(devices["strip-a"].kind, "e131");
        assert!(!devices["strip-a"].active);
    }

    #[test]
    fn serialize_update() {
        assert_eq!(serialize(LedfxUpdate::new()), json!({}));
        assert_eq!(
            serialize(LedfxUpdate::new().name("Hole 3").kind("wled").active(true)),
            json!({ "name": "Hole 3", "type": "wled", "active": true })
        );
    }
}
