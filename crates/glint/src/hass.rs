use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;
use serde_json::{Map, Value};

/// The message a running hub answers on its root endpoint.
pub const API_RUNNING: &str = "API running.";

/// Units of measurement configured on a hub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct UnitSystem {
    /// Length unit.
    pub length: String,
    /// Mass unit.
    pub mass: String,
    /// Temperature unit.
    pub temperature: String,
    /// Volume unit.
    pub volume: String,
}

/// Hub configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct HassConfig {
    /// Loaded components.
    pub components: Vec<String>,
    /// Configuration directory.
    pub config_dir: String,
    /// Elevation, in meters.
    pub elevation: f64,
    /// Latitude.
    pub latitude: f64,
    /// Location name.
    pub location_name: String,
    /// Longitude.
    pub longitude: f64,
    /// Time zone.
    pub time_zone: String,
    /// Units of measurement.
    pub unit_system: UnitSystem,
    /// Hub version.
    pub version: String,
    /// Directories external integrations are allowed to access.
    pub whitelist_external_dirs: Vec<String>,
}

/// The state of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct HassState {
    /// Entity identifier, in the `domain.object_id` form.
    pub entity_id: String,
    /// State value.
    pub state: String,
    /// State attributes.
    pub attributes: Map<String, Value>,
    /// Last time the state value changed.
    pub last_changed: String,
    /// Last time the state or its attributes changed.
    pub last_updated: String,
}

impl HassState {
    /// Returns the entity domain, the part of the identifier before the
    /// first `.`.
    #[must_use]
    pub fn domain(&self) -> &str {
        entity_domain(&self.entity_id)
    }
}

/// Returns the domain of an entity identifier.
#[must_use]
pub fn entity_domain(entity_id: &str) -> &str {
    entity_id
        .split_once('.')
        .map_or(entity_id, |(domain, _)| domain)
}

/// The services offered by a domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct HassService {
    /// Domain name.
    pub domain: String,
    /// Services, indexed by name.
    pub services: Map<String, Value>,
}

/// The data of a service call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct HassServiceCall {
    /// Target entity.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub entity_id: Option<String>,
    /// Additional service data.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl HassServiceCall {
    /// Creates a [`HassServiceCall`] targeting an entity.
    #[must_use]
    pub fn entity(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            data: Map::new(),
        }
    }

    /// Adds a service data field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.data.insert(name.into(), value.into());
        self
    }

    /// Merges service data fields.
    #[must_use]
    pub fn fields(mut self, data: Map<String, Value>) -> Self {
        self.data.extend(data);
        self
    }
}

/// A plain message answered by a hub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct HassApiResponse {
    /// Message.
    pub message: String,
}

/// The body used to set the state of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct HassStateUpdate {
    /// State value.
    pub state: String,
    /// State attributes.
    pub attributes: Map<String, Value>,
}

#[cfg(test)]
#[cfg(feature = "deserialize")]
mod tests {
    use serde_json::json;

    use crate::{deserialize, serialize};

    use super::{HassServiceCall, HassState, entity_domain};

    #[test]
    fn domains() {
        assert_eq!(entity_domain("light.hole_1"), "light");
        assert_eq!(entity_domain("switch.fan.extra"), "switch");
        assert_eq!(entity_domain("sun"), "sun");

        let state: HassState = deserialize(json!({
            "entity_id": "light.hole_2",
            "state": "on",
            "attributes": { "brightness": 128 },
        }));
        assert_eq!(state.domain(), "light");
        assert_eq!(state.attributes["brightness"], json!(128));
        assert!(state.last_changed.is_empty());
    }

    #[test]
    fn service_call_flattening() {
        let call = HassServiceCall::entity("light.hole_1")
            .field("brightness", 255)
            .field("rgb_color", json!([1, 2, 3]));

        assert_eq!(
            serialize(call),
            json!({
                "entity_id": "light.hole_1",
                "brightness": 255,
                "rgb_color": [1, 2, 3],
            })
        );

        assert_eq!(serialize(HassServiceCall::default()), json!({}));
    }
}
