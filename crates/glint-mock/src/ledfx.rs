use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::routing::get;

use glint::ledfx::{
    LedfxConfig, LedfxDevice, LedfxDevices, LedfxEffect, LedfxEffects, LedfxInfo, LedfxSchema,
    LedfxUpdate,
};

use serde_json::{Map, Value, json};

use crate::server::{MockServer, lock};

const LOG: &str = "INFO ledfx.core: Started webinterface\nINFO ledfx.devices: Loaded 0 devices\n";

struct Engine {
    address: String,
    devices: Mutex<LedfxDevices>,
    effects: Mutex<LedfxEffects>,
}

// Derives an identifier from a name, as the engine does.
fn slug(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

fn schema(kinds: &[&str]) -> LedfxSchema {
    kinds
        .iter()
        .map(|&kind| {
            (
                kind.to_string(),
                json!({ "schema": { "type": "object", "properties": {} } }),
            )
        })
        .collect()
}

fn identifier(update: &LedfxUpdate) -> Option<String> {
    update
        .id
        .clone()
        .or_else(|| update.name.as_deref().map(slug))
        .filter(|id| !id.is_empty())
}

fn merge_device(device: &mut LedfxDevice, update: LedfxUpdate) {
    if let Some(name) = update.name {
        device.name = name;
    }
    if let Some(kind) = update.kind {
        device.kind = kind;
    }
    if let Some(config) = update.config {
        device.config.extend(config);
    }
    if let Some(active) = update.active {
        device.active = active;
    }
}

fn merge_effect(effect: &mut LedfxEffect, update: LedfxUpdate) {
    if let Some(name) = update.name {
        effect.name = name;
    }
    if let Some(config) = update.config {
        effect.config.extend(config);
    }
    if let Some(active) = update.active {
        effect.active = active;
    }
}

/// An emulated `LEDfx` engine.
///
/// The engine starts without devices and effects.
#[derive(Debug, Clone, Default)]
pub struct MockLedfx;

impl MockLedfx {
    /// Creates a [`MockLedfx`].
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Starts the engine.
    ///
    /// # Errors
    ///
    /// An error is returned when no loopback port can be bound.
    pub async fn spawn(self) -> std::io::Result<MockServer> {
        let engine = Arc::new(Engine {
            address: "http://127.0.0.1".into(),
            devices: Mutex::new(LedfxDevices::default()),
            effects: Mutex::new(LedfxEffects::default()),
        });

        let router = Router::new()
            .route("/api/info", get(info))
            .route("/api/config", get(config))
            .route("/api/log", get(log))
            .route("/api/schema/devices", get(device_schemas))
            .route("/api/schema/effects", get(effect_schemas))
            .route("/api/devices", get(devices).post(add_device))
            .route(
                "/api/devices/{id}",
                get(device).put(update_device).delete(delete_device),
            )
            .route("/api/effects", get(effects).post(create_effect))
            .route(
                "/api/effects/{id}",
                get(effect).put(update_effect).delete(delete_effect),
            )
            .with_state(engine);

        MockServer::serve(router).await
    }
}

async fn info(State(engine): State<Arc<Engine>>) -> Json<LedfxInfo> {
    Json(LedfxInfo {
        url: engine.address.clone(),
        name: "LedFx".into(),
        version: "2.0.99".into(),
    })
}

async fn config() -> Json<LedfxConfig> {
    let mut config = Map::new();
    let _ = config.insert("host".into(), Value::from("0.0.0.0"));
    let _ = config.insert("port".into(), Value::from(8888));
    let _ = config.insert("dev_mode".into(), Value::from(false));
    Json(config)
}

async fn log() -> &'static str {
    LOG
}

async fn device_schemas() -> Json<LedfxSchema> {
    Json(schema(&["wled", "e131", "udp"]))
}

async fn effect_schemas() -> Json<LedfxSchema> {
    Json(schema(&["rainbow", "energy", "scroll"]))
}

async fn devices(State(engine): State<Arc<Engine>>) -> Json<Value> {
    Json(json!({ "devices": *lock(&engine.devices) }))
}

async fn add_device(
    State(engine): State<Arc<Engine>>,
    Json(update): Json<LedfxUpdate>,
) -> Result<Json<LedfxDevice>, StatusCode> {
    let id = identifier(&update).ok_or(StatusCode::BAD_REQUEST)?;

    let mut device = LedfxDevice {
        id: id.clone(),
        name: id.clone(),
        kind: "wled".into(),
        config: Map::new(),
        active: false,
    };
    merge_device(&mut device, update);

    let _ = lock(&engine.devices).insert(id, device.clone());
    Ok(Json(device))
}

async fn device(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
) -> Result<Json<LedfxDevice>, StatusCode> {
    lock(&engine.devices)
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_device(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
    Json(update): Json<LedfxUpdate>,
) -> Result<Json<LedfxDevice>, StatusCode> {
    let mut devices = lock(&engine.devices);
    let device = devices.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    merge_device(device, update);
    Ok(Json(device.clone()))
}

async fn delete_device(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    lock(&engine.devices)
        .shift_remove(&id)
        .map(|_| Json(json!({ "status": "success" })))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn effects(State(engine): State<Arc<Engine>>) -> Json<Value> {
    Json(json!({ "effects": *lock(&engine.effects) }))
}

async fn create_effect(
    State(engine): State<Arc<Engine>>,
    Json(update): Json<LedfxUpdate>,
) -> Result<Json<LedfxEffect>, StatusCode> {
    let id = identifier(&update).ok_or(StatusCode::BAD_REQUEST)?;

    let mut effect = LedfxEffect {
        id: id.clone(),
        name: id.clone(),
        config: Map::new(),
        active: false,
    };
    merge_effect(&mut effect, update);

    let _ = lock(&engine.effects).insert(id, effect.clone());
    Ok(Json(effect))
}

async fn effect(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
) -> Result<Json<LedfxEffect>, StatusCode> {
    lock(&engine.effects)
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_effect(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
    Json(update): Json<LedfxUpdate>,
) -> Result<Json<LedfxEffect>, StatusCode> {
    let mut effects = lock(&engine.effects);
    let effect = effects.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    merge_effect(effect, update);
    Ok(Json(effect.clone()))
}

async fn delete_effect(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    lock(&engine.effects)
        .shift_remove(&id)
        .map(|_| Json(json!({ "status": "success" })))
        .ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::slug;

    #[test]
    fn identifiers() {
        assert_eq!(slug("Hole 1 Strip"), "hole-1-strip");
        assert_eq!(slug("  wled  "), "wled");
    }
}
