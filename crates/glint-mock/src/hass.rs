use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Json, Path, Request, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};

use glint::hass::{
    API_RUNNING, HassApiResponse, HassConfig, HassService, HassServiceCall, HassState,
    HassStateUpdate, UnitSystem, entity_domain,
};

use serde_json::{Map, Value, json};

use crate::server::{MockServer, lock};

// Timestamp reported for every state change.
const TIMESTAMP: &str = "2024-06-01T12:00:00+00:00";

struct Hub {
    token: String,
    states: Mutex<Vec<HassState>>,
}

impl Hub {
    fn apply(&self, domain: &str, service: &str, call: &HassServiceCall) -> Vec<HassState> {
        let Some(ref entity_id) = call.entity_id else {
            return Vec::new();
        };

        let mut states = lock(&self.states);
        let Some(entity) = states
            .iter_mut()
            .find(|state| state.entity_id == *entity_id && state.domain() == domain)
        else {
            return Vec::new();
        };

        entity.state = match service {
            "turn_on" => "on".into(),
            "turn_off" => "off".into(),
            "toggle" if entity.state == "on" => "off".into(),
            "toggle" => "on".into(),
            _ => return Vec::new(),
        };
        entity
            .attributes
            .extend(call.data.iter().map(|(name, value)| (name.clone(), value.clone())));
        entity.last_changed = TIMESTAMP.into();
        entity.last_updated = TIMESTAMP.into();

        vec![entity.clone()]
    }
}

fn state(entity_id: &str, value: &str) -> HassState {
    HassState {
        entity_id: entity_id.into(),
        state: value.into(),
        attributes: Map::new(),
        last_changed: TIMESTAMP.into(),
        last_updated: TIMESTAMP.into(),
    }
}

/// An emulated `Home Assistant` hub.
///
/// Every request must carry the configured token as a bearer token, unless
/// the token is empty.
#[derive(Debug, Clone)]
pub struct MockHomeAssistant {
    token: String,
    states: Vec<HassState>,
}

impl MockHomeAssistant {
    /// Creates a [`MockHomeAssistant`] accepting the given token.
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self {
            token: token.into(),
            states: Vec::new(),
        }
    }

    /// Adds an entity with its initial state.
    #[must_use]
    pub fn entity(mut self, entity_id: &str, value: &str) -> Self {
        self.states.push(state(entity_id, value));
        self
    }

    /// Starts the hub.
    ///
    /// # Errors
    ///
    /// An error is returned when no loopback port can be bound.
    pub async fn spawn(self) -> std::io::Result<MockServer> {
        MockServer::serve(self.router()).await
    }

    fn router(self) -> Router {
        let hub = Arc::new(Hub {
            token: self.token,
            states: Mutex::new(self.states),
        });

        Router::new()
            .route("/api/", get(running))
            .route("/api/config", get(config))
            .route("/api/states", get(states))
            .route("/api/states/{entity_id}", get(entity).post(set_entity))
            .route("/api/services", get(services))
            .route("/api/services/{domain}/{service}", post(call_service))
            .layer(middleware::from_fn_with_state(Arc::clone(&hub), authorize))
            .with_state(hub)
    }
}

async fn authorize(State(hub): State<Arc<Hub>>, request: Request, next: Next) -> Response {
    if hub.token.is_empty() {
        return next.run(request).await;
    }

    let expected = format!("Bearer {}", hub.token);
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .is_some_and(|value| value.as_bytes() == expected.as_bytes());

    if authorized {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid authentication" })),
        )
            .into_response()
    }
}

async fn running() -> Json<HassApiResponse> {
    Json(HassApiResponse {
        message: API_RUNNING.into(),
    })
}

async fn config() -> Json<HassConfig> {
    Json(HassConfig {
        components: vec!["light".into(), "switch".into(), "sensor".into()],
        config_dir: "/config".into(),
        location_name: "Minigolf".into(),
        time_zone: "Europe/Rome".into(),
        unit_system: UnitSystem {
            length: "km".into(),
            mass: "g".into(),
            temperature: "°C".into(),
            volume: "L".into(),
        },
        version: "2024.6.0".into(),
        ..HassConfig::default()
    })
}

async fn states(State(hub): State<Arc<Hub>>) -> Json<Vec<HassState>> {
    Json(lock(&hub.states).clone())
}

async fn entity(
    State(hub): State<Arc<Hub>>,
    Path(entity_id): Path<String>,
) -> Result<Json<HassState>, StatusCode> {
    lock(&hub.states)
        .iter()
        .find(|state| state.entity_id == entity_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn set_entity(
    State(hub): State<Arc<Hub>>,
    Path(entity_id): Path<String>,
    Json(update): Json<HassStateUpdate>,
) -> Json<HassState> {
    let mut states = lock(&hub.states);

    let index = states
        .iter()
        .position(|state| state.entity_id == entity_id)
        .unwrap_or_else(|| {
            states.push(state(&entity_id, ""));
            states.len() - 1
        });

    let entity = &mut states[index];
    entity.state = update.state;
    entity.attributes = update.attributes;
    entity.last_updated = TIMESTAMP.into();

    Json(entity.clone())
}

async fn services(State(hub): State<Arc<Hub>>) -> Json<Vec<HassService>> {
    let mut domains: Vec<String> = lock(&hub.states)
        .iter()
        .map(|state| state.domain().to_string())
        .collect();
    domains.sort();
    domains.dedup();

    Json(
        domains
            .into_iter()
            .map(|domain| {
                let services = ["turn_on", "turn_off", "toggle"]
                    .into_iter()
                    .map(|service| (service.to_string(), Value::Object(Map::new())))
                    .collect();
                HassService { domain, services }
            })
            .collect(),
    )
}

async fn call_service(
    State(hub): State<Arc<Hub>>,
    Path((domain, service)): Path<(String, String)>,
    Json(call): Json<HassServiceCall>,
) -> Json<Vec<HassState>> {
    let domain = call
        .entity_id
        .as_deref()
        .map_or(domain.as_str(), |entity_id| {
            // `homeassistant` services target entities of any domain.
            if domain == "homeassistant" {
                entity_domain(entity_id)
            } else {
                domain.as_str()
            }
        });
    Json(hub.apply(domain, &service, &call))
}
