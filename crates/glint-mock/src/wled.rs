use std::sync::{Arc, Mutex};

use axum::extract::{Json, State};
use axum::routing::get;
use axum::Router;

use glint::wled::{
    EFFECTS_ENDPOINT, INFO_ENDPOINT, Leds, PALETTES_ENDPOINT, STATE_ENDPOINT, STATUS_ENDPOINT,
    Segment, StateUpdate, WledFullStatus, WledInfo, WledState,
};

use crate::server::{MockServer, lock};

const LED_COUNT: u16 = 30;

const DEFAULT_EFFECTS: &[&str] = &["Solid", "Blink", "Breathe", "Wipe", "Rainbow"];

const DEFAULT_PALETTES: &[&str] = &["Default", "Party", "Ocean", "Lava"];

struct Device {
    info: WledInfo,
    state: Mutex<WledState>,
    effects: Vec<String>,
    palettes: Vec<String>,
}

/// An emulated `WLED` device.
///
/// The device drives a single segment and starts switched on at half
/// brightness with the `Solid` effect.
#[derive(Debug, Clone)]
pub struct MockWled {
    name: String,
    effects: Vec<String>,
    palettes: Vec<String>,
}

impl MockWled {
    /// Creates a [`MockWled`] with the given name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            effects: DEFAULT_EFFECTS.iter().map(|&effect| effect.into()).collect(),
            palettes: DEFAULT_PALETTES.iter().map(|&palette| palette.into()).collect(),
        }
    }

    /// Replaces the effect names.
    #[must_use]
    pub fn effects(mut self, effects: &[&str]) -> Self {
        self.effects = effects.iter().map(|&effect| effect.into()).collect();
        self
    }

    /// Replaces the palette names.
    #[must_use]
    pub fn palettes(mut self, palettes: &[&str]) -> Self {
        self.palettes = palettes.iter().map(|&palette| palette.into()).collect();
        self
    }

    /// Starts the device.
    ///
    /// # Errors
    ///
    /// An error is returned when no loopback port can be bound.
    pub async fn spawn(self) -> std::io::Result<MockServer> {
        MockServer::serve(self.router()).await
    }

    fn router(self) -> Router {
        let info = WledInfo {
            version: "0.14.4".into(),
            build: 2_405_180,
            leds: Leds {
                count: LED_COUNT,
                pins: vec![2],
                max_power: 850,
                max_segments: 16,
                ..Leds::default()
            },
            name: self.name,
            udp_port: 21324,
            effect_count: u16::try_from(self.effects.len()).unwrap_or(u16::MAX),
            palette_count: u16::try_from(self.palettes.len()).unwrap_or(u16::MAX),
            arch: "esp32".into(),
            brand: "WLED".into(),
            product: "FOSS".into(),
            mac: "a0b1c2d3e4f5".into(),
            ..WledInfo::default()
        };

        let state = WledState {
            on: true,
            brightness: 128,
            transition: 7,
            preset: -1,
            playlist: -1,
            segments: vec![Segment {
                id: 0,
                start: 0,
                stop: LED_COUNT,
                len: LED_COUNT,
                colors: vec![vec![255, 160, 0], vec![0, 0, 0], vec![0, 0, 0]],
                speed: 128,
                intensity: 128,
                selected: true,
                on: true,
                brightness: 255,
                ..Segment::default()
            }],
        };

        let device = Arc::new(Device {
            info,
            state: Mutex::new(state),
            effects: self.effects,
            palettes: self.palettes,
        });

        Router::new()
            .route(INFO_ENDPOINT, get(info_handler))
            .route(STATE_ENDPOINT, get(state_handler).post(update_handler))
            .route(STATUS_ENDPOINT, get(status_handler))
            .route(EFFECTS_ENDPOINT, get(effects_handler))
            .route(PALETTES_ENDPOINT, get(palettes_handler))
            .with_state(device)
    }
}

async fn info_handler(State(device): State<Arc<Device>>) -> Json<WledInfo> {
    Json(device.info.clone())
}

async fn state_handler(State(device): State<Arc<Device>>) -> Json<WledState> {
    Json(lock(&device.state).clone())
}

async fn update_handler(
    State(device): State<Arc<Device>>,
    Json(update): Json<StateUpdate>,
) -> Json<WledState> {
    let mut state = lock(&device.state);
    update.apply(&mut state);
    Json(state.clone())
}

async fn status_handler(State(device): State<Arc<Device>>) -> Json<WledFullStatus> {
    Json(WledFullStatus {
        state: lock(&device.state).clone(),
        info: device.info.clone(),
        effects: device.effects.clone(),
        palettes: device.palettes.clone(),
    })
}

async fn effects_handler(State(device): State<Arc<Device>>) -> Json<Vec<String>> {
    Json(device.effects.clone())
}

async fn palettes_handler(State(device): State<Arc<Device>>) -> Json<Vec<String>> {
    Json(device.palettes.clone())
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::MockWled;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn state_changes_persist() {
        let device = MockWled::new("Hole 3").spawn().await.unwrap();
        let client = reqwest::Client::new();

        let state: Value = client
            .post(format!("{}/json/state", device.url()))
            .json(&json!({ "bri": 40, "seg": [{ "id": 0, "fx": 4 }] }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(state["bri"], 40);
        assert_eq!(state["seg"][0]["fx"], 4);

        let state: Value = client
            .get(format!("{}/json/state", device.url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(state["bri"], 40);

        let info: Value = client
            .get(format!("{}/json/info", device.url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(info["name"], "Hole 3");
        assert_eq!(info["fxcount"], 5);

        assert_eq!(device.request_count("/json/state"), 2);
        assert_eq!(device.requests()[0].body, Some(json!({ "bri": 40, "seg": [{ "id": 0, "fx": 4 }] })));

        device.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failure_injection() {
        let device = MockWled::new("Hole 3").spawn().await.unwrap();
        let client = reqwest::Client::new();

        device.fail_with(Some(503));
        let response = client
            .get(format!("{}/json/eff", device.url()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 503);

        device.fail_with(None);
        let effects: Vec<String> = client
            .get(format!("{}/json/eff", device.url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(effects[0], "Solid");

        assert_eq!(device.in_flight(), 0);
        assert_eq!(device.max_in_flight(), 1);

        device.shutdown().await;
    }
}
