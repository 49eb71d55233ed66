use glint::hass::{
    API_RUNNING, HassApiResponse, HassConfig, HassService, HassServiceCall, HassState,
    HassStateUpdate, entity_domain,
};

use serde_json::{Map, Value};

use tracing::warn;

use crate::client::{ApiClient, Service, invalid_input};
use crate::error::Result;
use crate::transport::{HttpTransport, Transport};

fn entity_endpoint(entity_id: &str) -> Result<String> {
    if entity_id.trim().is_empty() {
        return Err(invalid_input("The entity identifier is empty"));
    }
    Ok(format!("/api/states/{entity_id}"))
}

/// A client for the `REST` API of a `Home Assistant` hub.
pub struct HomeAssistantClient<T = HttpTransport> {
    api: ApiClient<T>,
}

impl<T> Clone for HomeAssistantClient<T> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
        }
    }
}

impl<T> std::fmt::Debug for HomeAssistantClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeAssistantClient")
            .field("api", &self.api)
            .finish()
    }
}

impl<T: Transport> HomeAssistantClient<T> {
    /// Creates a [`HomeAssistantClient`] authenticating with a long-lived
    /// access token.
    ///
    /// An empty token is accepted, but most requests are then refused by the
    /// hub.
    #[must_use]
    pub fn new(api: ApiClient<T>, token: &str) -> Self {
        if token.is_empty() {
            warn!("Home Assistant token not provided, some requests may fail");
            return Self { api };
        }

        Self {
            api: api.header("Authorization", format!("Bearer {token}")),
        }
    }

    /// Returns the underlying [`ApiClient`].
    #[must_use]
    pub const fn api(&self) -> &ApiClient<T> {
        &self.api
    }

    /// Retrieves the hub configuration.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn config(&self) -> Result<HassConfig> {
        self.api.get("/api/config").await
    }

    /// Retrieves the states of all entities.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn states(&self) -> Result<Vec<HassState>> {
        self.api.get("/api/states").await
    }

    /// Retrieves the state of an entity.
    ///
    /// # Errors
    ///
    /// An [`crate::error::ErrorKind::InvalidInput`] error is returned for an
    /// empty entity identifier, otherwise any error of the [`ApiClient`].
    pub async fn state(&self, entity_id: &str) -> Result<HassState> {
        self.api.get(&entity_endpoint(entity_id)?).await
    }

    /// Sets the state of an entity, creating it when missing.
    ///
    /// # Errors
    ///
    /// The same errors as [`Self::state`].
    pub async fn set_state(
        &self,
        entity_id: &str,
        state: &str,
        attributes: Option<Map<String, Value>>,
    ) -> Result<HassState> {
        let update = HassStateUpdate {
            state: state.into(),
            attributes: attributes.unwrap_or_default(),
        };
        self.api.post(&entity_endpoint(entity_id)?, &update).await
    }

    /// Retrieves the services available on the hub.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn services(&self) -> Result<Vec<HassService>> {
        self.api.get("/api/services").await
    }

    /// Calls a service and returns the states changed by the call.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        call: &HassServiceCall,
    ) -> Result<Vec<HassState>> {
        self.api
            .post(&format!("/api/services/{domain}/{service}"), call)
            .await
    }

    /// Turns on an entity, with optional service data.
    ///
    /// The service domain is the domain of the entity.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn turn_on(
        &self,
        entity_id: &str,
        data: Option<Map<String, Value>>,
    ) -> Result<Vec<HassState>> {
        let call = HassServiceCall::entity(entity_id).fields(data.unwrap_or_default());
        self.call_service(entity_domain(entity_id), "turn_on", &call)
            .await
    }

    /// Turns off an entity.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn turn_off(&self, entity_id: &str) -> Result<Vec<HassState>> {
        self.call_service(
            entity_domain(entity_id),
            "turn_off",
            &HassServiceCall::entity(entity_id),
        )
        .await
    }

    /// Toggles an entity.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn toggle(&self, entity_id: &str) -> Result<Vec<HassState>> {
        self.call_service(
            entity_domain(entity_id),
            "toggle",
            &HassServiceCall::entity(entity_id),
        )
        .await
    }

    /// Turns on a light with the given brightness, clamped into `0..=255`.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn set_light_brightness(
        &self,
        entity_id: &str,
        brightness: i32,
    ) -> Result<Vec<HassState>> {
        let call = HassServiceCall::entity(entity_id).field("brightness", brightness.clamp(0, 255));
        self.call_service("light", "turn_on", &call).await
    }

    /// Turns on a light with the given color.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn set_light_color(
        &self,
        entity_id: &str,
        r: u8,
        g: u8,
        b: u8,
    ) -> Result<Vec<HassState>> {
        let call = HassServiceCall::entity(entity_id).field("rgb_color", vec![r, g, b]);
        self.call_service("light", "turn_on", &call).await
    }

    /// Retrieves the states of the entities of a domain, such as `light` or
    /// `switch`.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn entities_by_domain(&self, domain: &str) -> Result<Vec<HassState>> {
        let mut states = self.states().await?;
        states.retain(|state| state.domain() == domain);
        Ok(states)
    }
}

impl<T: Transport> Service for HomeAssistantClient<T> {
    fn name(&self) -> &'static str {
        "Home Assistant"
    }

    async fn ping(&self) -> bool {
        match self.api.get::<HassApiResponse>("/api/").await {
            Ok(response) => response.message == API_RUNNING,
            Err(e) => {
                warn!("Home Assistant ping to {} failed: {e}", self.api.device());
                false
            }
        }
    }
}
