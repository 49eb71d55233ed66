use glint::ledfx::{
    LedfxConfig, LedfxDevice, LedfxDevices, LedfxEffect, LedfxEffects, LedfxInfo, LedfxSchema,
    LedfxUpdate,
};

use serde::Deserialize;
use serde_json::Value;

use tracing::warn;

use crate::client::{ApiClient, Service, invalid_input};
use crate::error::Result;
use crate::transport::{HttpTransport, Transport};

#[derive(Deserialize)]
struct DevicesBody {
    #[serde(default)]
    devices: LedfxDevices,
}

#[derive(Deserialize)]
struct EffectsBody {
    #[serde(default)]
    effects: LedfxEffects,
}

fn item_endpoint(collection: &str, id: &str) -> Result<String> {
    if id.trim().is_empty() {
        return Err(invalid_input("The identifier is empty"));
    }
    Ok(format!("/api/{collection}/{id}"))
}

/// A client for the `REST` API of an `LEDfx` engine.
pub struct LedfxClient<T = HttpTransport> {
    api: ApiClient<T>,
}

impl<T> Clone for LedfxClient<T> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
        }
    }
}

impl<T> std::fmt::Debug for LedfxClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedfxClient").field("api", &self.api).finish()
    }
}

impl<T: Transport> LedfxClient<T> {
    /// Creates a [`LedfxClient`].
    #[must_use]
    pub const fn new(api: ApiClient<T>) -> Self {
        Self { api }
    }

    /// Returns the underlying [`ApiClient`].
    #[must_use]
    pub const fn api(&self) -> &ApiClient<T> {
        &self.api
    }

    /// Retrieves the engine information.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn info(&self) -> Result<LedfxInfo> {
        self.api.get("/api/info").await
    }

    /// Retrieves the engine configuration.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn config(&self) -> Result<LedfxConfig> {
        self.api.get("/api/config").await
    }

    /// Retrieves the engine log, as plain text.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn logs(&self) -> Result<String> {
        self.api.text("/api/log").await
    }

    /// Retrieves the configuration schemas of the supported device types.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn device_schemas(&self) -> Result<LedfxSchema> {
        self.api.get("/api/schema/devices").await
    }

    /// Retrieves the configuration schemas of the supported effect types.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn effect_schemas(&self) -> Result<LedfxSchema> {
        self.api.get("/api/schema/effects").await
    }

    /// Retrieves the registered devices.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn devices(&self) -> Result<LedfxDevices> {
        let body: DevicesBody = self.api.get("/api/devices").await?;
        Ok(body.devices)
    }

    /// Retrieves a device.
    ///
    /// # Errors
    ///
    /// An [`crate::error::ErrorKind::InvalidInput`] error is returned for an
    /// empty identifier, otherwise any error of the [`ApiClient`].
    pub async fn device(&self, id: &str) -> Result<LedfxDevice> {
        self.api.get(&item_endpoint("devices", id)?).await
    }

    /// Registers a device.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn add_device(&self, device: &LedfxUpdate) -> Result<LedfxDevice> {
        self.api.post("/api/devices", device).await
    }

    /// Updates a device.
    ///
    /// # Errors
    ///
    /// The same errors as [`Self::device`].
    pub async fn update_device(&self, id: &str, update: &LedfxUpdate) -> Result<LedfxDevice> {
        self.api.put(&item_endpoint("devices", id)?, update).await
    }

    /// Removes a device.
    ///
    /// # Errors
    ///
    /// The same errors as [`Self::device`].
    pub async fn delete_device(&self, id: &str) -> Result<()> {
        let _: Value = self.api.delete(&item_endpoint("devices", id)?).await?;
        Ok(())
    }

    /// Retrieves the registered effects.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn effects(&self) -> Result<LedfxEffects> {
        let body: EffectsBody = self.api.get("/api/effects").await?;
        Ok(body.effects)
    }

    /// Retrieves an effect.
    ///
    /// # Errors
    ///
    /// The same errors as [`Self::device`].
    pub async fn effect(&self, id: &str) -> Result<LedfxEffect> {
        self.api.get(&item_endpoint("effects", id)?).await
    }

    /// Creates an effect.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn create_effect(&self, effect: &LedfxUpdate) -> Result<LedfxEffect> {
        self.api.post("/api/effects", effect).await
    }

    /// Updates an effect.
    ///
    /// # Errors
    ///
    /// The same errors as [`Self::device`].
    pub async fn update_effect(&self, id: &str, update: &LedfxUpdate) -> Result<LedfxEffect> {
        self.api.put(&item_endpoint("effects", id)?, update).await
    }

    /// Removes an effect.
    ///
    /// # Errors
    ///
    /// The same errors as [`Self::device`].
    pub async fn delete_effect(&self, id: &str) -> Result<()> {
        let _: Value = self.api.delete(&item_endpoint("effects", id)?).await?;
        Ok(())
    }
}

impl<T: Transport> Service for LedfxClient<T> {
    fn name(&self) -> &'static str {
        "LEDfx"
    }

    async fn ping(&self) -> bool {
        match self.info().await {
            Ok(_) => true,
            Err(e) => {
                warn!("LEDfx ping to {} failed: {e}", self.api.device());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use glint::ledfx::LedfxUpdate;

    use serde_json::{Map, json};

    use serial_test::serial;

    use glint_mock::MockLedfx;

    use crate::client::{ApiClient, Service};
    use crate::config::{SchedulerConfig, TransportConfig};
    use crate::error::ErrorKind;
    use crate::scheduler::Scheduler;
    use crate::transport::HttpTransport;

    use super::LedfxClient;

    fn client(url: &str) -> LedfxClient {
        let transport =
            HttpTransport::new(TransportConfig::new().timeout(Duration::from_secs(10))).unwrap();
        let scheduler = Scheduler::new(Arc::new(transport), SchedulerConfig::new());
        LedfxClient::new(ApiClient::new(url, scheduler).unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn engine_information() {
        let engine = MockLedfx::new().spawn().await.unwrap();
        let client = client(&engine.url());

        assert_eq!(client.name(), "LEDfx");
        assert!(client.ping().await);
        assert_eq!(client.info().await.unwrap().name, "LedFx");
        assert_eq!(client.config().await.unwrap()["port"], 8888);
        assert!(client.logs().await.unwrap().contains("Started webinterface"));
        assert!(client.device_schemas().await.unwrap().contains_key("wled"));
        assert!(client.effect_schemas().await.unwrap().contains_key("rainbow"));

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn devices_lifecycle() {
        let engine = MockLedfx::new().spawn().await.unwrap();
        let client = client(&engine.url());

        assert!(client.devices().await.unwrap().is_empty());

        let mut config = Map::new();
        let _ = config.insert("ip_address".into(), json!("10.0.0.5"));
        let device = client
            .add_device(&LedfxUpdate::new().name("Hole 1").kind("wled").config(config))
            .await
            .unwrap();
        assert_eq!(device.id, "hole-1");

        let device = client
            .update_device("hole-1", &LedfxUpdate::new().active(true))
            .await
            .unwrap();
        assert!(device.active);
        assert_eq!(device.config["ip_address"], "10.0.0.5");

        let devices = client.devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices["hole-1"].kind, "wled");

        client.delete_device("hole-1").await.unwrap();
        let error = client.device("hole-1").await.unwrap_err();
        assert_eq!(error.status(), Some(404));

        let error = client.device("").await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidInput);

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn devices_keep_engine_order() {
        let engine = MockLedfx::new().spawn().await.unwrap();
        let client = client(&engine.url());

        for id in ["strip-b", "strip-a", "strip-c"] {
            let _ = client
                .add_device(&LedfxUpdate::new().id(id).kind("wled"))
                .await
                .unwrap();
        }

        let devices = client.devices().await.unwrap();
        let ids: Vec<_> = devices.keys().map(String::as_str).collect();
        assert_eq!(ids, ["strip-b", "strip-a", "strip-c"]);

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn effects_lifecycle() {
        let engine = MockLedfx::new().spawn().await.unwrap();
        let client = client(&engine.url());

        let effect = client
            .create_effect(&LedfxUpdate::new().id("rainbow").name("Rainbow"))
            .await
            .unwrap();
        assert_eq!(effect.id, "rainbow");

        let effect = client
            .update_effect("rainbow", &LedfxUpdate::new().active(true))
            .await
            .unwrap();
        assert!(effect.active);
        assert_eq!(client.effect("rainbow").await.unwrap().name, "Rainbow");
        assert_eq!(client.effects().await.unwrap().len(), 1);

        client.delete_effect("rainbow").await.unwrap();
        assert!(client.effects().await.unwrap().is_empty());

        let error = client.delete_effect("rainbow").await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::HttpStatus);

        engine.shutdown().await;
    }
}
