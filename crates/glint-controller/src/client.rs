use std::borrow::Cow;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, ErrorKind, Result};
use crate::scheduler::Scheduler;
use crate::transport::{DeviceRequest, HttpTransport, ResponseFormat, Transport, device_key};

/// The outcome of a timed ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingReport {
    /// Whether the service answered.
    pub success: bool,
    /// The device key of the service.
    pub device: String,
    /// Time elapsed until the answer, when the service answered.
    pub response_time: Option<Duration>,
    /// A human-readable outcome.
    pub message: String,
}

/// A service reachable over `HTTP`.
pub trait Service {
    /// Returns the service name.
    fn name(&self) -> &'static str;

    /// Checks whether the service answers.
    ///
    /// Failures are logged and reported as `false`.
    fn ping(&self) -> impl Future<Output = bool> + Send;
}

pub(crate) fn invalid_input(info: impl Into<Cow<'static, str>>) -> Error {
    Error::new(ErrorKind::InvalidInput, info)
}

/// A client sending requests to the endpoints of a base `URL`.
///
/// Every request passes through the [`Scheduler`], queued under the device
/// key of the base `URL`. The response body is deserialized into the type
/// chosen by the caller.
pub struct ApiClient<T = HttpTransport> {
    base_url: String,
    device: String,
    headers: Vec<(String, String)>,
    scheduler: Scheduler<T>,
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            device: self.device.clone(),
            headers: self.headers.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ApiClient<T> {
    /// Creates an [`ApiClient`] for the given base `URL`.
    ///
    /// A trailing slash is removed from the base `URL`.
    ///
    /// # Errors
    ///
    /// An [`ErrorKind::InvalidInput`] error is returned when the base `URL`
    /// is empty or has no host.
    pub fn new(base_url: &str, scheduler: Scheduler<T>) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(invalid_input("The base url is empty"));
        }

        Ok(Self {
            base_url: base_url.into(),
            device: device_key(base_url)?,
            headers: Vec::new(),
            scheduler,
        })
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the base `URL`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the device key the requests are queued under.
    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the complete `URL` of an endpoint.
    #[must_use]
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    /// Sends a `GET` request to an endpoint.
    ///
    /// # Errors
    ///
    /// Any error of the transport, or an [`ErrorKind::JsonResponse`] error
    /// when the response does not match the expected type.
    pub async fn get<R: DeserializeOwned>(&self, endpoint: &str) -> Result<R> {
        self.send(DeviceRequest::get(self.url(endpoint))).await
    }

    /// Sends a `POST` request with a `JSON` body to an endpoint.
    ///
    /// # Errors
    ///
    /// Any error of the transport, or an [`ErrorKind::JsonResponse`] error
    /// when the body cannot be serialized or the response does not match the
    /// expected type.
    pub async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.send(DeviceRequest::post(self.url(endpoint)).body(body))
            .await
    }

    /// Sends a `PUT` request with a `JSON` body to an endpoint.
    ///
    /// # Errors
    ///
    /// The same errors as [`Self::post`].
    pub async fn put<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.send(DeviceRequest::put(self.url(endpoint)).body(body))
            .await
    }

    /// Sends a `DELETE` request to an endpoint.
    ///
    /// # Errors
    ///
    /// The same errors as [`Self::get`].
    pub async fn delete<R: DeserializeOwned>(&self, endpoint: &str) -> Result<R> {
        self.send(DeviceRequest::delete(self.url(endpoint))).await
    }

    /// Sends a `GET` request to an endpoint answering with plain text.
    ///
    /// # Errors
    ///
    /// Any error of the transport.
    pub async fn text(&self, endpoint: &str) -> Result<String> {
        self.send(DeviceRequest::get(self.url(endpoint)).format(ResponseFormat::Text))
            .await
    }

    /// Queues a request built by the caller and deserializes its response.
    ///
    /// The client headers are added to the request.
    ///
    /// # Errors
    ///
    /// The same errors as [`Self::get`].
    pub async fn send<R: DeserializeOwned>(&self, request: DeviceRequest) -> Result<R> {
        let request = self
            .headers
            .iter()
            .fold(request, |request, (name, value)| {
                request.header(name.as_str(), value.as_str())
            });

        let value: Value = self
            .scheduler
            .queue_request(self.device.as_str(), request)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the [`Scheduler`].
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler<T> {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde::Deserialize;
    use serde_json::{Value, json};

    use crate::config::SchedulerConfig;
    use crate::error::ErrorKind;
    use crate::scheduler::Scheduler;
    use crate::tests::FakeTransport;

    use super::ApiClient;

    fn client(base_url: &str) -> ApiClient<FakeTransport> {
        let transport = Arc::new(FakeTransport::new(Duration::from_millis(5)));
        ApiClient::new(base_url, Scheduler::new(transport, SchedulerConfig::new())).unwrap()
    }

    #[derive(Deserialize)]
    struct Echo {
        url: String,
    }

    #[test]
    fn base_url() {
        let transport = Arc::new(FakeTransport::new(Duration::ZERO));
        let scheduler = Scheduler::new(transport, SchedulerConfig::new());

        let client = ApiClient::new("http://10.0.0.5:8080/", scheduler.clone()).unwrap();
        assert_eq!(client.base_url(), "http://10.0.0.5:8080");
        assert_eq!(client.device(), "10.0.0.5:8080");
        assert_eq!(client.url("/json/info"), "http://10.0.0.5:8080/json/info");

        assert_eq!(
            ApiClient::new("  ", scheduler.clone()).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            ApiClient::new("10.0.0.5", scheduler).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[tokio::test(start_paused = true)]
    async fn typed_responses() {
        let client = client("http://10.0.0.5");

        let echo: Echo = client.get("/json/info").await.unwrap();
        assert_eq!(echo.url, "http://10.0.0.5/json/info");

        let echo: Value = client.post("/json/state", &json!({ "on": true })).await.unwrap();
        assert_eq!(echo, json!({ "url": "http://10.0.0.5/json/state" }));

        let echo: Value = client.put("/api/devices/a", &json!({})).await.unwrap();
        assert_eq!(echo["url"], "http://10.0.0.5/api/devices/a");

        let echo: Value = client.delete("/api/devices/a").await.unwrap();
        assert_eq!(echo["url"], "http://10.0.0.5/api/devices/a");

        // The response does not match the expected type.
        let error = client.get::<Vec<String>>("/json/eff").await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::JsonResponse);

        // All requests went through the device queue.
        let stats = client.scheduler().queue_stats();
        assert_eq!(stats.len(), 1);
        assert!(stats.contains_key("10.0.0.5"));
    }
}
