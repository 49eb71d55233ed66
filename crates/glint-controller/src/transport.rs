use std::sync::Mutex;
use std::time::Duration;

use hashbrown::HashMap;

use reqwest::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Url};

use serde::Serialize;
use serde_json::Value;

use tokio::time::Instant;

use tracing::{debug, warn};

use crate::config::{TransportConfig, TransportMode};
use crate::error::{Error, ErrorKind, Result};
use crate::lock;

// Idle connections kept alive for a device in pooled mode.
const POOL_MAX_IDLE_PER_HOST: usize = 2;

// How long an idle pooled connection is kept alive.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// How a response body is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    /// The body is parsed as `JSON`. An empty body is [`Value::Null`].
    #[default]
    Json,
    /// The body is returned verbatim as a [`Value::String`].
    Text,
}

/// A request addressed to a device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRequest {
    url: String,
    method: Method,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    format: ResponseFormat,
}

impl DeviceRequest {
    /// Creates a [`DeviceRequest`] with the given method and complete `URL`.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            body: None,
            format: ResponseFormat::Json,
        }
    }

    /// Creates a `GET` [`DeviceRequest`].
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a `POST` [`DeviceRequest`].
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Creates a `PUT` [`DeviceRequest`].
    #[must_use]
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Creates a `DELETE` [`DeviceRequest`].
    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Adds a header, replacing the transport default with the same name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a `JSON` body.
    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets how the response body is interpreted.
    #[must_use]
    pub const fn format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    /// Returns the request `URL`.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the `JSON` body, if any.
    #[must_use]
    pub const fn json_body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Returns the device key of the request, the host of its `URL` followed
    /// by the port when the port is explicit.
    ///
    /// # Errors
    ///
    /// An error is returned when the `URL` cannot be parsed or has no host.
    pub fn device(&self) -> Result<String> {
        device_key(&self.url)
    }
}

/// Returns the device key of a `URL`, its host followed by the port when the
/// port is explicit.
///
/// # Errors
///
/// An error is returned when the `URL` cannot be parsed or has no host.
pub fn device_key(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| {
        Error::new(ErrorKind::InvalidInput, format!("Invalid url `{url}`: {e}"))
    })?;
    key_from_url(&parsed)
}

fn key_from_url(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| Error::new(ErrorKind::InvalidInput, format!("The url `{url}` has no host")))?;

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// A transport able to deliver a [`DeviceRequest`] and return the parsed
/// response body.
///
/// The scheduler dispatches every request through this trait.
pub trait Transport: Send + Sync + 'static {
    /// Sends a request and returns the parsed response body.
    fn send(&self, request: &DeviceRequest) -> impl Future<Output = Result<Value>> + Send;
}

/// The time elapsed since a device was last contacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceUsage {
    /// Device key.
    pub device: String,
    /// Time elapsed since the last request.
    pub idle: Duration,
}

/// Transport statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    /// Number of devices contacted recently.
    pub active_devices: usize,
    /// Connection management mode.
    pub mode: TransportMode,
    /// Per-device idle times, ordered by device key.
    pub last_used: Vec<DeviceUsage>,
}

/// An `HTTP` transport with a hard timeout and connection reuse.
///
/// It also keeps track of the last time each device has been contacted.
/// These usage records are only informative and never affect how a request
/// is sent.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
    usage: Mutex<HashMap<String, Instant>>,
}

impl HttpTransport {
    /// Creates an [`HttpTransport`] from a [`TransportConfig`].
    ///
    /// # Errors
    ///
    /// An error is returned when the underlying `HTTP` client cannot be
    /// initialized.
    pub fn new(config: TransportConfig) -> Result<Self> {
        let builder = Client::builder().connect_timeout(config.timeout);

        let builder = match config.mode {
            TransportMode::Pooled => builder
                .pool_idle_timeout(POOL_IDLE_TIMEOUT)
                .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
                .tcp_keepalive(POOL_IDLE_TIMEOUT),
            TransportMode::Basic => builder.pool_max_idle_per_host(0),
        };

        let client = builder.build()?;

        Ok(Self {
            client,
            config,
            usage: Mutex::new(HashMap::new()),
        })
    }

    /// Sends a request and returns the parsed response body.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::InvalidInput`] when the `URL` or a header is malformed
    /// - [`ErrorKind::Timeout`] when no response arrives in time
    /// - [`ErrorKind::HttpStatus`] when the response status is not a success
    /// - [`ErrorKind::Network`] when the request cannot be delivered
    /// - [`ErrorKind::JsonResponse`] when the body is not valid `JSON`
    pub async fn request(&self, request: &DeviceRequest) -> Result<Value> {
        let url = Url::parse(&request.url).map_err(|e| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid url `{}`: {e}", request.url),
            )
        })?;
        let device = key_from_url(&url)?;

        let headers = headers(&request.headers)?;

        self.track(device);

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(headers);
        if let Some(ref body) = request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let Ok(response) = tokio::time::timeout(self.config.timeout, async {
            let response = builder.send().await?;

            let status = response.status();
            if !status.is_success() {
                return Err(Error::http_status(
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown"),
                ));
            }

            let body = response.bytes().await?;
            parse_body(&body, request.format)
        })
        .await
        else {
            warn!(
                "{} {} aborted after {:?}",
                request.method, request.url, self.config.timeout
            );
            return Err(Error::timeout(self.config.timeout));
        };

        response
    }

    /// Sends a `GET` request to the given `URL`.
    ///
    /// # Errors
    ///
    /// The same errors as [`Self::request`].
    pub async fn get(&self, url: &str) -> Result<Value> {
        self.request(&DeviceRequest::get(url)).await
    }

    /// Sends a `POST` request with a `JSON` body to the given `URL`.
    ///
    /// # Errors
    ///
    /// The body may fail to serialize, otherwise the same errors as
    /// [`Self::request`].
    pub async fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<Value> {
        let body = serde_json::to_value(body)?;
        self.request(&DeviceRequest::post(url).body(body)).await
    }

    /// Returns the [`TransportStats`].
    #[must_use]
    pub fn stats(&self) -> TransportStats {
        let usage = lock(&self.usage);
        let mut last_used: Vec<DeviceUsage> = usage
            .iter()
            .map(|(device, last)| DeviceUsage {
                device: device.clone(),
                idle: last.elapsed(),
            })
            .collect();
        last_used.sort_by(|a, b| a.device.cmp(&b.device));

        TransportStats {
            active_devices: usage.len(),
            mode: self.config.mode,
            last_used,
        }
    }

    /// Drops the usage records of the devices idle for longer than the stale
    /// threshold, returning how many have been dropped.
    pub fn cleanup(&self) -> usize {
        let threshold = self.config.stale_threshold;
        let mut usage = lock(&self.usage);

        let before = usage.len();
        usage.retain(|_, last| last.elapsed() <= threshold);
        let removed = before - usage.len();

        if removed > 0 {
            debug!("Dropped {removed} stale usage records");
        }
        removed
    }

    /// Drops all usage records.
    pub fn destroy(&self) {
        lock(&self.usage).clear();
    }

    /// Returns the [`TransportConfig`].
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn track(&self, device: String) {
        let _ = lock(&self.usage).insert(device, Instant::now());
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &DeviceRequest) -> impl Future<Output = Result<Value>> + Send {
        self.request(request)
    }
}

fn headers(extra: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let _ = headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let _ = headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            Error::new(ErrorKind::InvalidInput, format!("Invalid header `{name}`: {e}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid value for header `{name}`: {e}"),
            )
        })?;
        let _ = headers.insert(name, value);
    }

    Ok(headers)
}

fn parse_body(body: &[u8], format: ResponseFormat) -> Result<Value> {
    match format {
        ResponseFormat::Text => Ok(Value::String(String::from_utf8_lossy(body).into_owned())),
        ResponseFormat::Json if body.iter().all(u8::is_ascii_whitespace) => Ok(Value::Null),
        ResponseFormat::Json => Ok(serde_json::from_slice(body)?),
    }
}
