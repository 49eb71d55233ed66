use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};

use serde_json::Value;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use tokio_util::sync::CancellationToken;

use tracing::{debug, warn};

// Time granted to in-flight requests when a server shuts down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

// Upper bound of a request body.
const MAX_BODY_SIZE: usize = 1024 * 1024;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A request received by an emulator.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Method.
    pub method: String,
    /// Path, without the query.
    pub path: String,
    /// Headers, with lowercase names.
    pub headers: Vec<(String, String)>,
    /// `JSON` body, if any.
    pub body: Option<Value>,
}

impl RecordedRequest {
    /// Returns the value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Default)]
struct Controls {
    failure: Mutex<Option<u16>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

// Decrements the in-flight counter even when the client goes away and the
// handler is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(controls: &'a Controls) -> Self {
        let current = controls.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = controls.max_in_flight.fetch_max(current, Ordering::SeqCst);
        Self(&controls.in_flight)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn query_delay(query: Option<&str>) -> Option<Duration> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("delay="))
        .and_then(|delay| delay.parse().ok())
        .map(Duration::from_millis)
}

async fn control(State(controls): State<Arc<Controls>>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    let Ok(bytes) = axum::body::to_bytes(body, MAX_BODY_SIZE).await else {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    };

    lock(&controls.requests).push(RecordedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        headers: parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body: serde_json::from_slice(&bytes).ok(),
    });

    let _in_flight = InFlight::enter(&controls);

    let latency = *lock(&controls.latency) + query_delay(parts.uri.query()).unwrap_or_default();
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }

    let failure = *lock(&controls.failure);
    if let Some(code) = failure {
        debug!("Failing {} {} with {code}", parts.method, parts.uri);
        return StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// A running emulator.
///
/// Dropping a [`MockServer`] leaves the emulator running until the runtime
/// stops. Call [`MockServer::shutdown`] to stop it.
#[derive(Debug)]
pub struct MockServer {
    address: SocketAddr,
    controls: Arc<Controls>,
    cancellation_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub(crate) async fn serve(router: Router) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;

        let controls = Arc::new(Controls::default());
        let router = router.layer(middleware::from_fn_with_state(
            Arc::clone(&controls),
            control,
        ));

        let cancellation_token = CancellationToken::new();
        let token = cancellation_token.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
            {
                warn!("Emulator on {address} stopped: {e}");
            }
        });

        debug!("Emulator listening on {address}");

        Ok(Self {
            address,
            controls,
            cancellation_token,
            handle,
        })
    }

    /// Returns the socket address.
    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns the base `URL`.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// Returns the host and port, as `127.0.0.1:<port>`.
    #[must_use]
    pub fn key(&self) -> String {
        self.address.to_string()
    }

    /// Makes every following request fail with the given status code, or
    /// restores normal operation with `None`.
    pub fn fail_with(&self, status: Option<u16>) {
        *lock(&self.controls.failure) = status;
    }

    /// Delays every following request.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.controls.latency) = latency;
    }

    /// Returns the maximum number of requests handled at the same time.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.controls.max_in_flight.load(Ordering::SeqCst)
    }

    /// Returns the number of requests handled right now.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.controls.in_flight.load(Ordering::SeqCst)
    }

    /// Returns the received requests, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.controls.requests).clone()
    }

    /// Returns how many requests have been received for a path.
    #[must_use]
    pub fn request_count(&self, path: &str) -> usize {
        lock(&self.controls.requests)
            .iter()
            .filter(|request| request.path == path)
            .count()
    }

    /// Stops the emulator.
    ///
    /// Requests still in flight after a short grace period are abandoned.
    pub async fn shutdown(mut self) {
        self.cancellation_token.cancel();

        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.handle)
            .await
            .is_err()
        {
            debug!("Abandoning the requests in flight on {}", self.address);
            self.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::query_delay;

    #[test]
    fn delay_parameter() {
        assert_eq!(query_delay(None), None);
        assert_eq!(query_delay(Some("delay=250")), Some(Duration::from_millis(250)));
        assert_eq!(
            query_delay(Some("v=1&delay=2000")),
            Some(Duration::from_secs(2))
        );
        assert_eq!(query_delay(Some("delay=soon")), None);
    }
}
