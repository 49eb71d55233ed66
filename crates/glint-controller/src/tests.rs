use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use hashbrown::HashMap;

use serde_json::{Value, json};

use tokio::time::Instant;

use crate::config::{ControllerConfig, TransportConfig};
use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::lock;
use crate::transport::{DeviceRequest, Transport};

/// A dispatched request, as seen by a [`FakeTransport`].
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub(crate) url: String,
    pub(crate) start: Instant,
    pub(crate) end: Instant,
}

#[derive(Default)]
struct InFlight {
    current: usize,
    max: usize,
}

/// A transport answering every request after a fixed latency with the
/// request `URL`.
pub(crate) struct FakeTransport {
    latency: Duration,
    timeout: Option<Duration>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    log: Mutex<Vec<Call>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl FakeTransport {
    pub(crate) fn new(latency: Duration) -> Self {
        Self {
            latency,
            timeout: None,
            failing: Mutex::new(HashSet::new()),
            hanging: Mutex::new(HashSet::new()),
            log: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    // Requests to this `URL` fail with a 500 status.
    pub(crate) fn fail(&self, url: &str) {
        let _ = lock(&self.failing).insert(url.into());
    }

    // Requests to this `URL` never get a response.
    pub(crate) fn hang(&self, url: &str) {
        let _ = lock(&self.hanging).insert(url.into());
    }

    pub(crate) fn log(&self) -> Vec<Call> {
        lock(&self.log).clone()
    }

    pub(crate) fn max_in_flight(&self, device: &str) -> usize {
        lock(&self.in_flight)
            .get(device)
            .map_or(0, |in_flight| in_flight.max)
    }

    async fn answer(&self, request: &DeviceRequest) -> Result<Value> {
        let device = request.device()?;
        let url = request.url().to_string();

        let index = {
            let mut log = lock(&self.log);
            let now = Instant::now();
            log.push(Call {
                url: url.clone(),
                start: now,
                end: now,
            });
            log.len() - 1
        };

        {
            let mut in_flight = lock(&self.in_flight);
            let entry = in_flight.entry(device.clone()).or_default();
            entry.current += 1;
            entry.max = entry.max.max(entry.current);
        }

        let hangs = lock(&self.hanging).contains(&url);
        let work = async {
            if hangs {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(self.latency).await;
        };

        let outcome = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, work)
                .await
                .map_err(|_| Error::timeout(timeout)),
            None => {
                work.await;
                Ok(())
            }
        };

        if let Some(entry) = lock(&self.in_flight).get_mut(&device) {
            entry.current -= 1;
        }
        lock(&self.log)[index].end = Instant::now();

        outcome?;

        if lock(&self.failing).contains(&url) {
            return Err(Error::http_status(500, "Internal Server Error"));
        }

        Ok(json!({ "url": url }))
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: &DeviceRequest) -> impl Future<Output = Result<Value>> + Send {
        self.answer(request)
    }
}

// A controller with a short transport timeout.
pub(crate) fn controller(timeout: Duration) -> Controller {
    let config =
        ControllerConfig::new().transport(TransportConfig::new().timeout(timeout));
    Controller::new(config).unwrap()
}

// Shows the logs of a test, run with `--nocapture`.
pub(crate) fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
