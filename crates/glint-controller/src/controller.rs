use std::sync::Arc;
use std::time::Duration;

use glint::wled::{StateUpdate, WledState};

use futures_util::future::join_all;

use hashbrown::HashMap;

use serde::Serialize;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use tokio_util::sync::CancellationToken;

use tracing::{debug, error, info, warn};

use crate::cache::{CacheInfo, CapabilityCache};
use crate::client::{ApiClient, Service, invalid_input};
use crate::config::{ControllerConfig, ServicesConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::hass::HomeAssistantClient;
use crate::ledfx::LedfxClient;
use crate::scheduler::{QueueStats, Scheduler};
use crate::transport::{HttpTransport, TransportStats};
use crate::wled::WledClient;

// Lower bound of a housekeeping period.
const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(1);

// A bare host or address is reached over plain `HTTP`.
fn device_url(address: &str) -> Result<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(invalid_input("The device address is empty"));
    }

    Ok(if address.contains("://") {
        address.into()
    } else {
        format!("http://{address}")
    })
}

fn housekeeping<F>(
    runtime: &Handle,
    name: &'static str,
    period: Duration,
    cancellation_token: CancellationToken,
    cleanup: F,
) -> JoinHandle<()>
where
    F: Fn() -> usize + Send + 'static,
{
    let period = period.max(MIN_CLEANUP_INTERVAL);

    runtime.spawn(async move {
        // The first pass runs one period after start.
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                // Use the cancellation token to stop the loop
                () = cancellation_token.cancelled() => { break; }
                _ = interval.tick() => {
                    let removed = cleanup();
                    if removed > 0 {
                        debug!("{name} housekeeping removed {removed} stale entries");
                    }
                }
            }
        }
    })
}

/// The outcome of a [`StateUpdate`] sent to a device by
/// [`Controller::broadcast`].
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastResult {
    /// Device address, as given.
    pub address: String,
    /// The resulting device state, or the failure.
    pub result: Result<WledState>,
}

/// Reachability of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// Service name.
    pub service: &'static str,
    /// Whether the service answered.
    pub success: bool,
    /// Why the service could not be contacted at all.
    pub error: Option<String>,
}

impl ServiceStatus {
    async fn ping<S: Service>(client: Result<S>, service: &'static str) -> Self {
        match client {
            Ok(client) => Self {
                service,
                success: client.ping().await,
                error: None,
            },
            Err(e) => Self {
                service,
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// A snapshot of all services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Transport statistics.
    pub transport: TransportStats,
    /// Statistics of every device queue.
    pub queues: HashMap<String, QueueStats>,
    /// Capability cache occupancy.
    pub cache: CacheInfo,
}

/// A controller owning the transport, the scheduler and the capability cache
/// shared by all clients.
///
/// The main functionalities include:
///
/// - Handing out clients for `WLED` devices, `Home Assistant` hubs and
///   `LEDfx` engines, all queued through the same scheduler
/// - Applying a state update to many devices at once
/// - Checking the reachability of all services
/// - Periodically evicting the transport usage records and the device queues
///   which have been idle for too long
///
/// Each controller is independent: services are never shared between two
/// controllers.
#[derive(Debug)]
pub struct Controller {
    transport: Arc<HttpTransport>,
    scheduler: Scheduler<HttpTransport>,
    cache: Arc<CapabilityCache>,
    cancellation_token: CancellationToken,
    housekeeping: Vec<JoinHandle<()>>,
}

impl Controller {
    /// Creates a [`Controller`] and starts its housekeeping tasks.
    ///
    /// # Errors
    ///
    /// An error is returned when the `HTTP` client cannot be initialized or
    /// when no `tokio` runtime is running.
    pub fn new(config: ControllerConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            Error::new(
                ErrorKind::Internal,
                format!("A controller needs a tokio runtime: {e}"),
            )
        })?;

        let transport = Arc::new(HttpTransport::new(config.transport)?);
        let scheduler = Scheduler::new(Arc::clone(&transport), config.scheduler);
        let cache = Arc::new(CapabilityCache::new(config.cache));

        let cancellation_token = CancellationToken::new();

        let transport_cleanup = {
            let transport = Arc::clone(&transport);
            housekeeping(
                &runtime,
                "Transport",
                config.transport.cleanup_interval,
                cancellation_token.clone(),
                move || transport.cleanup(),
            )
        };

        let scheduler_cleanup = {
            let scheduler = scheduler.clone();
            housekeeping(
                &runtime,
                "Scheduler",
                config.scheduler.cleanup_interval,
                cancellation_token.clone(),
                move || scheduler.cleanup(),
            )
        };

        info!(
            "Controller started with {} transport and {:?} timeout",
            config.transport.mode, config.transport.timeout
        );

        Ok(Self {
            transport,
            scheduler,
            cache,
            cancellation_token,
            housekeeping: vec![transport_cleanup, scheduler_cleanup],
        })
    }

    /// Creates a [`WledClient`] for a device.
    ///
    /// The address is either a complete `URL` or a host, optionally followed
    /// by a port, reached over plain `HTTP`.
    ///
    /// # Errors
    ///
    /// An [`ErrorKind::InvalidInput`] error is returned when the address is
    /// empty or malformed.
    pub fn wled(&self, address: &str) -> Result<WledClient> {
        let api = ApiClient::new(&device_url(address)?, self.scheduler.clone())?;
        Ok(WledClient::new(api, Arc::clone(&self.cache)))
    }

    /// Creates a [`HomeAssistantClient`] for a hub.
    ///
    /// # Errors
    ///
    /// An [`ErrorKind::InvalidInput`] error is returned when the `URL` is
    /// empty or malformed.
    pub fn home_assistant(&self, url: &str, token: &str) -> Result<HomeAssistantClient> {
        let api = ApiClient::new(url, self.scheduler.clone())?;
        Ok(HomeAssistantClient::new(api, token))
    }

    /// Creates a [`LedfxClient`] for an engine.
    ///
    /// # Errors
    ///
    /// An [`ErrorKind::InvalidInput`] error is returned when the `URL` is
    /// empty or malformed.
    pub fn ledfx(&self, url: &str) -> Result<LedfxClient> {
        let api = ApiClient::new(url, self.scheduler.clone())?;
        Ok(LedfxClient::new(api))
    }

    /// Applies the same [`StateUpdate`] to many devices concurrently.
    ///
    /// A result is returned for every address, in the given order. A failure
    /// on a device never affects the others.
    pub async fn broadcast<A: AsRef<str>>(
        &self,
        addresses: &[A],
        update: &StateUpdate,
    ) -> Vec<BroadcastResult> {
        join_all(addresses.iter().map(|address| async move {
            let address = address.as_ref();
            let result = match self.wled(address) {
                Ok(client) => client.set_state(update).await,
                Err(e) => Err(e),
            };

            if let Err(ref e) = result {
                warn!("Update of {address} failed: {e}");
            }

            BroadcastResult {
                address: address.into(),
                result,
            }
        }))
        .await
    }

    /// Pings the `WLED` device, the `Home Assistant` hub and the `LEDfx`
    /// engine concurrently.
    pub async fn test_all_connections(&self, services: &ServicesConfig) -> Vec<ServiceStatus> {
        let (wled, hass, ledfx) = tokio::join!(
            ServiceStatus::ping(self.wled(&services.wled_url), "WLED"),
            ServiceStatus::ping(
                self.home_assistant(&services.hass_url, &services.hass_token),
                "Home Assistant",
            ),
            ServiceStatus::ping(self.ledfx(&services.ledfx_url), "LEDfx"),
        );
        vec![wled, hass, ledfx]
    }

    /// Returns the [`ConnectionStats`].
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            transport: self.transport.stats(),
            queues: self.scheduler.queue_stats(),
            cache: self.cache.info(),
        }
    }

    /// Discards the cached capabilities.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Returns the [`CapabilityCache`].
    #[must_use]
    pub fn cache(&self) -> &CapabilityCache {
        &self.cache
    }

    /// Returns the [`Scheduler`].
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler<HttpTransport> {
        &self.scheduler
    }

    /// Returns the [`HttpTransport`].
    #[must_use]
    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Shuts down the [`Controller`], stopping the housekeeping tasks and
    /// dropping all usage records.
    ///
    /// Clients created by this controller keep working, but their queues are
    /// no longer evicted.
    pub async fn shutdown(mut self) {
        self.cancellation_token.cancel();

        for handle in std::mem::take(&mut self.housekeeping) {
            if let Err(e) = handle.await {
                error!("Failed to await a housekeeping task: {e}");
            }
        }

        self.transport.destroy();
        info!("Controller stopped");
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use glint::wled::StateUpdate;

    use serial_test::serial;

    use glint_mock::{MockHomeAssistant, MockLedfx, MockWled};

    use crate::config::{ControllerConfig, SchedulerConfig, ServicesConfig, TransportConfig};
    use crate::error::ErrorKind;
    use crate::tests::{controller, init_logging};

    use super::{Controller, device_url};

    #[test]
    fn needs_a_runtime() {
        let error = Controller::new(ControllerConfig::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);
    }

    #[test]
    fn device_urls() {
        assert_eq!(device_url("10.0.0.5").unwrap(), "http://10.0.0.5");
        assert_eq!(device_url(" wled.local:8080 ").unwrap(), "http://wled.local:8080");
        assert_eq!(device_url("https://10.0.0.5").unwrap(), "https://10.0.0.5");
        assert_eq!(device_url("").unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn clients_share_the_scheduler() {
        let controller = controller(Duration::from_secs(1));

        let wled = controller.wled("10.0.0.5").unwrap();
        assert_eq!(wled.api().device(), "10.0.0.5");
        assert_eq!(
            controller.wled("  ").unwrap_err().kind(),
            ErrorKind::InvalidInput
        );

        let hass = controller
            .home_assistant("http://10.0.0.2:8123/", "token")
            .unwrap();
        assert_eq!(hass.api().device(), "10.0.0.2:8123");

        let ledfx = controller.ledfx("http://10.0.0.3:8888").unwrap();
        assert_eq!(ledfx.api().base_url(), "http://10.0.0.3:8888");

        controller.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn broadcast_with_partial_failure() {
        init_logging();

        let first = MockWled::new("Hole 1").spawn().await.unwrap();
        let second = MockWled::new("Hole 2").spawn().await.unwrap();
        second.fail_with(Some(503));
        let controller = controller(Duration::from_secs(5));

        let addresses = [first.key(), second.key(), String::new()];
        let results = controller
            .broadcast(&addresses, &StateUpdate::new().on(false).brightness(10))
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].address, first.key());
        let state = results[0].result.as_ref().unwrap();
        assert!(!state.on);
        assert_eq!(state.brightness, 10);

        assert_eq!(results[1].result.as_ref().unwrap_err().status(), Some(503));
        assert_eq!(
            results[2].result.as_ref().unwrap_err().kind(),
            ErrorKind::InvalidInput
        );

        controller.shutdown().await;
        first.shutdown().await;
        second.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn all_connections() {
        let wled = MockWled::new("Hole 1").spawn().await.unwrap();
        let hub = MockHomeAssistant::new("secret").spawn().await.unwrap();
        let engine = MockLedfx::new().spawn().await.unwrap();
        let controller = controller(Duration::from_secs(5));

        let services = ServicesConfig::default()
            .wled_url(wled.url())
            .hass(hub.url(), "secret")
            .ledfx_url(engine.url());
        let statuses = controller.test_all_connections(&services).await;

        let names: Vec<_> = statuses.iter().map(|status| status.service).collect();
        assert_eq!(names, ["WLED", "Home Assistant", "LEDfx"]);
        assert!(statuses.iter().all(|status| status.success));

        // A wrong token and a malformed address.
        let services = services.hass(hub.url(), "wrong").ledfx_url("ledfx");
        let statuses = controller.test_all_connections(&services).await;
        assert!(statuses[0].success);
        assert!(!statuses[1].success);
        assert_eq!(statuses[1].error, None);
        assert!(!statuses[2].success);
        assert!(statuses[2].error.is_some());

        controller.shutdown().await;
        wled.shutdown().await;
        hub.shutdown().await;
        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn statistics_and_cache() {
        let device = MockWled::new("Hole 1").spawn().await.unwrap();
        let controller = controller(Duration::from_secs(5));

        let client = controller.wled(&device.key()).unwrap();
        let capabilities = client.capabilities().await.unwrap();

        let stats = controller.stats();
        assert_eq!(stats.transport.active_devices, 1);
        assert_eq!(stats.queues[&device.key()].queue_length, 0);
        assert!(stats.cache.cached);
        assert_eq!(stats.cache.effects, capabilities.effects.len());
        assert!(controller.cache().is_valid());

        controller.clear_cache();
        assert!(!controller.stats().cache.cached);

        controller.shutdown().await;
        device.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn housekeeping_evicts_idle_entries() {
        init_logging();

        let device = MockWled::new("Hole 1").spawn().await.unwrap();
        let config = ControllerConfig::new()
            .transport(
                TransportConfig::new()
                    .stale_threshold(Duration::from_millis(50))
                    .cleanup_interval(Duration::from_millis(100)),
            )
            .scheduler(
                SchedulerConfig::new()
                    .stale_threshold(Duration::from_millis(50))
                    .cleanup_interval(Duration::from_millis(100)),
            );
        let controller = Controller::new(config).unwrap();

        let client = controller.wled(&device.url()).unwrap();
        assert!(client.info().await.is_ok());
        assert_eq!(controller.stats().transport.active_devices, 1);

        tokio::time::sleep(Duration::from_millis(500)).await;

        let stats = controller.stats();
        assert_eq!(stats.transport.active_devices, 0);
        assert!(stats.queues.is_empty());

        // Evicted queues are created again on demand.
        assert!(client.info().await.is_ok());
        assert_eq!(controller.stats().queues.len(), 1);

        controller.shutdown().await;
        device.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn shutdown_drops_usage_records() {
        let device = MockWled::new("Hole 1").spawn().await.unwrap();
        let controller = controller(Duration::from_secs(5));

        let client = controller.wled(&device.url()).unwrap();
        assert!(client.info().await.is_ok());

        let scheduler = controller.scheduler().clone();
        assert_eq!(scheduler.transport().stats().active_devices, 1);

        controller.shutdown().await;
        assert_eq!(scheduler.transport().stats().active_devices, 0);

        device.shutdown().await;
    }
}
