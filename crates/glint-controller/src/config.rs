use std::time::Duration;

use serde::Serialize;

// Maximum time to wait for a device response.
const TIMEOUT: Duration = Duration::from_secs(10);

// Entries idle for longer than this threshold are evicted.
const STALE_THRESHOLD: Duration = Duration::from_secs(5 * 60);

// Interval between two housekeeping passes.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

// Maximum number of concurrent requests to the same device.
const MAX_CONCURRENT_PER_DEVICE: usize = 3;

// Pause between two batches of requests to the same device.
const BATCH_DELAY: Duration = Duration::from_millis(25);

// Validity of the cached effect and palette names.
const CACHE_TTL: Duration = Duration::from_secs(30 * 60);

const WLED_API_URL: &str = "http://wled.local";
const HASS_API_URL: &str = "http://homeassistant.local:8123";
const LEDFX_API_URL: &str = "http://ledfx.local:8888";

/// How the transport manages its connections.
///
/// The mode is decided by whoever builds the controller, depending on the
/// environment it runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum TransportMode {
    /// Idle connections are kept alive and reused.
    #[default]
    Pooled,
    /// A connection is closed as soon as its response is read.
    Basic,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pooled => "pooled",
            Self::Basic => "basic",
        })
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    pub(crate) timeout: Duration,
    pub(crate) mode: TransportMode,
    pub(crate) stale_threshold: Duration,
    pub(crate) cleanup_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportConfig {
    /// Creates a [`TransportConfig`] with a 10 seconds timeout and pooled
    /// connections.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: TIMEOUT,
            mode: TransportMode::Pooled,
            stale_threshold: STALE_THRESHOLD,
            cleanup_interval: CLEANUP_INTERVAL,
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the [`TransportMode`].
    #[must_use]
    pub const fn mode(mut self, mode: TransportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the idle time after which a usage record is dropped.
    #[must_use]
    pub const fn stale_threshold(mut self, stale_threshold: Duration) -> Self {
        self.stale_threshold = stale_threshold;
        self
    }

    /// Sets the interval between two usage records cleanups.
    #[must_use]
    pub const fn cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub(crate) max_concurrent_per_device: usize,
    pub(crate) batch_delay: Duration,
    pub(crate) stale_threshold: Duration,
    pub(crate) cleanup_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerConfig {
    /// Creates a [`SchedulerConfig`] which sends at most 3 concurrent
    /// requests to a device, waiting 25 milliseconds between two batches.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_concurrent_per_device: MAX_CONCURRENT_PER_DEVICE,
            batch_delay: BATCH_DELAY,
            stale_threshold: STALE_THRESHOLD,
            cleanup_interval: CLEANUP_INTERVAL,
        }
    }

    /// Sets the maximum number of concurrent requests to a device.
    ///
    /// A value of 0 is treated as 1.
    #[must_use]
    pub const fn max_concurrent_per_device(mut self, max: usize) -> Self {
        self.max_concurrent_per_device = if max == 0 { 1 } else { max };
        self
    }

    /// Sets the pause between two batches of requests to a device.
    #[must_use]
    pub const fn batch_delay(mut self, batch_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self
    }

    /// Sets the idle time after which an empty device queue is evicted.
    #[must_use]
    pub const fn stale_threshold(mut self, stale_threshold: Duration) -> Self {
        self.stale_threshold = stale_threshold;
        self
    }

    /// Sets the interval between two device queues cleanups.
    #[must_use]
    pub const fn cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }
}

/// Capability cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub(crate) ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheConfig {
    /// Creates a [`CacheConfig`] whose entries are valid for 30 minutes.
    #[must_use]
    pub const fn new() -> Self {
        Self { ttl: CACHE_TTL }
    }

    /// Sets the validity of a cached entry.
    #[must_use]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// The configuration of all controller services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerConfig {
    pub(crate) transport: TransportConfig,
    pub(crate) scheduler: SchedulerConfig,
    pub(crate) cache: CacheConfig,
}

impl ControllerConfig {
    /// Creates a [`ControllerConfig`] with the default configuration of each
    /// service.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            transport: TransportConfig::new(),
            scheduler: SchedulerConfig::new(),
            cache: CacheConfig::new(),
        }
    }

    /// Sets the [`TransportConfig`].
    #[must_use]
    pub const fn transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the [`SchedulerConfig`].
    #[must_use]
    pub const fn scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Sets the [`CacheConfig`].
    #[must_use]
    pub const fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

/// Addresses of the services driven by a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicesConfig {
    /// `WLED` device address.
    pub wled_url: String,
    /// `Home Assistant` hub address.
    pub hass_url: String,
    /// `Home Assistant` long-lived access token.
    pub hass_token: String,
    /// `LEDfx` engine address.
    pub ledfx_url: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            wled_url: WLED_API_URL.into(),
            hass_url: HASS_API_URL.into(),
            hass_token: String::new(),
            ledfx_url: LEDFX_API_URL.into(),
        }
    }
}

impl ServicesConfig {
    /// Creates a [`ServicesConfig`] from the environment.
    ///
    /// The `WLED_API_URL`, `HASS_API_URL`, `HASS_TOKEN` and `LEDFX_API_URL`
    /// variables override the default addresses and token.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |name: &str, default: String| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(default)
        };

        Self {
            wled_url: var("WLED_API_URL", defaults.wled_url),
            hass_url: var("HASS_API_URL", defaults.hass_url),
            hass_token: var("HASS_TOKEN", defaults.hass_token),
            ledfx_url: var("LEDFX_API_URL", defaults.ledfx_url),
        }
    }

    /// Sets the `WLED` device address.
    #[must_use]
    pub fn wled_url(mut self, url: impl Into<String>) -> Self {
        self.wled_url = url.into();
        self
    }

    /// Sets the `Home Assistant` hub address and token.
    #[must_use]
    pub fn hass(mut self, url: impl Into<String>, token: impl Into<String>) -> Self {
        self.hass_url = url.into();
        self.hass_token = token.into();
        self
    }

    /// Sets the `LEDfx` engine address.
    #[must_use]
    pub fn ledfx_url(mut self, url: impl Into<String>) -> Self {
        self.ledfx_url = url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        ControllerConfig, SchedulerConfig, ServicesConfig, TransportConfig, TransportMode,
    };

    #[test]
    fn default_configuration() {
        let config = ControllerConfig::new();

        assert_eq!(config.transport.timeout, Duration::from_secs(10));
        assert_eq!(config.transport.mode, TransportMode::Pooled);
        assert_eq!(config.transport.stale_threshold, Duration::from_secs(300));
        assert_eq!(config.transport.cleanup_interval, Duration::from_secs(60));

        assert_eq!(config.scheduler.max_concurrent_per_device, 3);
        assert_eq!(config.scheduler.batch_delay, Duration::from_millis(25));
        assert_eq!(config.scheduler.stale_threshold, Duration::from_secs(300));

        assert_eq!(config.cache.ttl, Duration::from_secs(1800));

        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn builders() {
        let transport = TransportConfig::new()
            .timeout(Duration::from_millis(200))
            .mode(TransportMode::Basic);
        assert_eq!(transport.timeout, Duration::from_millis(200));
        assert_eq!(transport.mode.to_string(), "basic");

        let scheduler = SchedulerConfig::new().max_concurrent_per_device(0);
        assert_eq!(scheduler.max_concurrent_per_device, 1);
    }

    #[test]
    fn services_from_lookup() {
        let config = ServicesConfig::from_lookup(|name| match name {
            "WLED_API_URL" => Some("http://10.0.0.5".into()),
            "HASS_TOKEN" => Some("secret".into()),
            "LEDFX_API_URL" => Some("   ".into()),
            _ => None,
        });

        assert_eq!(config.wled_url, "http://10.0.0.5");
        assert_eq!(config.hass_url, "http://homeassistant.local:8123");
        assert_eq!(config.hass_token, "secret");
        assert_eq!(config.ledfx_url, "http://ledfx.local:8888");
    }
}
