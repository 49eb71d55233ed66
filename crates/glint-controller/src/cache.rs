use std::sync::Mutex;
use std::time::Duration;

use glint::capabilities::Capabilities;

use serde::Serialize;

use tokio::time::Instant;

use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::lock;

#[derive(Debug)]
struct CacheEntry {
    capabilities: Capabilities,
    source: String,
    fetched_at: Instant,
}

/// A snapshot of the [`CapabilityCache`] occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    /// Whether an entry is stored.
    pub cached: bool,
    /// The device the entry has been fetched from.
    pub source: Option<String>,
    /// The entry age.
    pub age: Option<Duration>,
    /// Number of cached effects.
    pub effects: usize,
    /// Number of cached palettes.
    pub palettes: usize,
}

/// A cache for the [`Capabilities`] of a device.
///
/// The cache holds a single entry shared by all devices: capabilities
/// fetched from one device are returned to anyone asking, whatever device
/// they are about to drive. This assumes that all devices run the same
/// firmware. Writes always replace the entry.
///
/// An entry older than the configured time-to-live is discarded on the next
/// read.
#[derive(Debug)]
pub struct CapabilityCache {
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
}

impl Default for CapabilityCache {
    fn default() -> Self {
        Self::new(CacheConfig::new())
    }
}

impl CapabilityCache {
    /// Creates an empty [`CapabilityCache`].
    #[must_use]
    pub const fn new(config: CacheConfig) -> Self {
        Self {
            ttl: config.ttl,
            entry: Mutex::new(None),
        }
    }

    /// Returns the cached [`Capabilities`], if any and still valid.
    ///
    /// An expired entry is discarded.
    #[must_use]
    pub fn get(&self) -> Option<Capabilities> {
        let mut entry = lock(&self.entry);

        let expired = entry
            .as_ref()
            .is_some_and(|cached| cached.fetched_at.elapsed() > self.ttl);
        if expired {
            info!("Capability cache expired, clearing");
            *entry = None;
        }

        entry.as_ref().map(|cached| {
            debug!("Using cached capabilities from {}", cached.source);
            cached.capabilities.clone()
        })
    }

    /// Stores [`Capabilities`] fetched from the given device, replacing any
    /// previous entry.
    pub fn set(&self, capabilities: Capabilities, source: impl Into<String>) {
        let source = source.into();
        info!(
            "Cached capabilities from {source}: {} effects, {} palettes",
            capabilities.effects.len(),
            capabilities.palettes.len()
        );

        *lock(&self.entry) = Some(CacheEntry {
            capabilities,
            source,
            fetched_at: Instant::now(),
        });
    }

    /// Checks whether a valid entry is stored.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.get().is_some()
    }

    /// Discards the entry.
    pub fn clear(&self) {
        *lock(&self.entry) = None;
        info!("Capability cache cleared");
    }

    /// Returns the [`CacheInfo`].
    ///
    /// The entry is reported as it is, even when expired.
    #[must_use]
    pub fn info(&self) -> CacheInfo {
        lock(&self.entry)
            .as_ref()
            .map_or_else(CacheInfo::default, |cached| CacheInfo {
                cached: true,
                source: Some(cached.source.clone()),
                age: Some(cached.fetched_at.elapsed()),
                effects: cached.capabilities.effects.len(),
                palettes: cached.capabilities.palettes.len(),
            })
    }

    /// Returns the time-to-live of an entry.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use glint::capabilities::Capabilities;

    use crate::config::CacheConfig;

    use super::{CacheInfo, CapabilityCache};

    fn solid_default() -> Capabilities {
        Capabilities::new(vec!["Solid".into()], vec!["Default".into()])
    }

    #[tokio::test(start_paused = true)]
    async fn set_then_get() {
        let cache = CapabilityCache::default();
        assert_eq!(cache.get(), None);
        assert!(!cache.is_valid());

        cache.set(solid_default(), "10.0.0.5");
        tokio::time::advance(Duration::from_secs(29 * 60)).await;

        assert_eq!(cache.get(), Some(solid_default()));
        assert_eq!(
            cache.info(),
            CacheInfo {
                cached: true,
                source: Some("10.0.0.5".into()),
                age: Some(Duration::from_secs(29 * 60)),
                effects: 1,
                palettes: 1,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expiry() {
        let cache = CapabilityCache::default();
        cache.set(solid_default(), "10.0.0.5");

        tokio::time::advance(Duration::from_secs(30 * 60) + Duration::from_millis(1)).await;

        // Still reported until the next read.
        assert!(cache.info().cached);

        assert_eq!(cache.get(), None);
        assert_eq!(cache.info(), CacheInfo::default());
    }

    #[tokio::test(start_paused = true)]
    async fn custom_ttl() {
        let cache = CapabilityCache::new(CacheConfig::new().ttl(Duration::from_secs(1)));
        assert_eq!(cache.ttl(), Duration::from_secs(1));

        cache.set(solid_default(), "10.0.0.5");
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cache.is_valid());
    }

    #[test]
    fn clear() {
        let cache = CapabilityCache::default();
        cache.set(solid_default(), "10.0.0.5");

        cache.clear();

        assert_eq!(cache.get(), None);
        assert!(!cache.info().cached);
    }

    #[test]
    fn last_writer_wins() {
        let cache = CapabilityCache::default();
        cache.set(solid_default(), "10.0.0.5");

        let rainbow = Capabilities::new(vec!["Rainbow".into()], Vec::new());
        cache.set(rainbow.clone(), "10.0.0.6");

        assert_eq!(cache.get(), Some(rainbow));
        assert_eq!(cache.info().source.as_deref(), Some("10.0.0.6"));
    }

    #[test]
    fn shared_across_devices() {
        // Capabilities fetched from one device are served for any other.
        let cache = CapabilityCache::default();
        cache.set(solid_default(), "10.0.0.5");

        let for_other_device = cache.get();
        assert_eq!(for_other_device, Some(solid_default()));
        assert_eq!(cache.info().source.as_deref(), Some("10.0.0.5"));
    }
}
