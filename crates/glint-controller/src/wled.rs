use std::sync::Arc;
use std::time::Duration;

use glint::capabilities::Capabilities;
use glint::wled::{
    EFFECTS_ENDPOINT, INFO_ENDPOINT, PALETTES_ENDPOINT, Preset, STATE_ENDPOINT, STATUS_ENDPOINT,
    SegmentUpdate, StateUpdate, WledFullStatus, WledInfo, WledState,
};

use tokio::time::Instant;

use tracing::{debug, warn};

use crate::cache::CapabilityCache;
use crate::client::{ApiClient, PingReport, Service, invalid_input};
use crate::error::{ErrorKind, Result};
use crate::transport::{HttpTransport, Transport};

// Pause before the single ping retry.
const PING_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A client for the `JSON` API of a `WLED` device.
///
/// Effect and palette names are read through the shared
/// [`CapabilityCache`].
pub struct WledClient<T = HttpTransport> {
    api: ApiClient<T>,
    cache: Arc<CapabilityCache>,
}

impl<T> Clone for WledClient<T> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<T> std::fmt::Debug for WledClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WledClient").field("api", &self.api).finish()
    }
}

impl<T: Transport> WledClient<T> {
    /// Creates a [`WledClient`].
    #[must_use]
    pub const fn new(api: ApiClient<T>, cache: Arc<CapabilityCache>) -> Self {
        Self { api, cache }
    }

    /// Returns the underlying [`ApiClient`].
    #[must_use]
    pub const fn api(&self) -> &ApiClient<T> {
        &self.api
    }

    /// Retrieves the device information.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn info(&self) -> Result<WledInfo> {
        self.api.get(INFO_ENDPOINT).await
    }

    /// Retrieves the current state.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn state(&self) -> Result<WledState> {
        self.api.get(STATE_ENDPOINT).await
    }

    /// Retrieves state, information, effects and palettes at once.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn status(&self) -> Result<WledFullStatus> {
        self.api.get(STATUS_ENDPOINT).await
    }

    /// Applies a [`StateUpdate`] and returns the resulting state.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn set_state(&self, update: &StateUpdate) -> Result<WledState> {
        self.api.post(STATE_ENDPOINT, update).await
    }

    /// Turns the device on or off.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn set_on(&self, on: bool) -> Result<WledState> {
        self.set_state(&StateUpdate::new().on(on)).await
    }

    /// Sets the master brightness, clamped into `0..=255`.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn set_brightness(&self, brightness: i32) -> Result<WledState> {
        let brightness = u8::try_from(brightness.clamp(0, 255)).unwrap_or(u8::MAX);
        self.set_state(&StateUpdate::new().brightness(brightness))
            .await
    }

    /// Applies an effect to a segment.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn set_effect(&self, effect: u16, segment: u8) -> Result<WledState> {
        self.set_state(&StateUpdate::new().segment(SegmentUpdate::new(segment).effect(effect)))
            .await
    }

    /// Applies a palette to a segment.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn set_palette(&self, palette: u16, segment: u8) -> Result<WledState> {
        self.set_state(&StateUpdate::new().segment(SegmentUpdate::new(segment).palette(palette)))
            .await
    }

    /// Sets the primary color of a segment.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn set_color(&self, r: u8, g: u8, b: u8, segment: u8) -> Result<WledState> {
        self.set_state(&StateUpdate::new().segment(SegmentUpdate::new(segment).color(r, g, b)))
            .await
    }

    /// Applies the effect with the given name to a segment.
    ///
    /// # Errors
    ///
    /// An [`ErrorKind::InvalidInput`] error is returned when the device does
    /// not know the effect, otherwise any error of the [`ApiClient`].
    pub async fn set_effect_by_name(&self, name: &str, segment: u8) -> Result<WledState> {
        let effect = self
            .capabilities()
            .await?
            .effect_id(name)
            .ok_or_else(|| invalid_input(format!("Unknown effect `{name}`")))?;
        self.set_effect(effect, segment).await
    }

    /// Applies the palette with the given name to a segment.
    ///
    /// # Errors
    ///
    /// An [`ErrorKind::InvalidInput`] error is returned when the device does
    /// not know the palette, otherwise any error of the [`ApiClient`].
    pub async fn set_palette_by_name(&self, name: &str, segment: u8) -> Result<WledState> {
        let palette = self
            .capabilities()
            .await?
            .palette_id(name)
            .ok_or_else(|| invalid_input(format!("Unknown palette `{name}`")))?;
        self.set_palette(palette, segment).await
    }

    /// Applies a preset.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn set_preset(&self, preset: i16) -> Result<WledState> {
        self.set_state(&StateUpdate::new().preset(preset)).await
    }

    /// Returns the preset slots.
    ///
    /// The device does not expose preset names, so no request is sent.
    #[must_use]
    pub fn presets(&self) -> Vec<Preset> {
        Preset::slots()
    }

    /// Retrieves the effect names.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn effects(&self) -> Result<Vec<String>> {
        self.api.get(EFFECTS_ENDPOINT).await
    }

    /// Retrieves the palette names.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`].
    pub async fn palettes(&self) -> Result<Vec<String>> {
        self.api.get(PALETTES_ENDPOINT).await
    }

    /// Returns the effect and palette names.
    ///
    /// A valid cache entry is returned as it is, whatever device it has been
    /// fetched from. Otherwise both lists are fetched concurrently from this
    /// device and cached.
    ///
    /// # Errors
    ///
    /// Any error of the [`ApiClient`]. Nothing is cached on failure.
    pub async fn capabilities(&self) -> Result<Capabilities> {
        if let Some(capabilities) = self.cache.get() {
            return Ok(capabilities);
        }

        let (effects, palettes) = tokio::try_join!(self.effects(), self.palettes())?;
        let capabilities = Capabilities::new(effects, palettes);
        self.cache.set(capabilities.clone(), self.api.device());

        Ok(capabilities)
    }

    /// Sends a single information request and reports how long the device
    /// took to answer.
    pub async fn ping_timed(&self) -> PingReport {
        let start = Instant::now();
        let device = self.api.device().to_string();

        match self.info().await {
            Ok(_) => {
                let response_time = start.elapsed();
                PingReport {
                    success: true,
                    message: format!("WLED device responded in {}ms", response_time.as_millis()),
                    device,
                    response_time: Some(response_time),
                }
            }
            Err(e) => PingReport {
                success: false,
                device,
                response_time: None,
                message: e.to_string(),
            },
        }
    }
}

impl<T: Transport> Service for WledClient<T> {
    fn name(&self) -> &'static str {
        "WLED"
    }

    async fn ping(&self) -> bool {
        let error = match self.info().await {
            Ok(_) => return true,
            Err(e) => e,
        };

        if error.kind() != ErrorKind::Timeout {
            warn!("WLED ping to {} failed: {error}", self.api.device());
            return false;
        }

        debug!(
            "WLED ping to {} timed out, retrying in {PING_RETRY_DELAY:?}",
            self.api.device()
        );
        tokio::time::sleep(PING_RETRY_DELAY).await;

        match self.info().await {
            Ok(_) => true,
            Err(e) => {
                warn!("WLED ping to {} failed after retry: {e}", self.api.device());
                false
            }
        }
    }
}
