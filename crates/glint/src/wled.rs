use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use crate::capabilities::Capabilities;

/// Device information endpoint.
pub const INFO_ENDPOINT: &str = "/json/info";
/// Device state endpoint.
pub const STATE_ENDPOINT: &str = "/json/state";
/// Full status endpoint: state, information, effects and palettes.
pub const STATUS_ENDPOINT: &str = "/json";
/// Effect names endpoint.
pub const EFFECTS_ENDPOINT: &str = "/json/eff";
/// Palette names endpoint.
pub const PALETTES_ENDPOINT: &str = "/json/pal";

/// Number of preset slots a device exposes.
pub const PRESET_SLOTS: u8 = 16;

/// Hardware description of the LEDs driven by a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct Leds {
    /// Number of LEDs.
    pub count: u16,
    /// Whether the strip has a dedicated white channel.
    pub rgbw: bool,
    /// Output pins.
    #[serde(rename = "pin")]
    pub pins: Vec<u8>,
    /// Current power draw, in milliamperes.
    #[serde(rename = "pwr")]
    pub power: u32,
    /// Maximum allowed power draw, in milliamperes.
    #[serde(rename = "maxpwr")]
    pub max_power: u32,
    /// Maximum number of segments.
    #[serde(rename = "maxseg")]
    pub max_segments: u8,
}

/// Information reported by a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct WledInfo {
    /// Firmware version.
    #[serde(rename = "ver")]
    pub version: String,
    /// Firmware build identifier.
    #[serde(rename = "vid")]
    pub build: u32,
    /// LEDs description.
    pub leds: Leds,
    /// Device name.
    pub name: String,
    /// Port used for `UDP` synchronization.
    #[serde(rename = "udpport")]
    pub udp_port: u16,
    /// Whether the device is receiving realtime data.
    pub live: bool,
    /// Number of available effects.
    #[serde(rename = "fxcount")]
    pub effect_count: u16,
    /// Number of available palettes.
    #[serde(rename = "palcount")]
    pub palette_count: u16,
    /// Hardware architecture.
    pub arch: String,
    /// Version of the underlying platform core.
    pub core: String,
    /// Free heap memory, in bytes.
    #[serde(rename = "freeheap")]
    pub free_heap: u32,
    /// Time since the last boot, in seconds.
    pub uptime: u64,
    /// Brand name.
    pub brand: String,
    /// Product name.
    pub product: String,
    /// Hardware address.
    pub mac: String,
}

/// A contiguous range of LEDs with its own effect, palette and colors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct Segment {
    /// Segment identifier.
    pub id: u8,
    /// First LED of the segment.
    pub start: u16,
    /// LED after the last one of the segment.
    pub stop: u16,
    /// Segment length.
    pub len: u16,
    /// Primary, secondary and tertiary colors.
    #[serde(rename = "col")]
    pub colors: Vec<Vec<u8>>,
    /// Effect identifier.
    #[serde(rename = "fx")]
    pub effect: u16,
    /// Effect speed.
    #[serde(rename = "sx")]
    pub speed: u8,
    /// Effect intensity.
    #[serde(rename = "ix")]
    pub intensity: u8,
    /// Palette identifier.
    #[serde(rename = "pal")]
    pub palette: u16,
    /// Whether the segment is selected.
    #[serde(rename = "sel")]
    pub selected: bool,
    /// Whether the segment is reversed.
    #[serde(rename = "rev")]
    pub reversed: bool,
    /// Whether the segment is on.
    pub on: bool,
    /// Segment brightness.
    #[serde(rename = "bri")]
    pub brightness: u8,
}

/// The current state of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct WledState {
    /// Whether the device is on.
    pub on: bool,
    /// Master brightness.
    #[serde(rename = "bri")]
    pub brightness: u8,
    /// Transition time, in tenths of a second.
    pub transition: u16,
    /// Active preset, `-1` when none.
    #[serde(rename = "ps")]
    pub preset: i16,
    /// Active playlist, `-1` when none.
    #[serde(rename = "pl")]
    pub playlist: i16,
    /// Segments.
    #[serde(rename = "seg")]
    pub segments: Vec<Segment>,
}

/// State, information, effects and palettes of a device in a single body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(default)]
pub struct WledFullStatus {
    /// Current state.
    pub state: WledState,
    /// Device information.
    pub info: WledInfo,
    /// Effect names.
    pub effects: Vec<String>,
    /// Palette names.
    pub palettes: Vec<String>,
}

impl WledFullStatus {
    /// Returns the effect and palette names as [`Capabilities`].
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::new(self.effects.clone(), self.palettes.clone())
    }
}

/// A partial update of a single [`Segment`].
///
/// Only the fields set through the builder methods are sent to a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct SegmentUpdate {
    /// Identifier of the segment to update.
    pub id: u8,
    /// Effect identifier.
    #[serde(rename = "fx", skip_serializing_if = "Option::is_none", default)]
    pub effect: Option<u16>,
    /// Palette identifier.
    #[serde(rename = "pal", skip_serializing_if = "Option::is_none", default)]
    pub palette: Option<u16>,
    /// Colors.
    #[serde(rename = "col", skip_serializing_if = "Option::is_none", default)]
    pub colors: Option<Vec<[u8; 3]>>,
    /// Whether the segment is on.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub on: Option<bool>,
    /// Segment brightness.
    #[serde(rename = "bri", skip_serializing_if = "Option::is_none", default)]
    pub brightness: Option<u8>,
    /// Effect speed.
    #[serde(rename = "sx", skip_serializing_if = "Option::is_none", default)]
    pub speed: Option<u8>,
    /// Effect intensity.
    #[serde(rename = "ix", skip_serializing_if = "Option::is_none", default)]
    pub intensity: Option<u8>,
}

impl SegmentUpdate {
    /// Creates an empty [`SegmentUpdate`] for the given segment.
    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self {
            id,
            effect: None,
            palette: None,
            colors: None,
            on: None,
            brightness: None,
            speed: None,
            intensity: None,
        }
    }

    /// Sets the effect.
    #[must_use]
    pub const fn effect(mut self, effect: u16) -> Self {
        self.effect = Some(effect);
        self
    }

    /// Sets the palette.
    #[must_use]
    pub const fn palette(mut self, palette: u16) -> Self {
        self.palette = Some(palette);
        self
    }

    /// Sets the primary color.
    #[must_use]
    pub fn color(mut self, r: u8, g: u8, b: u8) -> Self {
        self.colors = Some(alloc::vec![[r, g, b]]);
        self
    }

    /// Turns the segment on or off.
    #[must_use]
    pub const fn on(mut self, on: bool) -> Self {
        self.on = Some(on);
        self
    }

    /// Sets the segment brightness.
    #[must_use]
    pub const fn brightness(mut self, brightness: u8) -> Self {
        self.brightness = Some(brightness);
        self
    }

    /// Sets the effect speed.
    #[must_use]
    pub const fn speed(mut self, speed: u8) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Sets the effect intensity.
    #[must_use]
    pub const fn intensity(mut self, intensity: u8) -> Self {
        self.intensity = Some(intensity);
        self
    }
}

/// A partial update of a [`WledState`].
///
/// Only the fields set through the builder methods are sent to a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct StateUpdate {
    /// Whether the device is on.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub on: Option<bool>,
    /// Master brightness.
    #[serde(rename = "bri", skip_serializing_if = "Option::is_none", default)]
    pub brightness: Option<u8>,
    /// Transition time, in tenths of a second.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub transition: Option<u16>,
    /// Preset to apply.
    #[serde(rename = "ps", skip_serializing_if = "Option::is_none", default)]
    pub preset: Option<i16>,
    /// Playlist to apply.
    #[serde(rename = "pl", skip_serializing_if = "Option::is_none", default)]
    pub playlist: Option<i16>,
    /// Segment updates.
    #[serde(rename = "seg", skip_serializing_if = "Option::is_none", default)]
    pub segments: Option<Vec<SegmentUpdate>>,
}

impl StateUpdate {
    /// Creates an empty [`StateUpdate`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            on: None,
            brightness: None,
            transition: None,
            preset: None,
            playlist: None,
            segments: None,
        }
    }

    /// Turns the device on or off.
    #[must_use]
    pub const fn on(mut self, on: bool) -> Self {
        self.on = Some(on);
        self
    }

    /// Sets the master brightness.
    #[must_use]
    pub const fn brightness(mut self, brightness: u8) -> Self {
        self.brightness = Some(brightness);
        self
    }

    /// Sets the transition time, in tenths of a second.
    #[must_use]
    pub const fn transition(mut self, transition: u16) -> Self {
        self.transition = Some(transition);
        self
    }

    /// Applies a preset.
    #[must_use]
    pub const fn preset(mut self, preset: i16) -> Self {
        self.preset = Some(preset);
        self
    }

    /// Applies a playlist.
    #[must_use]
    pub const fn playlist(mut self, playlist: i16) -> Self {
        self.playlist = Some(playlist);
        self
    }

    /// Adds a [`SegmentUpdate`].
    #[must_use]
    pub fn segment(mut self, segment: SegmentUpdate) -> Self {
        self.segments.get_or_insert_with(Vec::new).push(segment);
        self
    }

    /// Applies the update to a [`WledState`], as a device does.
    pub fn apply(&self, state: &mut WledState) {
        if let Some(on) = self.on {
            state.on = on;
        }
        if let Some(brightness) = self.brightness {
            state.brightness = brightness;
        }
        if let Some(transition) = self.transition {
            state.transition = transition;
        }
        if let Some(preset) = self.preset {
            state.preset = preset;
        }
        if let Some(playlist) = self.playlist {
            state.playlist = playlist;
        }

        let Some(ref segments) = self.segments else {
            return;
        };

        for update in segments {
            let Some(segment) = state.segments.iter_mut().find(|s| s.id == update.id) else {
                continue;
            };
            if let Some(effect) = update.effect {
                segment.effect = effect;
            }
            if let Some(palette) = update.palette {
                segment.palette = palette;
            }
            if let Some(ref colors) = update.colors {
                segment.colors = colors.iter().map(|c| c.to_vec()).collect();
            }
            if let Some(on) = update.on {
                segment.on = on;
            }
            if let Some(brightness) = update.brightness {
                segment.brightness = brightness;
            }
            if let Some(speed) = update.speed {
                segment.speed = speed;
            }
            if let Some(intensity) = update.intensity {
                segment.intensity = intensity;
            }
        }
    }
}

/// A preset slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Preset {
    /// Slot number, starting from 1.
    pub slot: u8,
    /// Preset name.
    #[serde(rename = "n")]
    pub name: String,
}

impl Preset {
    /// Returns all preset slots with their placeholder names.
    ///
    /// A device does not expose preset names through its `JSON` API, so
    /// slots are named after their number.
    #[must_use]
    pub fn slots() -> Vec<Self> {
        (1..=PRESET_SLOTS)
            .map(|slot| Self {
                slot,
                name: format!("Preset {slot}"),
            })
            .collect()
    }
}

#[cfg(test)]
#[cfg(feature = "deserialize")]
mod tests {
    use alloc::string::ToString;
    use alloc::vec;

    use serde_json::json;

    use crate::{deserialize, serialize};

    use super::{Preset, Segment, SegmentUpdate, StateUpdate, WledFullStatus, WledInfo, WledState};

    #[test]
    fn deserialize_info() {
        let info: WledInfo = deserialize(json!({
            "ver": "0.14.0",
            "vid": 2_310_130,
            "leds": {
                "count": 60,
                "rgbw": false,
                "pin": [2],
                "pwr": 450,
                "maxpwr": 850,
                "maxseg": 16,
                "fps": 42,
            },
            "name": "Hole 1",
            "udpport": 21324,
            "live": false,
            "fxcount": 187,
            "palcount": 71,
            "arch": "esp32",
            "core": "v3.3.6",
            "freeheap": 150_000,
            "uptime": 3600,
            "brand": "WLED",
            "product": "FOSS",
            "mac": "aabbccddeeff",
            "unknown": { "ignored": true },
        }));

        assert_eq!(info.version, "0.14.0");
        assert_eq!(info.leds.count, 60);
        assert_eq!(info.leds.pins, vec![2]);
        assert_eq!(info.leds.max_power, 850);
        assert_eq!(info.effect_count, 187);
        assert_eq!(info.palette_count, 71);
        assert_eq!(info.name, "Hole 1");
    }

    #[test]
    fn deserialize_partial_state() {
        let state: WledState = deserialize(json!({
            "on": true,
            "bri": 128,
            "seg": [{ "id": 0, "fx": 9, "pal": 6, "col": [[255, 0, 0]] }],
        }));

        assert!(state.on);
        assert_eq!(state.brightness, 128);
        assert_eq!(state.transition, 0);
        assert_eq!(
            state.segments,
            vec![Segment {
                id: 0,
                effect: 9,
                palette: 6,
                colors: vec![vec![255, 0, 0]],
                ..Segment::default()
            }]
        );
    }

    #[test]
    fn serialize_state_update() {
        assert_eq!(serialize(StateUpdate::new()), json!({}));

        assert_eq!(
            serialize(StateUpdate::new().on(true).brightness(200)),
            json!({ "on": true, "bri": 200 })
        );

        assert_eq!(
            serialize(StateUpdate::new().segment(SegmentUpdate::new(0).effect(12))),
            json!({ "seg": [{ "id": 0, "fx": 12 }] })
        );

        assert_eq!(
            serialize(StateUpdate::new().segment(SegmentUpdate::new(1).color(10, 20, 30))),
            json!({ "seg": [{ "id": 1, "col": [[10, 20, 30]] }] })
        );

        assert_eq!(serialize(StateUpdate::new().preset(3)), json!({ "ps": 3 }));
    }

    #[test]
    fn apply_state_update() {
        let mut state = WledState {
            segments: vec![Segment::default()],
            ..WledState::default()
        };

        StateUpdate::new()
            .on(true)
            .brightness(42)
            .segment(SegmentUpdate::new(0).palette(4).color(1, 2, 3))
            // Unknown segments are ignored.
            .segment(SegmentUpdate::new(7).effect(1))
            .apply(&mut state);

        assert!(state.on);
        assert_eq!(state.brightness, 42);
        assert_eq!(state.segments.len(), 1);
        assert_eq!(state.segments[0].palette, 4);
        assert_eq!(state.segments[0].colors, vec![vec![1, 2, 3]]);
        assert_eq!(state.segments[0].effect, 0);
    }

    #[test]
    fn full_status_capabilities() {
        let status = WledFullStatus {
            effects: vec!["Solid".to_string()],
            palettes: vec!["Default".to_string()],
            ..WledFullStatus::default()
        };

        let capabilities = status.capabilities();
        assert_eq!(capabilities.effect_id("Solid"), Some(0));
        assert_eq!(capabilities.palette_id("Default"), Some(0));
    }

    #[test]
    fn preset_slots() {
        let presets = Preset::slots();

        assert_eq!(presets.len(), 16);
        assert_eq!(
            presets[0],
            Preset {
                slot: 1,
                name: "Preset 1".to_string()
            }
        );
        assert_eq!(presets[15].name, "Preset 16");
        assert_eq!(serialize(&presets[2]), json!({ "slot": 3, "n": "Preset 3" }));
    }
}
