//! The data exchanged between a `glint` controller and the services it
//! drives.
//!
//! This crate provides the `JSON` models of:
//!
//! - `WLED` devices, the LED-strip controllers reached through their
//!   `/json/*` endpoints. A device reports its information, its current state
//!   and the lists of effects and palettes it can render, and accepts partial
//!   state updates.
//! - The capability snapshot, the effect and palette names of a device,
//!   which a controller caches because it rarely changes.
//! - A `Home Assistant` hub reached through its `REST` API.
//! - An `LEDfx` engine reached through its `REST` API.
//!
//! Every model is serializable. A controller deserializes them, so
//! deserialization is available behind the `deserialize` feature, which an
//! emulated device can disable at compile time.
//!
//! Unknown fields are ignored and most fields fall back to their default
//! value, since the firmware versions found on a network rarely agree on a
//! schema.
//!
//! This crate can be compiled for both `std` and `no_std` environments.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

extern crate alloc;

/// Effect and palette names reported by a device.
pub mod capabilities;
/// `Home Assistant` hub models.
pub mod hass;
/// `LEDfx` engine models.
pub mod ledfx;
/// `WLED` device models.
pub mod wled;

#[cfg(test)]
#[cfg(feature = "deserialize")]
pub(crate) fn serialize<T: serde::Serialize>(value: T) -> serde_json::Value {
    serde_json::to_value(value).unwrap()
}

#[cfg(test)]
#[cfg(feature = "deserialize")]
pub(crate) fn deserialize<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
    serde_json::from_value(value).unwrap()
}
