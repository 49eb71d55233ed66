//! The `glint-controller` library crate provides a set of APIs for driving
//! `WLED` LED-strip devices, and the `Home Assistant` and `LEDfx` services
//! usually deployed next to them, without overwhelming them.
//!
//! Embedded `HTTP` servers running on `WLED` devices handle only a handful of
//! connections at a time. This crate therefore routes every request through
//! a small stack of services:
//!
//! - A transport which sends a request with a hard timeout, reusing
//!   connections when possible, and keeps track of the devices it contacted
//! - A per-device scheduler which queues the requests addressed to the same
//!   device and dispatches them in small concurrent batches, pausing between
//!   two batches
//! - A cache for the effect and palette names of a device, which rarely
//!   change
//! - Typed clients translating operations such as "set the brightness" into
//!   requests
//!
//! A [`controller::Controller`] owns all services, periodically evicts
//! their stale entries and hands out clients sharing them.
//!
//! `tokio` is used as asynchronous executor. The requests addressed to
//! different devices run concurrently and independently of each other.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Capability cache.
pub mod cache;
/// The base client shared by all service clients.
pub mod client;
/// Configuration of all services.
pub mod config;
/// A controller owning all services.
pub mod controller;
/// Error management.
pub mod error;
/// `Home Assistant` client.
pub mod hass;
/// `LEDfx` client.
pub mod ledfx;
/// Per-device request scheduler.
pub mod scheduler;
/// `HTTP` transport.
pub mod transport;
/// `WLED` client.
pub mod wled;

#[cfg(test)]
mod tests;

// Shared state is never left inconsistent by a panic, so a poisoned lock is
// still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
