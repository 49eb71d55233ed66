//! Emulated `WLED` devices, `Home Assistant` hubs and `LEDfx` engines.
//!
//! Every emulator is an `axum` server bound to a random port on the
//! loopback interface. Each one keeps its state in memory, so a change
//! applied through a request is visible to the following ones.
//!
//! The returned [`MockServer`] controls the running emulator:
//!
//! - It injects latency, either for every request or for a single one
//!   through the `delay` query parameter, expressed in milliseconds
//! - It makes every request fail with a given status code
//! - It records the received requests and the maximum number of requests
//!   handled at the same time

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod hass;
mod ledfx;
mod server;
mod wled;

pub use hass::MockHomeAssistant;
pub use ledfx::MockLedfx;
pub use server::{MockServer, RecordedRequest};
pub use wled::MockWled;
