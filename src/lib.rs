//! # wearable-rs
//!
//! Async Rust client for the Telefonica VIVO IoT wearable kit over Bluetooth
//! Low Energy.
//!
//! The kit is an HM-10-class BLE UART peripheral: one service (`FFE0`) with a
//! single notifiable/writable characteristic (`FFE1`) carrying short ASCII
//! frames.  This crate connects to exactly one kit by its advertised name,
//! keeps reconnecting across device loss and radio power cycles, streams its
//! sensor telemetry (temperature, luminosity, 3-axis acceleration), and sends
//! actuator commands (RGB LED, melodies).
//!
//! ## Quick start
//!
//! ```no_run
//! use wearable_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = WearableClient::new(WearableConfig {
//!         device_name: "wearable".into(),
//!     });
//!     let handle = client.start().await?;
//!     let mut events = handle.subscribe();
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             WearableEvent::Connection { connected: true } => {
//!                 handle.poll_sensors().await?;
//!             }
//!             WearableEvent::Telemetry { kind, value } => {
//!                 println!("{kind}: {value}");
//!             }
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the commonly needed types |
//! | [`client`] | Connection lifecycle actor, [`client::WearableClient`] and the [`client::WearableHandle`] command API |
//! | [`types`] | Event and data types delivered to subscribers |
//! | [`protocol`] | GATT UUIDs and the `#XXNNNN\n\r` frame codec |
//! | [`bus`] | Broadcast event channel shared by all subscribers |
//! | [`transport`] | The [`transport::Radio`] capability trait and its event stream |
//! | [`btle`] | btleplug adapter implementing [`transport::Radio`] |

pub mod btle;
pub mod bus;
pub mod client;
pub mod protocol;
pub mod transport;
pub mod types;

mod session;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Client ────────────────────────────────────────────────────────────────
    pub use crate::client::{WearableClient, WearableConfig, WearableHandle};

    // ── Events and data types ─────────────────────────────────────────────────
    pub use crate::types::{
        LedChannel, Melody, PeerId, PowerState, TelemetryFrame, TelemetryKind, WearableEvent,
    };

    // ── Protocol constants ────────────────────────────────────────────────────
    pub use crate::protocol::{
        OutboundCommand, LED_MAX, WEARABLE_CHARACTERISTIC_UUID, WEARABLE_SERVICE_UUID,
    };
}
