//! The narrow capability interface between the connection state machine and
//! the platform BLE stack.
//!
//! The state machine never touches a native radio API.  It consumes a single
//! stream of [`RadioEvent`]s and drives the radio through the [`Radio`]
//! trait, whose operations are all fire-and-forget: completion (or failure)
//! is reported back as a later event, mirroring how every platform BLE stack
//! actually behaves.  [`crate::btle::BtleRadio`] is the production
//! implementation; tests substitute their own.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::types::{PeerId, PowerState};

/// Everything the radio stack reports back to the connection actor.
///
/// All variants are delivered on one `mpsc` channel and processed serially,
/// so Device/Session state is never mutated concurrently.
#[derive(Debug, Clone)]
pub enum RadioEvent {
    /// The adapter's power state changed (or was first observed).
    PowerState(PowerState),
    /// A peer appeared (or updated its advertisement) during a scan.
    ///
    /// `name` is `None` when the advertisement carried no local name; such
    /// peers are never connection candidates.
    PeerDiscovered { peer: PeerId, name: Option<String> },
    /// A connect request completed and the link is up.
    Connected(PeerId),
    /// A connect request failed or timed out.
    ConnectFailed(PeerId),
    /// The link to a previously connected peer dropped.
    Disconnected(PeerId),
    /// Service discovery found a service on the peer (one event per service).
    ServiceDiscovered { peer: PeerId, service: Uuid },
    /// Characteristic discovery found a characteristic within a service
    /// (one event per characteristic).
    CharacteristicDiscovered {
        peer: PeerId,
        service: Uuid,
        characteristic: Uuid,
    },
    /// A value notification arrived on the subscribed characteristic.
    Value { peer: PeerId, data: Vec<u8> },
}

/// Operations the connection actor issues to the radio stack.
///
/// Implementations report progress through [`RadioEvent`]s; a returned `Err`
/// means the request could not even be issued.  All errors are non-fatal to
/// the caller — the state machine logs them and falls back to scanning.
#[async_trait]
pub trait Radio: Send + Sync {
    /// Start a scan filtered to peers advertising `service`.
    async fn start_scan(&self, service: Uuid) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    /// Request a connection to `peer`.  Outcome arrives as
    /// [`RadioEvent::Connected`] or [`RadioEvent::ConnectFailed`].
    async fn connect(&self, peer: &PeerId) -> Result<()>;

    async fn disconnect(&self, peer: &PeerId) -> Result<()>;

    /// Enumerate the peer's services; results arrive as
    /// [`RadioEvent::ServiceDiscovered`] events.
    async fn discover_services(&self, peer: &PeerId) -> Result<()>;

    /// Enumerate the characteristics of `service` on the peer; results arrive
    /// as [`RadioEvent::CharacteristicDiscovered`] events.
    async fn discover_characteristics(&self, peer: &PeerId, service: Uuid) -> Result<()>;

    /// Subscribe to value notifications on `characteristic`; each
    /// notification arrives as a [`RadioEvent::Value`].
    async fn enable_notifications(&self, peer: &PeerId, characteristic: Uuid) -> Result<()>;

    /// Write `data` to `characteristic` without response (fire-and-forget;
    /// the transport does not guarantee delivery and nothing retries).
    async fn write(&self, peer: &PeerId, characteristic: Uuid, data: &[u8]) -> Result<()>;
}
