//! One live logical connection to the wearable.
//!
//! A session is created only after a successful connect to a name-matched
//! peer and walks through service discovery, characteristic discovery, and
//! notification setup.  It decodes inbound frames, issues outbound writes,
//! and announces readiness changes on the event bus.  At most one session
//! exists at any time; the connection actor owns it.

use std::sync::Arc;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::protocol::{decode_frame, WEARABLE_CHARACTERISTIC_UUID, WEARABLE_SERVICE_UUID};
use crate::transport::Radio;
use crate::types::{PeerId, WearableEvent};

/// Discovery progress.  Handles only exist in the states where they are
/// valid: there is no nullable characteristic field to dereference too early.
enum Stage {
    AwaitingService,
    AwaitingCharacteristic { service: Uuid },
    Ready { characteristic: Uuid },
}

pub(crate) struct ServiceSession {
    peer: PeerId,
    name: String,
    stage: Stage,
    /// Set once `reset` has run, so teardown announces `connected: false`
    /// exactly once however many times it is invoked.
    released: bool,
}

impl ServiceSession {
    pub(crate) fn new(peer: PeerId, name: String) -> Self {
        Self {
            peer,
            name,
            stage: Stage::AwaitingService,
            released: false,
        }
    }

    pub(crate) fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Fully negotiated: characteristic bound and notifications enabled.
    pub(crate) fn ready(&self) -> bool {
        matches!(self.stage, Stage::Ready { .. })
    }

    /// Kick off discovery of the expected service on the peer.
    pub(crate) async fn begin(&self, radio: &Arc<dyn Radio>) {
        if let Err(e) = radio.discover_services(&self.peer).await {
            // Non-fatal: the peer will be torn down by its disconnect event,
            // or stay connected-but-mute until one arrives.
            warn!("Service discovery on {} failed: {e}", self.name);
        }
    }

    /// A service turned up during discovery.  Responses for stale peers or
    /// foreign services are ignored.
    pub(crate) async fn on_service_discovered(
        &mut self,
        radio: &Arc<dyn Radio>,
        peer: &PeerId,
        service: Uuid,
    ) {
        if *peer != self.peer || !matches!(self.stage, Stage::AwaitingService) {
            return;
        }
        if service != WEARABLE_SERVICE_UUID {
            return;
        }
        self.stage = Stage::AwaitingCharacteristic { service };
        if let Err(e) = radio.discover_characteristics(peer, service).await {
            warn!("Characteristic discovery on {} failed: {e}", self.name);
        }
    }

    /// A characteristic turned up.  On the expected one, bind it, enable
    /// notifications, and announce full readiness — this is the signal
    /// consumers treat as "connected", not the bare link.
    pub(crate) async fn on_characteristic_discovered(
        &mut self,
        radio: &Arc<dyn Radio>,
        bus: &EventBus,
        peer: &PeerId,
        service: Uuid,
        characteristic: Uuid,
    ) {
        let Stage::AwaitingCharacteristic { service: expected } = &self.stage else {
            return;
        };
        if *peer != self.peer || service != *expected {
            return;
        }
        if characteristic != WEARABLE_CHARACTERISTIC_UUID {
            return;
        }
        if let Err(e) = radio.enable_notifications(peer, characteristic).await {
            warn!("Enabling notifications on {} failed: {e}", self.name);
            return;
        }
        self.stage = Stage::Ready { characteristic };
        info!("Session with {} is fully established", self.name);
        bus.publish(WearableEvent::Connection { connected: true });
    }

    /// An inbound notification.  Decoded frames become telemetry events;
    /// malformed ones are dropped without a trace to consumers.
    pub(crate) fn on_value(&self, bus: &EventBus, peer: &PeerId, data: &[u8]) {
        if *peer != self.peer || !self.ready() {
            return;
        }
        match decode_frame(data) {
            Some(frame) => bus.publish(WearableEvent::Telemetry {
                kind: frame.kind,
                value: frame.value,
            }),
            None => debug!("Dropping unrecognized frame ({} bytes)", data.len()),
        }
    }

    /// Write one frame to the characteristic, fire-and-forget.  A no-op until
    /// the session is fully established.
    pub(crate) async fn send_frame(&self, radio: &Arc<dyn Radio>, frame: &[u8]) {
        let Stage::Ready { characteristic } = &self.stage else {
            debug!("Ignoring outbound frame: session with {} not ready", self.name);
            return;
        };
        if let Err(e) = radio.write(&self.peer, *characteristic, frame).await {
            warn!("Write to {} failed, frame dropped: {e}", self.name);
        }
    }

    /// Tear down: release handles and announce `connected: false`.
    ///
    /// Idempotent — only the first call publishes, so every teardown path
    /// (disconnect, power-off, reconfiguration) yields exactly one event.
    pub(crate) fn reset(&mut self, bus: &EventBus) {
        if self.released {
            return;
        }
        self.released = true;
        self.stage = Stage::AwaitingService;
        info!("Session with {} torn down", self.name);
        bus.publish(WearableEvent::Connection { connected: false });
    }
}
