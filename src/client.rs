//! Connection lifecycle: scanning, candidate matching, session hosting, and
//! automatic recovery.
//!
//! [`WearableClient`] spawns one actor task that owns all Device/Session
//! state and processes radio events and control messages strictly serially,
//! so no state is ever mutated concurrently and no locks are needed.
//! [`WearableHandle`] is the external surface: subscribe to events, issue
//! commands, rename the target, shut down.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc};

use crate::btle::BtleRadio;
use crate::bus::EventBus;
use crate::protocol::{OutboundCommand, WEARABLE_SERVICE_UUID};
use crate::session::ServiceSession;
use crate::transport::{Radio, RadioEvent};
use crate::types::{LedChannel, Melody, PeerId, PowerState, WearableEvent};

/// Capacity of the radio event channel feeding the actor.
pub const RADIO_EVENT_CAPACITY: usize = 64;

// ── Configuration ────────────────────────────────────────────────────────────

/// Configuration for [`WearableClient`].
#[derive(Debug, Clone)]
pub struct WearableConfig {
    /// Advertised name of the wearable to connect to.  Only peers whose name
    /// equals this exactly are accepted; it can be changed at runtime with
    /// [`WearableHandle::set_device_name`].
    pub device_name: String,
}

impl Default for WearableConfig {
    fn default() -> Self {
        Self {
            device_name: "wearable".into(),
        }
    }
}

// ── Control messages ─────────────────────────────────────────────────────────

enum ControlMsg {
    Send(OutboundCommand),
    SetDeviceName(String),
    Shutdown,
}

// ── Connection state machine ─────────────────────────────────────────────────

/// Each variant carries only the data valid in that state.
enum LinkState {
    /// Radio not powered on (or powered off again).  Scanning resumes
    /// automatically on power restoration.
    Idle,
    /// Scanning for a peer advertising the wearable service.
    Scanning,
    /// A connect request to a name-matched peer is in flight.  The scan keeps
    /// running until the connection is confirmed.
    Connecting { peer: PeerId, name: String },
    /// Link up; the session walks through discovery and then streams.
    Connected { session: ServiceSession },
}

struct ConnectionManager {
    radio: Arc<dyn Radio>,
    bus: EventBus,
    target_name: String,
    state: LinkState,
}

impl ConnectionManager {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<RadioEvent>,
        mut ctrl: mpsc::Receiver<ControlMsg>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.on_radio_event(event).await,
                    None => {
                        info!("Radio event stream closed — stopping");
                        break;
                    }
                },
                msg = ctrl.recv() => match msg {
                    Some(ControlMsg::Send(cmd)) => self.on_send(cmd).await,
                    Some(ControlMsg::SetDeviceName(name)) => self.on_rename(name).await,
                    // All handles dropped counts as a shutdown request.
                    Some(ControlMsg::Shutdown) | None => {
                        self.shutdown().await;
                        break;
                    }
                },
            }
        }
    }

    // ── Radio events ─────────────────────────────────────────────────────────

    async fn on_radio_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::PowerState(state) => self.on_power_state(state).await,
            RadioEvent::PeerDiscovered { peer, name } => self.on_peer_discovered(peer, name).await,
            RadioEvent::Connected(peer) => self.on_link_up(peer).await,
            RadioEvent::ConnectFailed(peer) => self.on_connect_failed(peer),
            RadioEvent::Disconnected(peer) => self.on_link_down(peer).await,
            RadioEvent::ServiceDiscovered { peer, service } => {
                if let LinkState::Connected { session } = &mut self.state {
                    session
                        .on_service_discovered(&self.radio, &peer, service)
                        .await;
                }
            }
            RadioEvent::CharacteristicDiscovered {
                peer,
                service,
                characteristic,
            } => {
                if let LinkState::Connected { session } = &mut self.state {
                    session
                        .on_characteristic_discovered(
                            &self.radio,
                            &self.bus,
                            &peer,
                            service,
                            characteristic,
                        )
                        .await;
                }
            }
            RadioEvent::Value { peer, data } => {
                if let LinkState::Connected { session } = &self.state {
                    session.on_value(&self.bus, &peer, &data);
                }
            }
        }
    }

    async fn on_power_state(&mut self, state: PowerState) {
        match state {
            PowerState::On => {
                // No-op when already scanning or connected.
                if matches!(self.state, LinkState::Idle) {
                    self.enter_scanning().await;
                }
            }
            // Tear down immediately — the stack will not deliver a disconnect
            // callback for a radio that just vanished.
            PowerState::Off | PowerState::Resetting => {
                if let LinkState::Connected { session } = &mut self.state {
                    session.reset(&self.bus);
                }
                self.state = LinkState::Idle;
            }
            PowerState::Unauthorized | PowerState::Unsupported | PowerState::Unknown => {}
        }
    }

    /// Candidate filter: non-empty advertised name, equal to the configured
    /// target, and no session in existence or in progress.  The scan is left
    /// running — it only stops once the connection is confirmed.
    async fn on_peer_discovered(&mut self, peer: PeerId, name: Option<String>) {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return;
        };
        if !matches!(self.state, LinkState::Scanning) {
            return;
        }
        if name != self.target_name {
            debug!("Ignoring peer {name:?} (looking for {:?})", self.target_name);
            return;
        }
        info!("Found {name} ({peer}) — connecting …");
        self.state = LinkState::Connecting {
            peer: peer.clone(),
            name,
        };
        if let Err(e) = self.radio.connect(&peer).await {
            warn!("Connect request to {peer} failed: {e}");
            self.state = LinkState::Scanning;
        }
    }

    async fn on_link_up(&mut self, peer: PeerId) {
        let LinkState::Connecting {
            peer: expected,
            name,
        } = &self.state
        else {
            return;
        };
        if *expected != peer {
            return;
        }
        let name = name.clone();

        if let Err(e) = self.radio.stop_scan().await {
            warn!("Could not stop scan: {e}");
        }
        let session = ServiceSession::new(peer, name);
        session.begin(&self.radio).await;
        self.state = LinkState::Connected { session };
    }

    /// Failed connects are silent: back to scanning, no backoff, no event.
    fn on_connect_failed(&mut self, peer: PeerId) {
        if let LinkState::Connecting { peer: expected, .. } = &self.state {
            if *expected == peer {
                debug!("Connect to {peer} failed — resuming scan");
                self.state = LinkState::Scanning;
            }
        }
    }

    async fn on_link_down(&mut self, peer: PeerId) {
        match &mut self.state {
            LinkState::Connected { session } if *session.peer() == peer => {
                session.reset(&self.bus);
                self.enter_scanning().await;
            }
            LinkState::Connecting { peer: expected, .. } if *expected == peer => {
                // Link dropped mid-handshake; the scan is still running.
                self.state = LinkState::Scanning;
            }
            _ => {}
        }
    }

    // ── Control messages ─────────────────────────────────────────────────────

    /// Outbound commands are accepted only with a fully established session;
    /// otherwise they are no-ops, not errors.
    async fn on_send(&mut self, cmd: OutboundCommand) {
        let LinkState::Connected { session } = &self.state else {
            debug!("Ignoring command {cmd:?}: no active session");
            return;
        };
        for frame in cmd.frames() {
            session.send_frame(&self.radio, &frame).await;
        }
    }

    /// A new target name tears down whatever exists — even a healthy session
    /// with a different device — and rescans.
    async fn on_rename(&mut self, name: String) {
        info!("Target device name set to {name:?}");
        self.target_name = name;
        match std::mem::replace(&mut self.state, LinkState::Idle) {
            LinkState::Connected { mut session } => {
                session.reset(&self.bus);
                let peer = session.peer().clone();
                if let Err(e) = self.radio.disconnect(&peer).await {
                    debug!("Disconnect of {peer} failed: {e}");
                }
                self.enter_scanning().await;
            }
            LinkState::Connecting { .. } | LinkState::Scanning => {
                // Scan already running; the new name applies to the next
                // discovery.  An in-flight connect is abandoned.
                self.state = LinkState::Scanning;
            }
            LinkState::Idle => {
                // Radio is off; scanning resumes on power restoration.
            }
        }
    }

    async fn shutdown(&mut self) {
        match std::mem::replace(&mut self.state, LinkState::Idle) {
            LinkState::Connected { mut session } => {
                session.reset(&self.bus);
                let peer = session.peer().clone();
                self.radio.disconnect(&peer).await.ok();
            }
            LinkState::Connecting { .. } | LinkState::Scanning => {
                self.radio.stop_scan().await.ok();
            }
            LinkState::Idle => {}
        }
        info!("Connection manager stopped.");
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    async fn enter_scanning(&mut self) {
        self.state = LinkState::Scanning;
        if let Err(e) = self.radio.start_scan(WEARABLE_SERVICE_UUID).await {
            // Stay in Scanning: a later power transition restarts the scan.
            warn!("Could not start scan: {e}");
        }
    }
}

// ── WearableClient ───────────────────────────────────────────────────────────

/// Entry point: owns the configuration and spawns the connection actor.
///
/// Construct one instance at the process's composition root and hand the
/// returned [`WearableHandle`] to whatever consumes events or issues
/// commands.  There is no global instance.
pub struct WearableClient {
    config: WearableConfig,
}

impl WearableClient {
    pub fn new(config: WearableConfig) -> Self {
        Self { config }
    }

    /// Start against the platform BLE stack.
    ///
    /// Scanning begins as soon as the adapter reports powered-on and the
    /// client keeps reconnecting to the configured device until
    /// [`WearableHandle::shutdown`] — device loss, radio power cycles, and
    /// failed connects all lead back to scanning.
    pub async fn start(self) -> Result<WearableHandle> {
        let (radio_tx, radio_rx) = mpsc::channel(RADIO_EVENT_CAPACITY);
        let radio = BtleRadio::new(radio_tx).await?;
        Ok(self.start_with_radio(Arc::new(radio), radio_rx))
    }

    /// Start against a caller-supplied [`Radio`] feeding `events`.
    ///
    /// This is the seam for alternative transports and for tests, which drive
    /// the state machine by injecting [`RadioEvent`]s.
    pub fn start_with_radio(
        self,
        radio: Arc<dyn Radio>,
        events: mpsc::Receiver<RadioEvent>,
    ) -> WearableHandle {
        let bus = EventBus::new();
        let (ctrl_tx, ctrl_rx) = mpsc::channel(32);

        let manager = ConnectionManager {
            radio,
            bus: bus.clone(),
            target_name: self.config.device_name,
            state: LinkState::Idle,
        };
        tokio::spawn(manager.run(events, ctrl_rx));

        WearableHandle { ctrl: ctrl_tx, bus }
    }
}

// ── WearableHandle ───────────────────────────────────────────────────────────

/// Handle to a running [`WearableClient`].
///
/// Cheap to clone.  Commands are relayed to the connection actor and are
/// no-ops while no session is fully established; events are received through
/// [`WearableHandle::subscribe`].
#[derive(Clone)]
pub struct WearableHandle {
    ctrl: mpsc::Sender<ControlMsg>,
    bus: EventBus,
}

impl WearableHandle {
    /// Subscribe to connection and telemetry events.
    pub fn subscribe(&self) -> broadcast::Receiver<WearableEvent> {
        self.bus.subscribe()
    }

    /// Set one LED color channel (0–255).
    pub async fn set_led(&self, channel: LedChannel, value: u8) -> Result<()> {
        self.send(OutboundCommand::Led { channel, value }).await
    }

    /// Turn the LED off on all channels.
    pub async fn led_off(&self) -> Result<()> {
        self.send(OutboundCommand::LedOff).await
    }

    /// Play one of the three melodies stored on the kit.
    pub async fn play_melody(&self, melody: Melody) -> Result<()> {
        self.send(OutboundCommand::Melody(melody)).await
    }

    /// Request fresh temperature, luminosity, and accelerometer readings.
    /// Results arrive as [`WearableEvent::Telemetry`].
    pub async fn poll_sensors(&self) -> Result<()> {
        self.send(OutboundCommand::PollSensors).await
    }

    /// Write a raw pre-formatted frame (e.g. `"#LL0000\n\r"`) verbatim.
    pub async fn send_frame(&self, frame: impl Into<String>) -> Result<()> {
        self.send(OutboundCommand::Raw(frame.into())).await
    }

    /// Change the target device name.  Always tears down the current session
    /// (if any) and rescans for the new name.
    pub async fn set_device_name(&self, name: impl Into<String>) -> Result<()> {
        self.relay(ControlMsg::SetDeviceName(name.into())).await
    }

    /// Disconnect and stop the connection actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.relay(ControlMsg::Shutdown).await
    }

    async fn send(&self, cmd: OutboundCommand) -> Result<()> {
        self.relay(ControlMsg::Send(cmd)).await
    }

    async fn relay(&self, msg: ControlMsg) -> Result<()> {
        self.ctrl
            .send(msg)
            .await
            .map_err(|_| anyhow!("wearable client stopped"))
    }
}
