//! btleplug-backed implementation of the [`Radio`] capability interface.
//!
//! Owns the platform adapter and translates its [`CentralEvent`] stream into
//! [`RadioEvent`]s for the connection actor.  All the platform quirks live
//! here: the powered-on wait at startup, the connect timeout, the BlueZ GATT
//! settle delay, and the notification stream relay.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::transport::{Radio, RadioEvent};
use crate::types::{PeerId, PowerState};

fn map_state(state: CentralState) -> PowerState {
    match state {
        CentralState::PoweredOn => PowerState::On,
        CentralState::PoweredOff => PowerState::Off,
        _ => PowerState::Unknown,
    }
}

/// Production [`Radio`] over the first Bluetooth adapter btleplug reports.
pub struct BtleRadio {
    adapter: Adapter,
    tx: mpsc::Sender<RadioEvent>,
}

impl BtleRadio {
    /// Acquire the platform adapter and start forwarding its events into
    /// `tx`.
    ///
    /// Fails only when no Bluetooth adapter is present; everything after
    /// construction is reported through the event channel.
    pub async fn new(tx: mpsc::Sender<RadioEvent>) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;

        Self::spawn_event_relay(adapter.clone(), tx.clone());
        Self::spawn_initial_state_probe(adapter.clone(), tx.clone());

        Ok(Self { adapter, tx })
    }

    // ── Central event relay ───────────────────────────────────────────────────

    /// Forward adapter events (state changes, discoveries, link changes) to
    /// the actor.  Runs until the adapter event stream closes.
    fn spawn_event_relay(adapter: Adapter, tx: mpsc::Sender<RadioEvent>) {
        tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Could not subscribe to adapter events: {e}");
                    return;
                }
            };

            while let Some(event) = events.next().await {
                let forwarded = match event {
                    CentralEvent::StateUpdate(state) => {
                        Some(RadioEvent::PowerState(map_state(state)))
                    }
                    // DeviceUpdated matters too: the local name often arrives
                    // in a later scan-response advertisement.
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        let peer = PeerId(id.to_string());
                        let name = match adapter.peripheral(&id).await {
                            Ok(p) => p
                                .properties()
                                .await
                                .ok()
                                .flatten()
                                .and_then(|props| props.local_name),
                            Err(e) => {
                                debug!("Discovered peer {peer} has no peripheral yet: {e}");
                                None
                            }
                        };
                        Some(RadioEvent::PeerDiscovered { peer, name })
                    }
                    CentralEvent::DeviceConnected(id) => {
                        Some(RadioEvent::Connected(PeerId(id.to_string())))
                    }
                    CentralEvent::DeviceDisconnected(id) => {
                        Some(RadioEvent::Disconnected(PeerId(id.to_string())))
                    }
                    _ => None,
                };
                if let Some(event) = forwarded {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
            info!("Adapter event stream ended.");
        });
    }

    // ── Initial power state ───────────────────────────────────────────────────

    /// Report the adapter's power state once at startup.
    ///
    /// When the process is freshly launched (or Bluetooth was recently
    /// toggled), the central manager starts in an "unknown" state and a scan
    /// issued before it is ready is a silent no-op.  Poll for up to 3 s; if
    /// the state is still unknown after that, assume powered-on — some
    /// backends never report a state transition at all.
    fn spawn_initial_state_probe(adapter: Adapter, tx: mpsc::Sender<RadioEvent>) {
        tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
            loop {
                match adapter.adapter_state().await {
                    Ok(CentralState::PoweredOn) => {
                        let _ = tx.send(RadioEvent::PowerState(PowerState::On)).await;
                        return;
                    }
                    Ok(CentralState::PoweredOff) => {
                        // A later StateUpdate will report power restoration.
                        let _ = tx.send(RadioEvent::PowerState(PowerState::Off)).await;
                        return;
                    }
                    Ok(state) => {
                        if tokio::time::Instant::now() >= deadline {
                            warn!("Adapter still in state {state:?} after 3 s — proceeding anyway");
                            let _ = tx.send(RadioEvent::PowerState(PowerState::On)).await;
                            return;
                        }
                        debug!("Adapter state = {state:?}, waiting…");
                    }
                    Err(e) => {
                        warn!("adapter_state() error: {e} — assuming powered-on");
                        let _ = tx.send(RadioEvent::PowerState(PowerState::On)).await;
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        });
    }

    // ── Lookups ──────────────────────────────────────────────────────────────

    async fn find_peripheral(&self, peer: &PeerId) -> Result<Peripheral> {
        for p in self.adapter.peripherals().await? {
            if p.id().to_string() == peer.0 {
                return Ok(p);
            }
        }
        Err(anyhow!("Peripheral {peer} not known to the adapter"))
    }

    async fn find_characteristic(&self, peer: &PeerId, uuid: Uuid) -> Result<(Peripheral, Characteristic)> {
        let peripheral = self.find_peripheral(peer).await?;
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| anyhow!("Characteristic {uuid} not found on {peer}"))?;
        Ok((peripheral, characteristic))
    }
}

#[async_trait]
impl Radio for BtleRadio {
    async fn start_scan(&self, service: Uuid) -> Result<()> {
        info!("Scanning for peers advertising {service} …");
        self.adapter
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, peer: &PeerId) -> Result<()> {
        let peripheral = self.find_peripheral(peer).await?;
        let peer = peer.clone();
        let tx = self.tx.clone();
        // Hard timeout: BlueZ's org.bluez.Device1.Connect can block forever
        // when the device is out of range or the stack is in a bad state.
        // Ten seconds is generous for a BLE connection that typically takes
        // <2 s.  Success is reported by the adapter's DeviceConnected event.
        tokio::spawn(async move {
            let result = tokio::time::timeout(Duration::from_secs(10), peripheral.connect()).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("connect() to {peer} failed: {e}");
                    let _ = tx.send(RadioEvent::ConnectFailed(peer)).await;
                }
                Err(_) => {
                    warn!("connect() to {peer} timed out after 10 s");
                    let _ = tx.send(RadioEvent::ConnectFailed(peer)).await;
                }
            }
        });
        Ok(())
    }

    async fn disconnect(&self, peer: &PeerId) -> Result<()> {
        let peripheral = self.find_peripheral(peer).await?;
        peripheral.disconnect().await?;
        Ok(())
    }

    async fn discover_services(&self, peer: &PeerId) -> Result<()> {
        let peripheral = self.find_peripheral(peer).await?;

        // On Linux (bluez-async / D-Bus) the stack signals connection
        // completion before the remote GATT cache is populated; discovering
        // too quickly returns an empty set.  A short pause lets BlueZ finish
        // its own GATT discovery first.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(Duration::from_secs(15), peripheral.discover_services())
            .await
            .map_err(|_| anyhow!("discover_services() timed out after 15 s"))??;

        for service in peripheral.services() {
            self.tx
                .send(RadioEvent::ServiceDiscovered {
                    peer: peer.clone(),
                    service: service.uuid,
                })
                .await
                .ok();
        }
        Ok(())
    }

    async fn discover_characteristics(&self, peer: &PeerId, service: Uuid) -> Result<()> {
        let peripheral = self.find_peripheral(peer).await?;
        let found = peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
            .ok_or_else(|| anyhow!("Service {service} not found on {peer}"))?;

        for characteristic in found.characteristics {
            self.tx
                .send(RadioEvent::CharacteristicDiscovered {
                    peer: peer.clone(),
                    service,
                    characteristic: characteristic.uuid,
                })
                .await
                .ok();
        }
        Ok(())
    }

    async fn enable_notifications(&self, peer: &PeerId, characteristic: Uuid) -> Result<()> {
        let (peripheral, target) = self.find_characteristic(peer, characteristic).await?;
        peripheral.subscribe(&target).await?;

        let peer = peer.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    warn!("Could not get notification stream for {peer}: {e}");
                    return;
                }
            };
            info!("Notification stream subscribed for {peer}");
            while let Some(notification) = notifications.next().await {
                if notification.uuid != characteristic {
                    continue;
                }
                let event = RadioEvent::Value {
                    peer: peer.clone(),
                    data: notification.value,
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            // Stream end means the link dropped; DeviceDisconnected handles
            // the state transition.
            debug!("Notification stream for {peer} ended.");
        });
        Ok(())
    }

    async fn write(&self, peer: &PeerId, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let (peripheral, target) = self.find_characteristic(peer, characteristic).await?;
        peripheral
            .write(&target, data, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }
}
