//! Connection lifecycle tests driven through a fake radio.
//!
//! The fake records every operation the state machine issues and the tests
//! inject [`RadioEvent`]s to walk it through discovery, connection, teardown,
//! and recovery, asserting both the published [`WearableEvent`]s and the
//! exact calls made on the radio.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use uuid::Uuid;

use wearable_rs::client::{WearableClient, WearableConfig, WearableHandle};
use wearable_rs::protocol::{WEARABLE_CHARACTERISTIC_UUID, WEARABLE_SERVICE_UUID};
use wearable_rs::transport::{Radio, RadioEvent};
use wearable_rs::types::{LedChannel, PeerId, PowerState, TelemetryKind, WearableEvent};

// ── Fake radio ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Call {
    StartScan(Uuid),
    StopScan,
    Connect(PeerId),
    Disconnect(PeerId),
    DiscoverServices(PeerId),
    DiscoverCharacteristics(PeerId, Uuid),
    EnableNotifications(PeerId, Uuid),
    Write(PeerId, Uuid, Vec<u8>),
}

/// Records every call; all operations succeed immediately.  Outcomes are
/// driven by the test injecting events, exactly like a real radio stack.
#[derive(Clone, Default)]
struct FakeRadio {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeRadio {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    /// Wait until a call matching `pred` has been recorded.
    async fn wait_for(&self, pred: impl Fn(&Call) -> bool) -> Call {
        timeout(Duration::from_secs(1), async {
            loop {
                if let Some(call) = self.calls().into_iter().find(|c| pred(c)) {
                    return call;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("expected radio call was never made")
    }
}

#[async_trait]
impl Radio for FakeRadio {
    async fn start_scan(&self, service: Uuid) -> Result<()> {
        self.record(Call::StartScan(service));
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.record(Call::StopScan);
        Ok(())
    }

    async fn connect(&self, peer: &PeerId) -> Result<()> {
        self.record(Call::Connect(peer.clone()));
        Ok(())
    }

    async fn disconnect(&self, peer: &PeerId) -> Result<()> {
        self.record(Call::Disconnect(peer.clone()));
        Ok(())
    }

    async fn discover_services(&self, peer: &PeerId) -> Result<()> {
        self.record(Call::DiscoverServices(peer.clone()));
        Ok(())
    }

    async fn discover_characteristics(&self, peer: &PeerId, service: Uuid) -> Result<()> {
        self.record(Call::DiscoverCharacteristics(peer.clone(), service));
        Ok(())
    }

    async fn enable_notifications(&self, peer: &PeerId, characteristic: Uuid) -> Result<()> {
        self.record(Call::EnableNotifications(peer.clone(), characteristic));
        Ok(())
    }

    async fn write(&self, peer: &PeerId, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.record(Call::Write(peer.clone(), characteristic, data.to_vec()));
        Ok(())
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    radio: FakeRadio,
    tx: mpsc::Sender<RadioEvent>,
    handle: WearableHandle,
    events: broadcast::Receiver<WearableEvent>,
}

fn start(device_name: &str) -> Harness {
    let radio = FakeRadio::default();
    let (tx, rx) = mpsc::channel(64);
    let handle = WearableClient::new(WearableConfig {
        device_name: device_name.into(),
    })
    .start_with_radio(Arc::new(radio.clone()), rx);
    let events = handle.subscribe();
    Harness {
        radio,
        tx,
        handle,
        events,
    }
}

fn peer_a() -> PeerId {
    PeerId("aa:bb:cc:dd:ee:01".into())
}

fn peer_b() -> PeerId {
    PeerId("aa:bb:cc:dd:ee:02".into())
}

impl Harness {
    async fn inject(&self, event: RadioEvent) {
        self.tx.send(event).await.expect("actor stopped");
    }

    async fn next_event(&mut self) -> WearableEvent {
        timeout(Duration::from_secs(1), self.events.recv())
            .await
            .expect("no event published in time")
            .expect("event channel closed")
    }

    /// Give the actor time to process injected events, then assert nothing
    /// was published.
    async fn assert_no_event(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            matches!(self.events.try_recv(), Err(broadcast::error::TryRecvError::Empty)),
            "unexpected event published"
        );
    }

    /// Walk the state machine all the way to a fully established session
    /// with `peer` and consume the readiness event.
    async fn bring_up(&mut self, peer: &PeerId, name: &str) {
        self.inject(RadioEvent::PowerState(PowerState::On)).await;
        self.inject(RadioEvent::PeerDiscovered {
            peer: peer.clone(),
            name: Some(name.into()),
        })
        .await;
        self.inject(RadioEvent::Connected(peer.clone())).await;
        self.inject(RadioEvent::ServiceDiscovered {
            peer: peer.clone(),
            service: WEARABLE_SERVICE_UUID,
        })
        .await;
        self.inject(RadioEvent::CharacteristicDiscovered {
            peer: peer.clone(),
            service: WEARABLE_SERVICE_UUID,
            characteristic: WEARABLE_CHARACTERISTIC_UUID,
        })
        .await;
        assert_eq!(
            self.next_event().await,
            WearableEvent::Connection { connected: true }
        );
    }
}

// ── Scanning and candidate filtering ─────────────────────────────────────────

#[tokio::test]
async fn power_on_starts_a_filtered_scan() {
    let mut h = start("wearable");

    // Nothing happens while the radio is off.
    h.inject(RadioEvent::PowerState(PowerState::Off)).await;
    h.assert_no_event().await;
    assert_eq!(h.radio.count(|c| matches!(c, Call::StartScan(_))), 0);

    h.inject(RadioEvent::PowerState(PowerState::On)).await;
    let call = h.radio.wait_for(|c| matches!(c, Call::StartScan(_))).await;
    assert_eq!(call, Call::StartScan(WEARABLE_SERVICE_UUID));
}

#[tokio::test]
async fn peers_with_missing_or_mismatched_names_are_rejected() {
    let mut h = start("wearable");
    h.inject(RadioEvent::PowerState(PowerState::On)).await;
    h.radio.wait_for(|c| matches!(c, Call::StartScan(_))).await;

    h.inject(RadioEvent::PeerDiscovered {
        peer: peer_a(),
        name: None,
    })
    .await;
    h.inject(RadioEvent::PeerDiscovered {
        peer: peer_a(),
        name: Some(String::new()),
    })
    .await;
    h.inject(RadioEvent::PeerDiscovered {
        peer: peer_a(),
        name: Some("someone-else".into()),
    })
    .await;

    h.assert_no_event().await;
    assert_eq!(h.radio.count(|c| matches!(c, Call::Connect(_))), 0);
}

#[tokio::test]
async fn only_one_candidate_is_accepted_at_a_time() {
    let mut h = start("wearable");
    h.inject(RadioEvent::PowerState(PowerState::On)).await;

    h.inject(RadioEvent::PeerDiscovered {
        peer: peer_a(),
        name: Some("wearable".into()),
    })
    .await;
    h.radio
        .wait_for(|c| matches!(c, Call::Connect(p) if *p == peer_a()))
        .await;

    // A second matching peer while the first connect is pending is ignored.
    h.inject(RadioEvent::PeerDiscovered {
        peer: peer_b(),
        name: Some("wearable".into()),
    })
    .await;
    h.assert_no_event().await;
    assert_eq!(h.radio.count(|c| matches!(c, Call::Connect(_))), 1);
}

// ── Bring-up ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_bring_up_stops_scan_and_publishes_one_ready_event() {
    let mut h = start("wearable");
    h.bring_up(&peer_a(), "wearable").await;

    // Scan stopped only after the connection was confirmed, then discovery
    // ran service-first.
    let calls = h.radio.calls();
    let connect = calls.iter().position(|c| matches!(c, Call::Connect(_))).unwrap();
    let stop = calls.iter().position(|c| matches!(c, Call::StopScan)).unwrap();
    let services = calls
        .iter()
        .position(|c| matches!(c, Call::DiscoverServices(_)))
        .unwrap();
    let characteristics = calls
        .iter()
        .position(|c| matches!(c, Call::DiscoverCharacteristics(..)))
        .unwrap();
    assert!(connect < stop && stop < services && services < characteristics);

    assert_eq!(
        h.radio
            .wait_for(|c| matches!(c, Call::EnableNotifications(..)))
            .await,
        Call::EnableNotifications(peer_a(), WEARABLE_CHARACTERISTIC_UUID)
    );

    // Exactly one readiness event.
    h.assert_no_event().await;
}

#[tokio::test]
async fn failed_connect_silently_resumes_scanning() {
    let mut h = start("wearable");
    h.inject(RadioEvent::PowerState(PowerState::On)).await;
    h.inject(RadioEvent::PeerDiscovered {
        peer: peer_a(),
        name: Some("wearable".into()),
    })
    .await;
    h.radio.wait_for(|c| matches!(c, Call::Connect(_))).await;

    h.inject(RadioEvent::ConnectFailed(peer_a())).await;
    h.assert_no_event().await;

    // The same peer can be retried on its next advertisement.
    h.inject(RadioEvent::PeerDiscovered {
        peer: peer_a(),
        name: Some("wearable".into()),
    })
    .await;
    timeout(Duration::from_secs(1), async {
        while h.radio.count(|c| matches!(c, Call::Connect(_))) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("peer was not retried after its next advertisement");
    assert_eq!(h.radio.count(|c| matches!(c, Call::Connect(_))), 2);
}

// ── Telemetry ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn telemetry_frames_are_decoded_and_malformed_ones_dropped() {
    let mut h = start("wearable");
    h.bring_up(&peer_a(), "wearable").await;

    h.inject(RadioEvent::Value {
        peer: peer_a(),
        data: b"#ZZ9999".to_vec(),
    })
    .await;
    h.inject(RadioEvent::Value {
        peer: peer_a(),
        data: b"  #TE 025 \r\n".to_vec(),
    })
    .await;

    // The malformed frame vanished; the valid one comes through decoded.
    assert_eq!(
        h.next_event().await,
        WearableEvent::Telemetry {
            kind: TelemetryKind::Temperature,
            value: "025".into(),
        }
    );
}

// ── Outbound commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn commands_are_noops_until_the_session_is_fully_established() {
    let mut h = start("wearable");

    // While scanning: no session at all.
    h.inject(RadioEvent::PowerState(PowerState::On)).await;
    h.handle.set_led(LedChannel::Red, 255).await.unwrap();

    // Link up but characteristic not yet discovered: still a no-op.
    h.inject(RadioEvent::PeerDiscovered {
        peer: peer_a(),
        name: Some("wearable".into()),
    })
    .await;
    h.inject(RadioEvent::Connected(peer_a())).await;
    h.inject(RadioEvent::ServiceDiscovered {
        peer: peer_a(),
        service: WEARABLE_SERVICE_UUID,
    })
    .await;
    h.handle.set_led(LedChannel::Red, 255).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.radio.count(|c| matches!(c, Call::Write(..))), 0);

    // Once ready, the same command produces the exact wire frame.
    h.inject(RadioEvent::CharacteristicDiscovered {
        peer: peer_a(),
        service: WEARABLE_SERVICE_UUID,
        characteristic: WEARABLE_CHARACTERISTIC_UUID,
    })
    .await;
    assert_eq!(
        h.next_event().await,
        WearableEvent::Connection { connected: true }
    );
    h.handle.set_led(LedChannel::Red, 255).await.unwrap();

    assert_eq!(
        h.radio.wait_for(|c| matches!(c, Call::Write(..))).await,
        Call::Write(
            peer_a(),
            WEARABLE_CHARACTERISTIC_UUID,
            b"#LR0255\n\r".to_vec()
        )
    );
}

#[tokio::test]
async fn poll_sensors_writes_all_three_trigger_frames() {
    let mut h = start("wearable");
    h.bring_up(&peer_a(), "wearable").await;

    h.handle.poll_sensors().await.unwrap();
    h.radio
        .wait_for(|c| matches!(c, Call::Write(_, _, d) if d == b"#AC0003\n\r"))
        .await;

    let frames: Vec<Vec<u8>> = h
        .radio
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Write(_, _, data) => Some(data),
            _ => None,
        })
        .collect();
    assert_eq!(
        frames,
        vec![
            b"#TE0000\n\r".to_vec(),
            b"#LI0000\n\r".to_vec(),
            b"#AC0003\n\r".to_vec(),
        ]
    );
}

#[tokio::test]
async fn raw_frames_pass_through_verbatim() {
    let mut h = start("wearable");
    h.bring_up(&peer_a(), "wearable").await;

    h.handle.send_frame("#LL0000\n\r").await.unwrap();
    assert_eq!(
        h.radio.wait_for(|c| matches!(c, Call::Write(..))).await,
        Call::Write(
            peer_a(),
            WEARABLE_CHARACTERISTIC_UUID,
            b"#LL0000\n\r".to_vec()
        )
    );
}

// ── Teardown and recovery ────────────────────────────────────────────────────

#[tokio::test]
async fn disconnect_publishes_one_event_and_rescans() {
    let mut h = start("wearable");
    h.bring_up(&peer_a(), "wearable").await;

    h.inject(RadioEvent::Disconnected(peer_a())).await;
    assert_eq!(
        h.next_event().await,
        WearableEvent::Connection { connected: false }
    );
    h.assert_no_event().await;
    assert_eq!(h.radio.count(|c| matches!(c, Call::StartScan(_))), 2);
}

#[tokio::test]
async fn power_off_clears_the_session_and_power_on_resumes_scanning() {
    let mut h = start("wearable");
    h.bring_up(&peer_a(), "wearable").await;

    h.inject(RadioEvent::PowerState(PowerState::Off)).await;
    assert_eq!(
        h.next_event().await,
        WearableEvent::Connection { connected: false }
    );

    // The session is gone: a matching peer is not accepted while off, and
    // stale telemetry is dropped.
    h.inject(RadioEvent::PeerDiscovered {
        peer: peer_b(),
        name: Some("wearable".into()),
    })
    .await;
    h.inject(RadioEvent::Value {
        peer: peer_a(),
        data: b"#TE25".to_vec(),
    })
    .await;
    h.assert_no_event().await;
    assert_eq!(h.radio.count(|c| matches!(c, Call::Connect(_))), 1);

    h.inject(RadioEvent::PowerState(PowerState::On)).await;
    timeout(Duration::from_secs(1), async {
        while h.radio.count(|c| matches!(c, Call::StartScan(_))) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("scan did not resume after power-on");
}

#[tokio::test]
async fn renaming_the_target_tears_down_a_healthy_session() {
    let mut h = start("alpha");
    h.bring_up(&peer_a(), "alpha").await;

    // The device never disconnected; the reconfiguration alone tears it down.
    h.handle.set_device_name("beta").await.unwrap();
    assert_eq!(
        h.next_event().await,
        WearableEvent::Connection { connected: false }
    );
    h.radio
        .wait_for(|c| matches!(c, Call::Disconnect(p) if *p == peer_a()))
        .await;
    assert_eq!(h.radio.count(|c| matches!(c, Call::StartScan(_))), 2);

    // Scanning is now filtered toward the new name.
    h.inject(RadioEvent::PeerDiscovered {
        peer: peer_a(),
        name: Some("alpha".into()),
    })
    .await;
    h.inject(RadioEvent::PeerDiscovered {
        peer: peer_b(),
        name: Some("beta".into()),
    })
    .await;
    let call = h
        .radio
        .wait_for(|c| matches!(c, Call::Connect(p) if *p == peer_b()))
        .await;
    assert_eq!(call, Call::Connect(peer_b()));
    assert_eq!(
        h.radio.count(|c| matches!(c, Call::Connect(p) if *p == peer_a())),
        1
    );
}

#[tokio::test]
async fn shutdown_disconnects_and_stops_the_actor() {
    let mut h = start("wearable");
    h.bring_up(&peer_a(), "wearable").await;

    h.handle.shutdown().await.unwrap();
    assert_eq!(
        h.next_event().await,
        WearableEvent::Connection { connected: false }
    );
    h.radio
        .wait_for(|c| matches!(c, Call::Disconnect(p) if *p == peer_a()))
        .await;

    // The actor is gone; further commands report the stopped client.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.handle.poll_sensors().await.is_err());
}
