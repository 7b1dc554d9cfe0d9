use std::fmt;

/// Opaque platform identifier for a discovered peer.
///
/// Identity of a device is this identifier, never its advertised name —
/// names are only used to match the configured target.
/// • macOS / Windows — a UUID string
/// • Linux — a Bluetooth MAC address (`AA:BB:CC:DD:EE:FF`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Radio power state as reported by the platform BLE stack.
///
/// Only [`PowerState::On`], [`PowerState::Off`], and [`PowerState::Resetting`]
/// drive state transitions; the rest are observed and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
    Unauthorized,
    Unsupported,
    Resetting,
    Unknown,
}

/// The sensor a telemetry value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryKind {
    /// On-board temperature sensor (`#TE`).
    Temperature,
    /// Ambient light sensor (`#LI`).
    Luminosity,
    /// Accelerometer X axis (`#AX`).
    AccelX,
    /// Accelerometer Y axis (`#AY`).
    AccelY,
    /// Accelerometer Z axis (`#AZ`).
    AccelZ,
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TelemetryKind::Temperature => "temperature",
            TelemetryKind::Luminosity => "luminosity",
            TelemetryKind::AccelX => "accel-x",
            TelemetryKind::AccelY => "accel-y",
            TelemetryKind::AccelZ => "accel-z",
        };
        f.write_str(name)
    }
}

/// One decoded inbound frame: which sensor, and its value as reported.
///
/// Values are kept as text — the kit reports them pre-formatted (e.g. `"025"`)
/// and the original app displays them verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryFrame {
    pub kind: TelemetryKind,
    pub value: String,
}

/// An LED color channel on the kit's RGB LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedChannel {
    Red,
    Green,
    Blue,
}

impl LedChannel {
    /// The 2-character command tag for this channel.
    pub fn tag(&self) -> &'static str {
        match self {
            LedChannel::Red => "LR",
            LedChannel::Green => "LG",
            LedChannel::Blue => "LB",
        }
    }
}

/// One of the three melodies stored in the kit firmware.
///
/// The firmware only recognizes these three fixed codes; arbitrary melody
/// codes are not part of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Melody {
    First,
    Second,
    Third,
}

impl Melody {
    /// The 4-digit code sent with the `PM` command.
    pub fn code(&self) -> u16 {
        match self {
            Melody::First => 1234,
            Melody::Second => 6789,
            Melody::Third => 4567,
        }
    }
}

/// All events published to subscribers of a
/// [`crate::client::WearableHandle`].
///
/// Events from one session are delivered to a given subscriber in the order
/// they were generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WearableEvent {
    /// Effective connectivity changed.
    ///
    /// `connected: true` means the session is fully ready — service and
    /// characteristic discovered, notifications enabled — not merely that the
    /// BLE link came up.  `connected: false` is published exactly once per
    /// session, on any teardown path (disconnect, radio power-off,
    /// reconfiguration).
    Connection { connected: bool },
    /// A decoded sensor reading from the active session.
    Telemetry { kind: TelemetryKind, value: String },
}
