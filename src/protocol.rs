//! GATT UUIDs and the fixed-format text frame protocol spoken by the wearable.
//!
//! The kit exposes an HM-10-class BLE UART: one service (`FFE0`) with one
//! notifiable/writable characteristic (`FFE1`).  Both directions carry short
//! ASCII frames:
//!
//! ```text
//! outbound:  '#' + 2-char tag + 4-char zero-padded value + "\n\r"
//! inbound:   '#' + 2-char tag, then the value, padded with whitespace
//! ```
//!
//! Everything in this module is pure — no I/O, no state.

use uuid::Uuid;

use crate::types::{LedChannel, Melody, TelemetryFrame, TelemetryKind};

// ── Service and characteristic ───────────────────────────────────────────────

/// GATT service advertised by the wearable (16-bit UUID `FFE0` expanded onto
/// the Bluetooth base UUID).  Used as the scan filter.
pub const WEARABLE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);

/// The single UART-style characteristic (`FFE1`) inside
/// [`WEARABLE_SERVICE_UUID`].  Telemetry arrives as notifications on it;
/// commands are written to it without response.
pub const WEARABLE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

// ── Frame constants ──────────────────────────────────────────────────────────

/// Every frame ends with `\n\r` (in that order — the kit firmware expects
/// newline before carriage return).
pub const FRAME_TERMINATOR: &str = "\n\r";

/// Maximum LED intensity per channel.  Values above this are clamped.
pub const LED_MAX: u8 = 255;

// ── Encode ───────────────────────────────────────────────────────────────────

/// Encode an outbound command frame.
///
/// The value is rendered as a 4-digit zero-padded decimal field:
///
/// ```
/// # use wearable_rs::protocol::encode_command;
/// assert_eq!(encode_command("TE", 0), b"#TE0000\n\r");
/// assert_eq!(encode_command("LR", 255), b"#LR0255\n\r");
/// ```
pub fn encode_command(tag: &str, value: u16) -> Vec<u8> {
    format!("#{tag}{value:04}{FRAME_TERMINATOR}").into_bytes()
}

// ── Decode ───────────────────────────────────────────────────────────────────

/// Decode an inbound notification payload into a [`TelemetryFrame`].
///
/// The payload is interpreted as UTF-8 text and trimmed of surrounding
/// whitespace and newlines.  The first 3 characters (`#` plus a 2-char tag)
/// select the telemetry kind; the remainder, trimmed again, is the value:
///
/// | Tag | Kind |
/// |---|---|
/// | `#TE` | Temperature |
/// | `#LI` | Luminosity |
/// | `#AX` / `#AY` / `#AZ` | Accelerometer X / Y / Z |
///
/// Returns `None` for unknown tags, inputs shorter than 3 characters, or
/// non-UTF-8 bytes.  A `None` is not an error — malformed frames are dropped
/// silently and never surfaced to consumers.
pub fn decode_frame(data: &[u8]) -> Option<TelemetryFrame> {
    let text = std::str::from_utf8(data).ok()?.trim();
    let tag = text.get(..3)?;
    let kind = match tag {
        "#TE" => TelemetryKind::Temperature,
        "#LI" => TelemetryKind::Luminosity,
        "#AX" => TelemetryKind::AccelX,
        "#AY" => TelemetryKind::AccelY,
        "#AZ" => TelemetryKind::AccelZ,
        _ => return None,
    };
    Some(TelemetryFrame {
        kind,
        value: text[3..].trim().to_owned(),
    })
}

// ── Outbound command catalogue ───────────────────────────────────────────────

/// Every command the host issues to the wearable, with its wire encoding.
///
/// Obtained from [`crate::client::WearableHandle`] convenience methods or
/// built directly; [`OutboundCommand::frames`] yields the exact bytes to
/// write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Set one LED color channel to an intensity (clamped to [`LED_MAX`]).
    Led { channel: LedChannel, value: u8 },
    /// Turn all LED channels off (`#LL0000`).
    LedOff,
    /// Play one of the three melodies stored on the kit.
    Melody(Melody),
    /// Request fresh temperature, luminosity, and 3-axis accelerometer
    /// readings.  The kit answers each trigger with a telemetry notification.
    PollSensors,
    /// A complete pre-formatted frame (terminator included), written verbatim.
    Raw(String),
}

impl OutboundCommand {
    /// The wire frames this command produces, in issue order.
    ///
    /// All commands map to a single frame except [`OutboundCommand::PollSensors`],
    /// which triggers all three sensors at once.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        match self {
            OutboundCommand::Led { channel, value } => {
                vec![encode_command(channel.tag(), (*value).min(LED_MAX) as u16)]
            }
            OutboundCommand::LedOff => vec![encode_command("LL", 0)],
            OutboundCommand::Melody(melody) => vec![encode_command("PM", melody.code())],
            OutboundCommand::PollSensors => vec![
                encode_command("TE", 0),
                encode_command("LI", 0),
                // The accelerometer trigger uses a fixed payload of 3
                // (one read per axis).
                encode_command("AC", 3),
            ],
            OutboundCommand::Raw(frame) => vec![frame.clone().into_bytes()],
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_zero_pads_the_value() {
        assert_eq!(encode_command("TE", 0), b"#TE0000\n\r");
        assert_eq!(encode_command("LR", 7), b"#LR0007\n\r");
        assert_eq!(encode_command("LR", 255), b"#LR0255\n\r");
        assert_eq!(encode_command("PM", 1234), b"#PM1234\n\r");
    }

    #[test]
    fn decode_trims_and_splits_tag_from_value() {
        let frame = decode_frame(b"  #TE 025 \r\n").unwrap();
        assert_eq!(frame.kind, TelemetryKind::Temperature);
        assert_eq!(frame.value, "025");
    }

    #[test]
    fn decode_recognizes_every_sensor_tag() {
        let cases: [(&[u8], TelemetryKind); 5] = [
            (b"#TE21", TelemetryKind::Temperature),
            (b"#LI0512", TelemetryKind::Luminosity),
            (b"#AX-12", TelemetryKind::AccelX),
            (b"#AY3", TelemetryKind::AccelY),
            (b"#AZ 98\n", TelemetryKind::AccelZ),
        ];
        for (raw, kind) in cases {
            assert_eq!(decode_frame(raw).unwrap().kind, kind);
        }
    }

    #[test]
    fn decode_drops_unknown_and_malformed_input() {
        assert!(decode_frame(b"#ZZ1234").is_none());
        assert!(decode_frame(b"TE0025").is_none());
        assert!(decode_frame(b"#T").is_none());
        assert!(decode_frame(b"").is_none());
        assert!(decode_frame(b"   \r\n").is_none());
        assert!(decode_frame(&[0x23, 0xff, 0xfe, 0x30]).is_none());
    }

    #[test]
    fn decode_allows_empty_value() {
        let frame = decode_frame(b"#LI").unwrap();
        assert_eq!(frame.kind, TelemetryKind::Luminosity);
        assert_eq!(frame.value, "");
    }

    #[test]
    fn led_command_clamps_and_selects_channel_tag() {
        let red = OutboundCommand::Led {
            channel: LedChannel::Red,
            value: 255,
        };
        assert_eq!(red.frames(), vec![b"#LR0255\n\r".to_vec()]);

        let green = OutboundCommand::Led {
            channel: LedChannel::Green,
            value: 9,
        };
        assert_eq!(green.frames(), vec![b"#LG0009\n\r".to_vec()]);

        let blue = OutboundCommand::Led {
            channel: LedChannel::Blue,
            value: 0,
        };
        assert_eq!(blue.frames(), vec![b"#LB0000\n\r".to_vec()]);
    }

    #[test]
    fn melody_commands_use_the_three_fixed_codes() {
        for (melody, frame) in [
            (Melody::First, b"#PM1234\n\r".to_vec()),
            (Melody::Second, b"#PM6789\n\r".to_vec()),
            (Melody::Third, b"#PM4567\n\r".to_vec()),
        ] {
            assert_eq!(OutboundCommand::Melody(melody).frames(), vec![frame]);
        }
    }

    #[test]
    fn poll_sensors_triggers_all_three_sensors() {
        assert_eq!(
            OutboundCommand::PollSensors.frames(),
            vec![
                b"#TE0000\n\r".to_vec(),
                b"#LI0000\n\r".to_vec(),
                b"#AC0003\n\r".to_vec(),
            ]
        );
    }

    #[test]
    fn encode_and_decode_agree_on_the_temperature_trigger() {
        let frame = encode_command("TE", 0);
        assert_eq!(frame, b"#TE0000\n\r");
        // The kit echoes telemetry in the same tag namespace.
        assert_eq!(
            decode_frame(&frame).unwrap().kind,
            TelemetryKind::Temperature
        );
    }
}
