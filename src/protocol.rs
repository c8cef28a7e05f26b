//! Raw HID lighting protocol.
//!
//! Every command starts with an opcode byte, followed by a sub-opcode and its parameters:
//!
//! | Opcode | Sub-opcode  | Parameters    | Meaning                              |
//! |--------|-------------|---------------|--------------------------------------|
//! | `0x01` | `0x01-0x05` |               | Set light state / next animation     |
//! | `0x02` | `0x01-0x03` | R, G, B       | Bottom / full / underglow color      |
//! | `0x03` |             |               | Query light state (1 byte response)  |
//! | `0x04` | `0x01`      | LED, R, G, B  | Set a single LED                     |
//! | `0x04` | `0x02`      | Zone, R, G, B | Set a row or underglow edge          |
//!
//! Payloads are returned unpadded, framing is left to the transport.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use clap::ValueEnum;

use crate::color::Rgb;
use crate::error::{Error, Result};

const OP_SET_STATE: u8 = 0x01;
const OP_NOTIFY: u8 = 0x02;
const OP_QUERY_STATE: u8 = 0x03;
const OP_LED: u8 = 0x04;

const LED_SINGLE: u8 = 0x01;
const LED_ZONE: u8 = 0x02;

/// Number of key rows addressable as zones.
pub const ROWS: u8 = 5;

/// Length of the longest command payload, a single LED or zone color.
pub const MAX_PAYLOAD_LEN: usize = 6;

/// Persistent whole-board lighting state.
#[derive(ValueEnum, PartialEq, Eq, Debug, Copy, Clone)]
pub enum LightState {
    AllOn,
    KeysOnly,
    UnderglowOnly,
    AllOff,
    /// Cycle to the next firmware animation, never reported back by the keyboard.
    NextAnimation,
}

impl LightState {
    /// Convert state to its protocol byte.
    pub fn code(self) -> u8 {
        match self {
            Self::AllOn => 0x01,
            Self::KeysOnly => 0x02,
            Self::UnderglowOnly => 0x03,
            Self::AllOff => 0x04,
            Self::NextAnimation => 0x05,
        }
    }

    /// Decode the state query response byte.
    pub fn from_report(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(Self::AllOn),
            0x02 => Ok(Self::KeysOnly),
            0x03 => Ok(Self::UnderglowOnly),
            0x04 => Ok(Self::AllOff),
            byte => Err(Error::InvalidResponse(byte)),
        }
    }
}

impl Display for LightState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AllOn => "all-on",
            Self::KeysOnly => "keys-only",
            Self::UnderglowOnly => "underglow-only",
            Self::AllOff => "all-off",
            Self::NextAnimation => "next-animation",
        };
        f.write_str(name)
    }
}

/// Region receiving a transient color.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub enum Mode {
    #[default]
    Full,
    /// User-facing part of the underglow.
    Bottom,
    /// Entire underglow.
    Under,
}

impl Mode {
    fn code(self) -> u8 {
        match self {
            Self::Bottom => 0x01,
            Self::Full => 0x02,
            Self::Under => 0x03,
        }
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "bottom" => Ok(Self::Bottom),
            "under" => Ok(Self::Under),
            _ => Err(Error::InvalidMode(s.into())),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Full => "full",
            Self::Bottom => "bottom",
            Self::Under => "under",
        };
        f.write_str(name)
    }
}

/// Group of LEDs addressable with a single command.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Zone {
    /// Key row, counted from 1.
    Row(u8),
    Bottom,
    Right,
    Top,
    Left,
}

impl Zone {
    /// Convert zone to its protocol byte.
    pub fn code(self) -> Result<u8> {
        match self {
            Self::Row(row @ 1..=ROWS) => Ok(row),
            Self::Row(row) => Err(Error::InvalidZone(format!("row{row}"))),
            Self::Bottom => Ok(0x06),
            Self::Right => Ok(0x07),
            Self::Top => Ok(0x08),
            Self::Left => Ok(0x09),
        }
    }
}

impl FromStr for Zone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let zone = s.trim().to_lowercase();
        let parsed = match zone.as_str() {
            "bottom" => Self::Bottom,
            "right" => Self::Right,
            "top" => Self::Top,
            "left" => Self::Left,
            row => match row.strip_prefix("row").and_then(|n| n.parse::<u8>().ok()) {
                Some(n @ 1..=ROWS) => Self::Row(n),
                _ => return Err(Error::InvalidZone(s.into())),
            },
        };
        Ok(parsed)
    }
}

impl Display for Zone {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row(row) => write!(f, "row{row}"),
            Self::Bottom => f.write_str("bottom"),
            Self::Right => f.write_str("right"),
            Self::Top => f.write_str("top"),
            Self::Left => f.write_str("left"),
        }
    }
}

/// Set the persistent light state.
pub fn encode_set_state(state: LightState) -> Bytes {
    Bytes::copy_from_slice(&[OP_SET_STATE, state.code()])
}

/// Ask the keyboard for its current light state.
pub fn encode_query_state() -> Bytes {
    Bytes::from_static(&[OP_QUERY_STATE])
}

/// Transient color for a region.
pub fn encode_notify(mode: Mode, color: Rgb) -> Bytes {
    color_command(&[OP_NOTIFY, mode.code()], color)
}

/// Color of a single LED.
pub fn encode_set_led(index: u8, color: Rgb) -> Bytes {
    color_command(&[OP_LED, LED_SINGLE, index], color)
}

/// Color of a row or underglow edge.
pub fn encode_set_zone(zone: Zone, color: Rgb) -> Result<Bytes> {
    Ok(color_command(&[OP_LED, LED_ZONE, zone.code()?], color))
}

fn color_command(header: &[u8], color: Rgb) -> Bytes {
    let mut buf = BytesMut::with_capacity(header.len() + 3);
    buf.put_slice(header);
    buf.put_slice(&color.to_bytes());
    buf.freeze()
}
