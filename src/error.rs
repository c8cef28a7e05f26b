//! Error types.

use thiserror::Error;

/// Errors raised while talking to the keyboard or validating its inputs.
#[derive(Error, Debug)]
pub enum Error {
    #[error("keyboard not found (vendor {vendor_id:04x}, product {product_id:04x}, usage page \
             {usage_page:04x}, usage {usage_id:02x})")]
    DeviceNotFound { vendor_id: u16, product_id: u16, usage_page: u16, usage_id: u16 },

    #[error("session is already closed")]
    SessionClosed,

    #[error("HID transport error: {0}")]
    Transport(String),

    #[error("timed out waiting for the keyboard to respond")]
    ReadTimeout,

    #[error("unexpected light state in response: 0x{0:02x}")]
    InvalidResponse(u8),

    #[error("color out of range: {0}")]
    InvalidColorRange(String),

    #[error("unknown color name '{name}' (valid names: {})", valid.join(", "))]
    UnknownColorName { name: String, valid: Vec<String> },

    #[error("color '{0}' does not match any of: NAME, 0xRRGGBB, rgb:R,G,B, hsv:H,S,V")]
    InvalidColorFormat(String),

    #[error("invalid notification mode '{0}' (valid modes: full, bottom, under)")]
    InvalidMode(String),

    #[error("invalid zone '{0}' (valid zones: row1-row5, bottom, right, top, left)")]
    InvalidZone(String),

    #[error("LED index {index} out of range (board has {count} LEDs)")]
    InvalidLedIndex { index: u16, count: u16 },

    #[error("payload of {len} bytes does not fit into a {frame_size} byte frame")]
    PayloadTooLong { len: usize, frame_size: usize },

    #[error("missing argument <{0}>")]
    MissingArgument(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[cfg(feature = "watch")]
    #[error("notification bus error: {0}")]
    Bus(String),
}

impl Error {
    /// Whether this is an input validation error the lenient policy may replace with a default.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidColorRange(_)
                | Error::UnknownColorName { .. }
                | Error::InvalidColorFormat(_)
                | Error::InvalidMode(_)
                | Error::InvalidZone(_)
                | Error::InvalidLedIndex { .. }
        )
    }
}

impl From<hidapi::HidError> for Error {
    fn from(err: hidapi::HidError) -> Self {
        Error::Transport(err.to_string())
    }
}

#[cfg(feature = "watch")]
impl From<zbus::Error> for Error {
    fn from(err: zbus::Error) -> Self {
        Error::Bus(err.to_string())
    }
}

#[cfg(feature = "watch")]
impl From<zbus::fdo::Error> for Error {
    fn from(err: zbus::fdo::Error) -> Self {
        Error::Bus(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
