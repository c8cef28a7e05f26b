//! Massdrop ALT raw HID lighting.

use std::ops::RangeInclusive;

use crate::board::Board;

/// Massdrop Microchip vendor ID shared by the ALT and CTRL.
pub const VENDOR_ID: u16 = 0x04d8;

/// Usage page of the lighting raw HID interface.
pub const USAGE_PAGE: u16 = 0xff31;

/// Usage ID of the lighting raw HID interface.
pub const USAGE_ID: u8 = 0x62;

const KEY_LEDS: RangeInclusive<u8> = 0..=66;
const UNDERGLOW_LEDS: RangeInclusive<u8> = 67..=104;

pub struct MassdropAlt;

impl Board for MassdropAlt {
    fn name(&self) -> &'static str {
        "Massdrop ALT"
    }

    fn vendor_id(&self) -> u16 {
        VENDOR_ID
    }

    fn product_id(&self) -> u16 {
        0xeed3
    }

    fn usage_page(&self) -> u16 {
        USAGE_PAGE
    }

    fn usage_id(&self) -> u8 {
        USAGE_ID
    }

    fn key_leds(&self) -> RangeInclusive<u8> {
        KEY_LEDS
    }

    fn underglow_leds(&self) -> RangeInclusive<u8> {
        UNDERGLOW_LEDS
    }

    fn underglow_center(&self) -> u8 {
        74
    }
}
