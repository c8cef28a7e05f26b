//! Massdrop CTRL raw HID lighting.

use std::ops::RangeInclusive;

use crate::board::Board;
use crate::massdrop_alt::{USAGE_ID, USAGE_PAGE, VENDOR_ID};

const KEY_LEDS: RangeInclusive<u8> = 0..=86;
const UNDERGLOW_LEDS: RangeInclusive<u8> = 87..=118;

pub struct MassdropCtrl;

impl Board for MassdropCtrl {
    fn name(&self) -> &'static str {
        "Massdrop CTRL"
    }

    fn vendor_id(&self) -> u16 {
        VENDOR_ID
    }

    fn product_id(&self) -> u16 {
        0xeed2
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
        94
    }
}
