//! Keyboard board abstraction.

use std::ops::RangeInclusive;

use clap::ValueEnum;
use serde::Deserialize;

use crate::locator::DeviceIds;
use crate::massdrop_alt::MassdropAlt;
use crate::massdrop_ctrl::MassdropCtrl;
use crate::transport::DEFAULT_FRAME_SIZE;

/// Board-specific lighting layout and raw HID identification.
pub trait Board {
    /// Human readable board name.
    fn name(&self) -> &'static str;

    /// HID vendor ID.
    fn vendor_id(&self) -> u16;

    /// HID product ID.
    fn product_id(&self) -> u16;

    /// Usage page of the raw HID interface.
    fn usage_page(&self) -> u16;

    /// Usage ID of the raw HID interface.
    fn usage_id(&self) -> u8;

    /// LEDs behind the keys.
    fn key_leds(&self) -> RangeInclusive<u8>;

    /// LEDs of the underglow strip, in order around the board.
    fn underglow_leds(&self) -> RangeInclusive<u8>;

    /// LED in the middle of the user-facing underglow edge.
    fn underglow_center(&self) -> u8;

    /// Raw HID report size.
    fn frame_size(&self) -> usize {
        DEFAULT_FRAME_SIZE
    }
}

/// Supported keyboards.
#[derive(ValueEnum, Deserialize, Default, PartialEq, Eq, Debug, Copy, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum KeyboardModel {
    #[default]
    Alt,
    Ctrl,
}

impl KeyboardModel {
    /// Get the board definition for a model.
    pub fn board(&self) -> Box<dyn Board> {
        match self {
            Self::Alt => Box::new(MassdropAlt),
            Self::Ctrl => Box::new(MassdropCtrl),
        }
    }
}

/// Resolved board layout, after applying configuration overrides.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct BoardProfile {
    pub name: String,
    pub ids: DeviceIds,
    pub key_leds: RangeInclusive<u8>,
    pub underglow_leds: RangeInclusive<u8>,
    pub underglow_center: u8,
    pub frame_size: usize,
}

impl BoardProfile {
    /// Total number of addressable LEDs.
    pub fn led_count(&self) -> u16 {
        let last = self.key_leds.end().max(self.underglow_leds.end());
        *last as u16 + 1
    }
}

impl From<&dyn Board> for BoardProfile {
    fn from(board: &dyn Board) -> Self {
        Self {
            name: board.name().into(),
            ids: DeviceIds {
                vendor_id: board.vendor_id(),
                product_id: board.product_id(),
                usage_page: board.usage_page(),
                usage_id: board.usage_id(),
            },
            key_leds: board.key_leds(),
            underglow_leds: board.underglow_leds(),
            underglow_center: board.underglow_center(),
            frame_size: board.frame_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alt_profile() {
        let profile = BoardProfile::from(KeyboardModel::Alt.board().as_ref());
        assert_eq!(profile.led_count(), 105);
        assert_eq!(profile.underglow_leds, 67..=104);
        assert_eq!(profile.underglow_center, 74);
        assert_eq!(profile.frame_size, 64);
        assert_eq!(
            profile.ids,
            DeviceIds { vendor_id: 0x04d8, product_id: 0xeed3, usage_page: 0xff31, usage_id: 0x62 }
        );
    }

    #[test]
    fn ctrl_profile() {
        let profile = BoardProfile::from(KeyboardModel::Ctrl.board().as_ref());
        assert_eq!(profile.led_count(), 119);
        assert_eq!(profile.key_leds, 0..=86);
        assert_eq!(profile.ids.product_id, 0xeed2);
    }

    #[test]
    fn led_ranges_do_not_overlap() {
        for model in KeyboardModel::value_variants() {
            let board = model.board();
            let name = board.name();
            assert!(board.key_leds().end() < board.underglow_leds().start(), "{name}");
            assert!(board.underglow_leds().contains(&board.underglow_center()), "{name}");
        }
    }
}
