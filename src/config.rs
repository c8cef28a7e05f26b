//! Configuration file.
//!
//! Everything is optional, a missing file at the default location is equivalent to an empty one.
//!
//! ```toml
//! policy = "lenient"
//!
//! [device]
//! model = "alt"
//! frame_size = 32
//! underglow_leds = [67, 104]
//! underglow_center = 74
//!
//! [notify]
//! duration_ms = 1500
//!
//! [colors]
//! purple = [128, 0, 128]
//!
//! [[watch]]
//! sender = "Telegram Desktop"
//! summary_contains = "Cami"
//! mode = "full"
//! color = "aqua"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use tracing::debug;

use crate::board::{BoardProfile, KeyboardModel};
use crate::color::{ColorModel, Palette, Policy, Rgb};
use crate::error::{Error, Result};
use crate::protocol::MAX_PAYLOAD_LEN;
use crate::session::{SessionOptions, DEFAULT_READ_TIMEOUT};
use crate::transport::Framing;
use crate::watch::WatchRule;

/// Largest raw HID report size supported by full-speed USB interrupt endpoints.
const MAX_FRAME_SIZE: usize = 64;

/// Keyboard selection and raw HID overrides.
#[derive(Deserialize, Default, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    pub model: KeyboardModel,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub usage_page: Option<u16>,
    pub usage_id: Option<u8>,
    pub frame_size: Option<usize>,
    /// First and last LED index of the key backlight.
    pub key_leds: Option<[u8; 2]>,
    /// First and last LED index of the underglow.
    pub underglow_leds: Option<[u8; 2]>,
    /// Underglow LED the ripple animation starts from.
    pub underglow_center: Option<u8>,
    /// Report ID prepended to every frame.
    pub report_id: Option<u8>,
    pub read_timeout_ms: Option<u64>,
}

/// Notification defaults.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
}

fn default_duration_ms() -> u64 {
    1000
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { duration_ms: default_duration_ms() }
    }
}

impl NotifyConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub policy: Policy,
    pub device: DeviceConfig,
    pub notify: NotifyConfig,
    /// Additional or replacement color names.
    pub colors: BTreeMap<String, Rgb>,
    pub watch: Vec<WatchRule>,
}

impl Config {
    /// Default configuration file location.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "alt-rgb").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the configuration.
    ///
    /// An explicitly requested file must exist, the default one may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        match fs::read_to_string(&path) {
            Ok(content) => {
                debug!("Loading config from {}", path.display());
                Self::from_toml(&content)
                    .map_err(|err| Error::Config(format!("{}: {err}", path.display())))
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            },
            Err(err) => Err(Error::Config(format!("unable to read {}: {err}", path.display()))),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|err| Error::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let device = &self.device;

        if let Some(size) = device.frame_size {
            if !(MAX_PAYLOAD_LEN..=MAX_FRAME_SIZE).contains(&size) {
                return Err(Error::Config(format!(
                    "frame_size must be {MAX_PAYLOAD_LEN}-{MAX_FRAME_SIZE}, got {size}"
                )));
            }
        }

        let ranges = [("key_leds", device.key_leds), ("underglow_leds", device.underglow_leds)];
        for (name, leds) in ranges {
            if let Some([first, last]) = leds {
                if first > last {
                    return Err(Error::Config(format!(
                        "{name} must be [first, last], got [{first}, {last}]"
                    )));
                }
            }
        }

        let board = self.board();
        if !board.underglow_leds.contains(&board.underglow_center) {
            return Err(Error::Config(format!(
                "underglow_center {} is outside the underglow LEDs {:?}",
                board.underglow_center, board.underglow_leds
            )));
        }

        Ok(())
    }

    /// Board layout with all device overrides applied.
    pub fn board(&self) -> BoardProfile {
        let device = &self.device;
        let mut profile = BoardProfile::from(device.model.board().as_ref());

        let ids = &mut profile.ids;
        ids.vendor_id = device.vendor_id.unwrap_or(ids.vendor_id);
        ids.product_id = device.product_id.unwrap_or(ids.product_id);
        ids.usage_page = device.usage_page.unwrap_or(ids.usage_page);
        ids.usage_id = device.usage_id.unwrap_or(ids.usage_id);
        profile.frame_size = device.frame_size.unwrap_or(profile.frame_size);

        if let Some([first, last]) = device.key_leds {
            profile.key_leds = first..=last;
        }
        if let Some([first, last]) = device.underglow_leds {
            profile.underglow_leds = first..=last;
        }
        profile.underglow_center = device.underglow_center.unwrap_or(profile.underglow_center);

        profile
    }

    /// Color palette and validation policy.
    pub fn color_model(&self) -> ColorModel {
        let overrides = self.colors.iter().map(|(name, rgb)| (name.clone(), *rgb));
        ColorModel::new(Palette::with_overrides(overrides), self.policy)
    }

    /// Session settings for a board.
    pub fn session_options(&self, board: &BoardProfile) -> SessionOptions {
        let read_timeout =
            self.device.read_timeout_ms.map_or(DEFAULT_READ_TIMEOUT, Duration::from_millis);

        SessionOptions {
            framing: Framing { frame_size: board.frame_size, report_id: self.device.report_id },
            read_timeout,
            colors: self.color_model(),
            ..SessionOptions::from(board)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_set_led, Mode};

    #[test]
    fn empty_config_uses_alt_defaults() {
        let config = Config::from_toml("").unwrap();
        let board = config.board();

        assert_eq!(config.policy, Policy::Strict);
        assert_eq!(config.notify.duration(), Duration::from_secs(1));
        assert_eq!(board.name, "Massdrop ALT");
        assert_eq!(board.ids.product_id, 0xeed3);

        let options = config.session_options(&board);
        assert_eq!(options.framing, Framing::default());
        assert_eq!(options.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(options.led_count, 105);
    }

    #[test]
    fn full_config() {
        let config = Config::from_toml(
            r#"
            policy = "lenient"

            [device]
            model = "ctrl"
            usage_page = 0xff60
            usage_id = 0x61
            frame_size = 32
            report_id = 0
            read_timeout_ms = 250

            [notify]
            duration_ms = 1500

            [colors]
            Purple = [128, 0, 128]

            [[watch]]
            sender = "Telegram Desktop"
            summary_contains = "Cami"
            mode = "full"
            color = "aqua"

            [[watch]]
            sender = "Telegram Desktop"
            mode = "under"
            color = "aqua"
            "#,
        )
        .unwrap();

        let board = config.board();
        assert_eq!(board.ids.vendor_id, 0x04d8);
        assert_eq!(board.ids.product_id, 0xeed2);
        assert_eq!(board.ids.usage_page, 0xff60);
        assert_eq!(board.ids.usage_id, 0x61);
        assert_eq!(board.frame_size, 32);

        let options = config.session_options(&board);
        assert_eq!(options.framing, Framing { frame_size: 32, report_id: Some(0) });
        assert_eq!(options.read_timeout, Duration::from_millis(250));
        assert_eq!(options.led_count, 119);
        assert_eq!(options.colors.policy(), Policy::Lenient);
        assert_eq!(options.colors.resolve_name("purple").unwrap(), Rgb::new(128, 0, 128));

        assert_eq!(config.notify.duration(), Duration::from_millis(1500));
        assert_eq!(config.watch.len(), 2);
        assert_eq!(config.watch[0].summary_contains.as_deref(), Some("Cami"));
        assert_eq!(config.watch[1].mode.parse::<Mode>().unwrap(), Mode::Under);
    }

    #[test]
    fn invalid_configs() {
        assert!(matches!(Config::from_toml("policy = \"loose\""), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml("[device]\nframe_size = 0"), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml("[device]\nframe_size = 65"), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml("[device]\nframe_size = 5"), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml("[device]\nmodel = \"65%\""), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml("[colors]\nred = [256, 0, 0]"), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml("[device]\nspeed = 1"), Err(Error::Config(_))));
    }

    #[test]
    fn frame_size_fits_longest_payload() {
        let config = Config::from_toml("[device]\nframe_size = 6").unwrap();
        let board = config.board();
        let options = config.session_options(&board);
        let payload = encode_set_led(0, Rgb::new(1, 2, 3));
        assert!(options.framing.frame(&payload).is_ok());

        let config = Config::from_toml("[device]\nframe_size = 6\nreport_id = 0").unwrap();
        let options = config.session_options(&config.board());
        assert_eq!(options.framing.frame(&payload).unwrap().len(), 7);
    }

    #[test]
    fn led_layout_overrides() {
        let config = Config::from_toml(
            r#"
            [device]
            model = "ctrl"
            key_leds = [0, 80]
            underglow_leds = [81, 110]
            underglow_center = 90
            "#,
        )
        .unwrap();

        let board = config.board();
        assert_eq!(board.key_leds, 0..=80);
        assert_eq!(board.underglow_leds, 81..=110);
        assert_eq!(board.underglow_center, 90);
        assert_eq!(config.session_options(&board).led_count, 111);

        let reversed = Config::from_toml("[device]\nunderglow_leds = [104, 67]");
        assert!(matches!(reversed, Err(Error::Config(_))));

        let outside = Config::from_toml("[device]\nunderglow_center = 10");
        assert!(matches!(outside, Err(Error::Config(_))));

        let moved = Config::from_toml("[device]\nunderglow_leds = [60, 70]");
        assert!(matches!(moved, Err(Error::Config(_))));
    }

    #[test]
    fn explicit_path_must_exist() {
        let missing = Path::new("/nonexistent/alt-rgb/config.toml");
        assert!(matches!(Config::load(Some(missing)), Err(Error::Config(_))));
    }
}
