//! Color conversion, named palettes and input validation policy.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::protocol::Mode;

/// Fallback color used by the lenient policy.
pub const WHITE: Rgb = Rgb::new(0xff, 0xff, 0xff);

/// Built-in color names.
const DEFAULT_PALETTE: [(&str, Rgb); 6] = [
    ("red", Rgb::new(255, 0, 0)),
    ("green", Rgb::new(0, 255, 0)),
    ("blue", Rgb::new(0, 0, 255)),
    ("aqua", Rgb::new(0, 200, 50)),
    ("orange", Rgb::new(255, 50, 0)),
    ("white", WHITE),
];

/// RGB color.
#[derive(Deserialize, Default, PartialEq, Eq, Debug, Copy, Clone)]
#[serde(from = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from unchecked integer components.
    pub fn from_components(r: i64, g: i64, b: i64) -> Result<Self> {
        let channel = |value: i64| {
            u8::try_from(value).map_err(|_| {
                Error::InvalidColorRange(format!("RGB values must be 0-255, got ({r}, {g}, {b})"))
            })
        };

        Ok(Self::new(channel(r)?, channel(g)?, channel(b)?))
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl FromStr for Rgb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Rgb> {
        let chars = match s.strip_prefix("0x") {
            Some(chars) if chars.len() == 6 && chars.bytes().all(|c| c.is_ascii_hexdigit()) => {
                chars
            },
            _ => return Err(Error::InvalidColorFormat(s.into())),
        };

        match u32::from_str_radix(chars, 16) {
            Ok(mut color) => {
                let b = (color & 0xff) as u8;
                color >>= 8;
                let g = (color & 0xff) as u8;
                color >>= 8;
                let r = color as u8;
                Ok(Rgb::new(r, g, b))
            },
            Err(_) => Err(Error::InvalidColorFormat(s.into())),
        }
    }
}

impl Display for Rgb {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Convert HSV to RGB.
///
/// The hue is in degrees and wraps around, saturation and value are percentages in `0..=100`.
/// Channels are truncated after scaling to `0..=255`.
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Result<Rgb> {
    if !h.is_finite() || !(0.0..=100.0).contains(&s) || !(0.0..=100.0).contains(&v) {
        return Err(Error::InvalidColorRange(format!(
            "saturation and value must be 0-100, got hsv({h}, {s}, {v})"
        )));
    }

    let h6 = h.rem_euclid(360.) / 60.;
    let s = s / 100.;
    let v = v / 100.;

    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1. - s);
    let q = v * (1. - f * s);
    let t = v * (1. - (1. - f) * s);

    let (r, g, b) = match sector as u8 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    let channel = |x: f64| (x * 255.).clamp(0., 255.) as u8;
    Ok(Rgb::new(channel(r), channel(g), channel(b)))
}

/// Immutable mapping from color names to colors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: BTreeMap<String, Rgb>,
}

impl Default for Palette {
    fn default() -> Self {
        let colors = DEFAULT_PALETTE.iter().map(|(name, rgb)| (name.to_string(), *rgb)).collect();
        Self { colors }
    }
}

impl Palette {
    /// Default palette extended with custom entries, which take precedence.
    pub fn with_overrides<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, Rgb)>,
    {
        let mut palette = Self::default();
        for (name, rgb) in overrides {
            palette.colors.insert(name.to_lowercase(), rgb);
        }
        palette
    }

    pub fn get(&self, name: &str) -> Option<Rgb> {
        self.colors.get(&name.to_lowercase()).copied()
    }

    pub fn names(&self) -> Vec<String> {
        self.colors.keys().cloned().collect()
    }
}

/// Handling of invalid user input.
#[derive(Deserialize, Default, PartialEq, Eq, Debug, Copy, Clone)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Report invalid colors and modes to the caller.
    #[default]
    Strict,
    /// Log a warning and substitute white or `full`, matching the legacy scripts.
    Lenient,
}

/// A color as requested by a caller, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpec {
    Name(String),
    Hex(Rgb),
    Rgb(i64, i64, i64),
    Hsv(f64, f64, f64),
}

impl From<Rgb> for ColorSpec {
    fn from(rgb: Rgb) -> Self {
        ColorSpec::Hex(rgb)
    }
}

impl FromStr for ColorSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidColorFormat(s.into());

        if s.starts_with("0x") {
            return Rgb::from_str(s).map(ColorSpec::Hex);
        }

        if let Some(values) = s.strip_prefix("rgb:") {
            let [r, g, b] = triple::<i64>(values).ok_or_else(invalid)?;
            return Ok(ColorSpec::Rgb(r, g, b));
        }

        if let Some(values) = s.strip_prefix("hsv:") {
            let [h, sat, v] = triple::<f64>(values).ok_or_else(invalid)?;
            return Ok(ColorSpec::Hsv(h, sat, v));
        }

        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(invalid());
        }

        Ok(ColorSpec::Name(s.to_lowercase()))
    }
}

/// Parse three comma separated values.
fn triple<T: FromStr>(values: &str) -> Option<[T; 3]> {
    let mut parts = values.split(',').map(|part| part.trim().parse::<T>());
    let triple = [parts.next()?.ok()?, parts.next()?.ok()?, parts.next()?.ok()?];
    parts.next().is_none().then_some(triple)
}

/// Color resolution with a palette and a validation policy.
#[derive(Debug, Clone, Default)]
pub struct ColorModel {
    palette: Palette,
    policy: Policy,
}

impl ColorModel {
    pub fn new(palette: Palette, policy: Policy) -> Self {
        Self { palette, policy }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Look up a palette color by name.
    pub fn resolve_name(&self, name: &str) -> Result<Rgb> {
        self.palette
            .get(name)
            .ok_or_else(|| Error::UnknownColorName {
                name: name.into(),
                valid: self.palette.names(),
            })
    }

    /// Resolve a requested color into RGB.
    ///
    /// Returns `Ok(None)` when the lenient policy decided to skip the write altogether.
    pub fn resolve(&self, spec: &ColorSpec) -> Result<Option<Rgb>> {
        let result = match spec {
            ColorSpec::Name(name) => self.resolve_name(name),
            ColorSpec::Hex(rgb) => Ok(*rgb),
            ColorSpec::Rgb(r, g, b) => Rgb::from_components(*r, *g, *b),
            ColorSpec::Hsv(h, s, v) => hsv_to_rgb(*h, *s, *v),
        };

        match (result, self.policy) {
            (Ok(rgb), _) => Ok(Some(rgb)),
            (Err(err), Policy::Strict) => Err(err),
            // Out of range HSV never reaches the keyboard.
            (Err(err), Policy::Lenient) if matches!(spec, ColorSpec::Hsv(..)) => {
                warn!("{err}, skipping");
                Ok(None)
            },
            (Err(Error::UnknownColorName { name, valid }), Policy::Lenient) => {
                warn!("Unrecognized color '{name}', valid options are: {}", valid.join(", "));
                warn!("Defaulting to white");
                Ok(Some(WHITE))
            },
            (Err(err), Policy::Lenient) => {
                warn!("{err}, defaulting to white");
                Ok(Some(WHITE))
            },
        }
    }

    /// Parse a color argument, falling back to white under the lenient policy.
    pub fn parse(&self, color: &str) -> Result<ColorSpec> {
        match (ColorSpec::from_str(color), self.policy) {
            (Ok(spec), _) => Ok(spec),
            (Err(err), Policy::Strict) => Err(err),
            (Err(err), Policy::Lenient) => {
                warn!("{err}, defaulting to white");
                Ok(ColorSpec::Hex(WHITE))
            },
        }
    }

    /// Parse a notification mode, falling back to `full` under the lenient policy.
    pub fn resolve_mode(&self, mode: &str) -> Result<Mode> {
        match (Mode::from_str(mode), self.policy) {
            (Ok(mode), _) => Ok(mode),
            (Err(err), Policy::Strict) => Err(err),
            (Err(err), Policy::Lenient) => {
                warn!("{err}, defaulting to full");
                Ok(Mode::Full)
            },
        }
    }
}
