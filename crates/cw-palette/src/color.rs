//! Color value types
//!
//! [`Rgb`] serializes as a `#RRGGBB` string so palettes can be written
//! by hand in the agent's TOML config.

use crate::error::PaletteError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference RGB triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
}

impl Rgb {
    /// Create new RGB triple
    #[inline]
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Sum of absolute per-channel differences
    #[inline]
    #[must_use]
    pub fn manhattan(&self, r: u8, g: u8, b: u8) -> u16 {
        u16::from(self.r.abs_diff(r)) + u16::from(self.g.abs_diff(g)) + u16::from(self.b.abs_diff(b))
    }
}

impl FromStr for Rgb {
    type Err = PaletteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(PaletteError::InvalidHex(s.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| PaletteError::InvalidHex(s.to_string()))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl TryFrom<String> for Rgb {
    type Error = PaletteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// A palette entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    /// Color index the canvas service understands
    pub id: u8,
    /// Human-readable name
    pub name: String,
    /// Reference color as rendered on the canvas
    pub rgb: Rgb,
}

impl Color {
    /// Create new color entry
    #[inline]
    #[must_use]
    pub fn new(id: u8, name: impl Into<String>, rgb: Rgb) -> Self {
        Self {
            id,
            name: name.into(),
            rgb,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_parses_hex() {
        let rgb: Rgb = "#FF4500".parse().unwrap();
        assert_eq!(rgb, Rgb::new(255, 69, 0));

        let bare: Rgb = "00a368".parse().unwrap();
        assert_eq!(bare, Rgb::new(0, 163, 104));
    }

    #[test]
    fn rgb_rejects_malformed_hex() {
        assert!("#FFF".parse::<Rgb>().is_err());
        assert!("#GG0000".parse::<Rgb>().is_err());
        assert!("#FF45000".parse::<Rgb>().is_err());
    }

    #[test]
    fn rgb_display_is_uppercase_hex() {
        assert_eq!(Rgb::new(190, 0, 57).to_string(), "#BE0039");
    }

    #[test]
    fn manhattan_distance() {
        let black = Rgb::new(0, 0, 0);
        assert_eq!(black.manhattan(1, 1, 0), 2);
        assert_eq!(black.manhattan(255, 255, 255), 765);
    }

    #[test]
    fn color_serde_uses_hex() {
        let color = Color::new(27, "black", Rgb::new(0, 0, 0));
        let json = serde_json::to_string(&color).unwrap();
        assert!(json.contains("\"#000000\""));

        let back: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(back, color);
    }
}
