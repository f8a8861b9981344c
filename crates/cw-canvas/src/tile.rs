//! Decoded canvas tiles and pixel samples

use image::RgbaImage;
use std::fmt;

/// Live observation at one coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelSample {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha
    pub a: u8,
}

impl PixelSample {
    /// Create new sample
    #[inline]
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque sample
    #[inline]
    #[must_use]
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }
}

impl fmt::Display for PixelSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// One decoded frame image
#[derive(Debug, Clone)]
pub struct Tile {
    index: usize,
    pixels: RgbaImage,
}

impl Tile {
    /// Wrap freshly decoded pixels
    #[inline]
    #[must_use]
    pub fn new(index: usize, pixels: RgbaImage) -> Self {
        Self { index, pixels }
    }

    /// Tile index in the layout
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Pixel at tile-local coordinates, `None` past the decoded bounds
    #[must_use]
    pub fn sample(&self, local_x: u32, local_y: u32) -> Option<PixelSample> {
        self.pixels
            .get_pixel_checked(local_x, local_y)
            .map(|p| PixelSample::new(p[0], p[1], p[2], p[3]))
    }

    /// Decoded dimensions
    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}
