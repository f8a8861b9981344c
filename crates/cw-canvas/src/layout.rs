//! Tile layout
//!
//! The playable area can exceed what a single frame image covers, so the
//! canvas is split into a grid of equally sized tiles numbered row-major.
//! The default is a 2x2 grid of 1000x1000 tiles.

/// Location of a pixel inside the tile grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Row-major tile index, also the service's canvas index
    pub index: usize,
    /// Column inside the tile
    pub local_x: u32,
    /// Row inside the tile
    pub local_y: u32,
}

/// Grid of equally sized tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    tile_width: u32,
    tile_height: u32,
    columns: u32,
    rows: u32,
}

impl TileLayout {
    /// Create layout; zero dimensions are raised to one
    #[inline]
    #[must_use]
    pub fn new(tile_width: u32, tile_height: u32, columns: u32, rows: u32) -> Self {
        Self {
            tile_width: tile_width.max(1),
            tile_height: tile_height.max(1),
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }

    /// Create layout only if every derived extent fits in `u32`; `None` on zero or overflow
    #[must_use]
    pub fn try_new(tile_width: u32, tile_height: u32, columns: u32, rows: u32) -> Option<Self> {
        if tile_width == 0 || tile_height == 0 || columns == 0 || rows == 0 {
            return None;
        }
        tile_width.checked_mul(columns)?;
        tile_height.checked_mul(rows)?;
        columns.checked_mul(rows)?;
        Some(Self {
            tile_width,
            tile_height,
            columns,
            rows,
        })
    }

    /// Single tile covering `width` x `height`
    #[inline]
    #[must_use]
    pub fn single(width: u32, height: u32) -> Self {
        Self::new(width, height, 1, 1)
    }

    /// Map a canvas coordinate to its tile; `None` outside the grid
    #[must_use]
    pub fn locate(&self, x: u32, y: u32) -> Option<TileCoord> {
        let column = x / self.tile_width;
        let row = y / self.tile_height;
        if column >= self.columns || row >= self.rows {
            return None;
        }
        Some(TileCoord {
            index: row as usize * self.columns as usize + column as usize,
            local_x: x % self.tile_width,
            local_y: y % self.tile_height,
        })
    }

    /// Number of tiles
    #[inline]
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Total canvas width
    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.tile_width.saturating_mul(self.columns)
    }

    /// Total canvas height
    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.tile_height.saturating_mul(self.rows)
    }

    /// Width of one tile
    #[inline]
    #[must_use]
    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    /// Height of one tile
    #[inline]
    #[must_use]
    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }
}

impl Default for TileLayout {
    fn default() -> Self {
        Self::new(1000, 1000, 2, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_two_by_two() {
        let layout = TileLayout::default();
        assert_eq!(layout.tile_count(), 4);
        assert_eq!(layout.width(), 2000);
        assert_eq!(layout.height(), 2000);
    }

    #[test]
    fn locate_quadrants() {
        let layout = TileLayout::default();

        let origin = layout.locate(0, 0).unwrap();
        assert_eq!((origin.index, origin.local_x, origin.local_y), (0, 0, 0));

        let right = layout.locate(1000, 5).unwrap();
        assert_eq!((right.index, right.local_x, right.local_y), (1, 0, 5));

        let below = layout.locate(999, 1000).unwrap();
        assert_eq!((below.index, below.local_x, below.local_y), (2, 999, 0));

        let corner = layout.locate(1999, 1999).unwrap();
        assert_eq!((corner.index, corner.local_x, corner.local_y), (3, 999, 999));
    }

    #[test]
    fn locate_outside_grid() {
        let layout = TileLayout::default();
        assert!(layout.locate(2000, 0).is_none());
        assert!(layout.locate(0, 2000).is_none());
    }

    #[test]
    fn single_tile_layout() {
        let layout = TileLayout::single(1000, 1000);
        assert_eq!(layout.locate(1000, 0), None);
        assert_eq!(layout.locate(999, 999).map(|c| c.index), Some(0));
    }

    #[test]
    fn zero_dimensions_are_clamped() {
        let layout = TileLayout::new(0, 0, 0, 0);
        assert_eq!(layout.tile_count(), 1);
        assert!(layout.locate(0, 0).is_some());
    }

    #[test]
    fn try_new_rejects_overflowing_grids() {
        assert_eq!(TileLayout::try_new(1000, 1000, 2, 2), Some(TileLayout::default()));
        assert!(TileLayout::try_new(u32::MAX, 1000, 2, 2).is_none());
        assert!(TileLayout::try_new(1000, 70_000, 2, 70_000).is_none());
        assert!(TileLayout::try_new(1, 1, 70_000, 70_000).is_none());
        assert!(TileLayout::try_new(1000, 1000, 0, 2).is_none());
    }

    #[test]
    fn last_tile_of_a_wide_grid() {
        let layout = TileLayout::try_new(1, 1, 65_536, 65_535).unwrap();
        let corner = layout.locate(65_535, 65_534).unwrap();
        assert_eq!(corner.index, 65_536 * 65_535 - 1);
        assert_eq!(layout.tile_count(), 65_536 * 65_535);
    }
}
