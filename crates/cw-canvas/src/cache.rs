//! Time-boxed tile cache using moka
//!
//! Provides [`CanvasViewCache`], the shared [`CanvasView`] every placement
//! loop reads through:
//! - Tiles are fetched on first use and expire after the freshness window
//! - Concurrent misses on the same tile coalesce into one fetch
//! - Readers always see a whole decoded tile, never a partial one

use crate::error::CanvasError;
use crate::layout::TileLayout;
use crate::tile::{PixelSample, Tile};
use crate::view::{CanvasView, TileSource};
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Default freshness window for a decoded tile
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(5);

/// Shared tile cache in front of a [`TileSource`]
pub struct CanvasViewCache<S> {
    source: Arc<S>,
    layout: TileLayout,
    tiles: Cache<usize, Arc<Tile>>,
}

impl<S: TileSource + 'static> CanvasViewCache<S> {
    /// Create cache over `source`; tiles go stale after `freshness`
    #[must_use]
    pub fn new(source: S, layout: TileLayout, freshness: Duration) -> Self {
        Self {
            source: Arc::new(source),
            layout,
            tiles: Cache::builder()
                .max_capacity(layout.tile_count() as u64)
                .time_to_live(freshness)
                .build(),
        }
    }

    /// Current tile `index`, fetching it if missing or stale
    ///
    /// # Errors
    /// Propagates the source's fetch or decode failure
    pub async fn tile(&self, index: usize) -> Result<Arc<Tile>, CanvasError> {
        let source = Arc::clone(&self.source);
        self.tiles
            .try_get_with(index, async move {
                tracing::debug!(tile = index, "Fetching canvas tile");
                let tile = Tile::new(index, source.fetch(index).await?);
                let (width, height) = tile.dimensions();
                tracing::debug!(tile = tile.index(), width, height, "Decoded canvas tile");
                Ok::<_, CanvasError>(Arc::new(tile))
            })
            .await
            .map_err(|err| (*err).clone())
    }
}

#[async_trait]
impl<S: TileSource + 'static> CanvasView for CanvasViewCache<S> {
    async fn color_at(&self, x: u32, y: u32) -> Result<PixelSample, CanvasError> {
        let coord = self
            .layout
            .locate(x, y)
            .ok_or(CanvasError::OutOfBounds { x, y })?;
        let tile = self.tile(coord.index).await?;
        tile.sample(coord.local_x, coord.local_y)
            .ok_or(CanvasError::OutOfBounds { x, y })
    }
}
