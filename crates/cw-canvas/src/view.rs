//! Canvas view seams
//!
//! [`CanvasView`] is what the reconciliation engine reads from;
//! [`TileSource`] is what the tile cache fetches through.

use crate::error::CanvasError;
use crate::tile::PixelSample;
use async_trait::async_trait;
use image::RgbaImage;
use std::sync::Arc;

/// Read access to the live canvas
#[async_trait]
pub trait CanvasView: Send + Sync {
    /// Current color at a canvas coordinate
    ///
    /// May fetch and decode a tile before answering.
    async fn color_at(&self, x: u32, y: u32) -> Result<PixelSample, CanvasError>;
}

#[async_trait]
impl<T: CanvasView + ?Sized> CanvasView for Arc<T> {
    async fn color_at(&self, x: u32, y: u32) -> Result<PixelSample, CanvasError> {
        (**self).color_at(x, y).await
    }
}

/// Fetches and decodes one whole tile
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Fetch the current pixels of tile `index`
    async fn fetch(&self, index: usize) -> Result<RgbaImage, CanvasError>;
}

#[async_trait]
impl<T: TileSource + ?Sized> TileSource for Arc<T> {
    async fn fetch(&self, index: usize) -> Result<RgbaImage, CanvasError> {
        (**self).fetch(index).await
    }
}
