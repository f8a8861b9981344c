//! Canvas Warden Canvas View
//!
//! Answers "what color is the live canvas at (x, y)?".
//!
//! # Overview
//!
//! - **TileLayout**: pure mapping from canvas coordinates to a tile
//! - **CanvasViewCache**: time-boxed tile cache (moka) in front of a [`TileSource`]
//! - **RealtimeTileSource**: resolves frame URLs over a one-shot subscription,
//!   downloads and decodes them
//!
//! # Example
//!
//! ```rust,ignore
//! use cw_canvas::{CanvasView, CanvasViewCache, TileLayout};
//! use std::time::Duration;
//!
//! # async fn example(source: impl cw_canvas::TileSource + 'static) -> Result<(), cw_canvas::CanvasError> {
//! let view = CanvasViewCache::new(source, TileLayout::default(), Duration::from_secs(5));
//! let sample = view.color_at(10, 10).await?;
//! println!("{sample}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod layout;
pub mod realtime;
pub mod tile;
pub mod view;

// Re-exports
pub use cache::{CanvasViewCache, DEFAULT_FRESHNESS};
pub use error::CanvasError;
pub use layout::{TileCoord, TileLayout};
pub use realtime::{frame_name, resolve_frame_url, BearerProvider, FrameSubscription, RealtimeTileSource};
pub use tile::{PixelSample, Tile};
pub use view::{CanvasView, TileSource};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
