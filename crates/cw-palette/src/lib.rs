//! Canvas Warden Palette
//!
//! The color catalog a canvas epoch allows.
//!
//! # Overview
//!
//! - **Rgb**: a reference color, parsed from and rendered as `#RRGGBB`
//! - **Color**: catalog entry (id, human name, reference RGB)
//! - **Palette**: insertion-ordered catalog with exact and tolerant lookup
//!
//! # Example
//!
//! ```rust
//! use cw_palette::Palette;
//!
//! let palette = Palette::legacy();
//!
//! // Exact lookup by id
//! let red = palette.by_id(2).unwrap();
//! assert_eq!(red.name, "red");
//!
//! // Recompression noise still classifies as red
//! let seen = palette.approximate(254, 70, 1).unwrap();
//! assert_eq!(seen.id, 2);
//! ```

#![warn(missing_docs)]

pub mod catalog;
pub mod color;
pub mod error;

// Re-exports
pub use catalog::{Palette, PaletteKind, APPROXIMATE_TOLERANCE};
pub use color::{Color, Rgb};
pub use error::PaletteError;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
