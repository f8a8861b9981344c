//! Core types for Canvas Warden
//!
//! Defines the data flowing through the control loop:
//! - Orders and their snapshots
//! - Wrong pixels found by reconciliation
//! - Placement targets and credentials
//! - Selection modes

use cw_palette::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Desired color at one coordinate
///
/// Serialized as the feed's `[x, y, colorId]` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u32, u32, u8)", into = "(u32, u32, u8)")]
pub struct Order {
    /// Column
    pub x: u32,
    /// Row
    pub y: u32,
    /// Palette id the pixel should have
    pub color_id: u8,
}

impl Order {
    /// Create new order
    #[inline]
    #[must_use]
    pub const fn new(x: u32, y: u32, color_id: u8) -> Self {
        Self { x, y, color_id }
    }
}

impl From<(u32, u32, u8)> for Order {
    fn from((x, y, color_id): (u32, u32, u8)) -> Self {
        Self::new(x, y, color_id)
    }
}

impl From<Order> for (u32, u32, u8) {
    fn from(order: Order) -> Self {
        (order.x, order.y, order.color_id)
    }
}

/// Immutable, shareable order list
pub type OrderSnapshot = Arc<Vec<Order>>;

/// An order the live canvas does not satisfy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrongPixel {
    /// Column
    pub x: u32,
    /// Row
    pub y: u32,
    /// Classified live color, `None` if nothing in the palette is close
    pub observed: Option<Color>,
    /// Color the order asks for
    pub desired: Color,
}

impl WrongPixel {
    /// The placement that would fix this pixel
    #[inline]
    #[must_use]
    pub fn target(&self) -> PlacementTarget {
        PlacementTarget::new(self.x, self.y, self.desired.id)
    }
}

/// One pixel to place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlacementTarget {
    /// Column
    pub x: u32,
    /// Row
    pub y: u32,
    /// Palette id to place
    pub color_id: u8,
}

impl PlacementTarget {
    /// Create new target
    #[inline]
    #[must_use]
    pub const fn new(x: u32, y: u32, color_id: u8) -> Self {
        Self { x, y, color_id }
    }
}

/// Bearer token for one account
///
/// `Debug` and `Display` show only the account label.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    account: String,
    token: String,
}

impl Credential {
    /// Create new credential
    #[inline]
    #[must_use]
    pub fn new(account: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            token: token.into(),
        }
    }

    /// Account label
    #[inline]
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Bearer token
    #[inline]
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account", &self.account)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.account)
    }
}

/// How a loop picks among wrong pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMode {
    /// Act on the first unmet order, in feed order
    ScanFirst,
    /// Collect every wrong pixel and pick one at random
    #[default]
    CollectAll,
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "scan-first" | "first" => Ok(Self::ScanFirst),
            "collect-all" | "sample" | "random" => Ok(Self::CollectAll),
            other => Err(format!("unknown selection mode: {other}")),
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanFirst => f.write_str("scan-first"),
            Self::CollectAll => f.write_str("collect-all"),
        }
    }
}
