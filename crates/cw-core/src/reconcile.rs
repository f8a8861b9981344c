//! Reconciliation engine
//!
//! Diffs an order snapshot against the live canvas. An order is wrong when
//! its live color classifies to nothing in the palette, or to a different
//! id than the order asks for.
//!
//! Two modes:
//! - **scan-first**: stop at the first wrong pixel, in order
//! - **collect-all**: evaluate every order and return all wrong pixels
//!
//! A canvas read failure aborts the whole pass; no partial result is
//! returned.

use crate::types::{Order, SelectionMode, WrongPixel};
use cw_canvas::{CanvasError, CanvasView};
use cw_palette::Palette;
use std::sync::Arc;

/// Diffs orders against the live canvas
#[derive(Debug, Clone)]
pub struct Reconciler {
    palette: Arc<Palette>,
}

impl Reconciler {
    /// Create engine classifying with `palette`
    #[inline]
    #[must_use]
    pub fn new(palette: Arc<Palette>) -> Self {
        Self { palette }
    }

    /// Palette used for classification
    #[inline]
    #[must_use]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Run one pass in the given mode
    ///
    /// Scan-first yields at most one element.
    ///
    /// # Errors
    /// Any canvas failure other than an out-of-bounds order
    pub async fn reconcile(
        &self,
        orders: &[Order],
        view: &dyn CanvasView,
        mode: SelectionMode,
    ) -> Result<Vec<WrongPixel>, CanvasError> {
        match mode {
            SelectionMode::ScanFirst => Ok(self.first_wrong(orders, view).await?.into_iter().collect()),
            SelectionMode::CollectAll => self.all_wrong(orders, view).await,
        }
    }

    /// First wrong pixel in order, if any
    ///
    /// # Errors
    /// Any canvas failure other than an out-of-bounds order
    pub async fn first_wrong(
        &self,
        orders: &[Order],
        view: &dyn CanvasView,
    ) -> Result<Option<WrongPixel>, CanvasError> {
        for order in orders {
            if let Some(wrong) = self.evaluate(order, view).await? {
                return Ok(Some(wrong));
            }
        }
        Ok(None)
    }

    /// Every wrong pixel, in order
    ///
    /// # Errors
    /// Any canvas failure other than an out-of-bounds order
    pub async fn all_wrong(
        &self,
        orders: &[Order],
        view: &dyn CanvasView,
    ) -> Result<Vec<WrongPixel>, CanvasError> {
        let mut wrong = Vec::new();
        for order in orders {
            if let Some(pixel) = self.evaluate(order, view).await? {
                wrong.push(pixel);
            }
        }
        Ok(wrong)
    }

    async fn evaluate(
        &self,
        order: &Order,
        view: &dyn CanvasView,
    ) -> Result<Option<WrongPixel>, CanvasError> {
        let Some(desired) = self.palette.by_id(order.color_id) else {
            // Unsatisfiable in this palette epoch
            tracing::debug!(x = order.x, y = order.y, color = order.color_id, "Skipping order with unknown color");
            return Ok(None);
        };

        let sample = match view.color_at(order.x, order.y).await {
            Ok(sample) => sample,
            Err(err) if !err.is_retryable() => {
                tracing::debug!(x = order.x, y = order.y, error = %err, "Skipping unreadable order");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let observed = self.palette.approximate(sample.r, sample.g, sample.b);
        if observed.is_some_and(|c| c.id == desired.id) {
            return Ok(None);
        }

        Ok(Some(WrongPixel {
            x: order.x,
            y: order.y,
            observed: observed.cloned(),
            desired: desired.clone(),
        }))
    }
}
