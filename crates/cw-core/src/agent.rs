//! Agent supervisor
//!
//! Starts one [`PlacementLoop`] per credential slot on the shared
//! [`LoopContext`] and keeps them running.

use crate::scheduler::{LoopContext, PlacementLoop};
use futures::future::join_all;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawns and owns every placement loop
pub struct Warden {
    ctx: LoopContext,
}

impl Warden {
    /// Create supervisor over `ctx`
    #[inline]
    #[must_use]
    pub fn new(ctx: LoopContext) -> Self {
        Self { ctx }
    }

    /// Number of loops this supervisor runs
    #[inline]
    #[must_use]
    pub fn loop_count(&self) -> usize {
        self.ctx.credentials.len()
    }

    /// Sleep until orders are loaded and at least one token is ready
    pub async fn wait_until_ready(&self) {
        let poll = self.ctx.timings.awaiting_orders.max(Duration::from_millis(1));
        while !(self.ctx.orders.has_data() && self.ctx.credentials.any_ready()) {
            tracing::debug!("Waiting for orders and access tokens");
            tokio::time::sleep(poll).await;
        }
    }

    /// Spawn one loop per credential slot
    #[must_use]
    pub fn spawn_loops(&self) -> Vec<JoinHandle<()>> {
        (0..self.loop_count())
            .map(|slot| tokio::spawn(PlacementLoop::new(self.ctx.clone(), slot).run()))
            .collect()
    }

    /// Wait for readiness, then run every loop until the process ends
    pub async fn run(self) {
        self.wait_until_ready().await;
        tracing::info!(loops = self.loop_count(), selection = %self.ctx.selection, "Starting placement loops");

        for (slot, result) in join_all(self.spawn_loops()).await.into_iter().enumerate() {
            if let Err(err) = result {
                tracing::error!(slot, error = %err, "Placement loop stopped");
            }
        }
    }
}
