//! Placement scheduler
//!
//! One [`PlacementLoop`] per credential. Each cycle walks
//! `AwaitingOrders → AwaitingCanvas → Deciding → (Skipping | Placing) →
//! Cooldown` and ends with the delay before the next cycle:
//!
//! | Outcome                         | Delay                        |
//! |---------------------------------|------------------------------|
//! | no orders or no token yet       | `awaiting_orders` (2 s)      |
//! | canvas read failed              | `canvas_failure` (15 s)      |
//! | every order satisfied           | `idle` (5 s)                 |
//! | collision gate said no          | `gate_backoff` (5 s)         |
//! | accepted or rate limited        | until next slot + skew (3 s) |
//! | transport or shape failure      | `placement_failure` (10 s)   |
//!
//! The loop never terminates on its own; every failure is a backoff.

use crate::clock::{self, Clock};
use crate::credentials::CredentialPool;
use crate::gate::CollisionGate;
use crate::gateway::{PlacementGateway, PlacementResult};
use crate::orders::OrderStore;
use crate::reconcile::Reconciler;
use crate::types::{PlacementTarget, SelectionMode};
use cw_canvas::{CanvasError, CanvasView};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Backoff and cooldown settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Wait while no orders or no token are loaded
    pub awaiting_orders: Duration,
    /// Wait after a canvas read failure
    pub canvas_failure: Duration,
    /// Wait after a pass found nothing wrong
    pub idle: Duration,
    /// Wait after the collision gate declined
    pub gate_backoff: Duration,
    /// Wait after a failed or unreadable submission
    pub placement_failure: Duration,
    /// Added to every service-reported cooldown end
    pub cooldown_skew: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            awaiting_orders: Duration::from_secs(2),
            canvas_failure: Duration::from_secs(15),
            idle: Duration::from_secs(5),
            gate_backoff: Duration::from_secs(5),
            placement_failure: Duration::from_secs(10),
            cooldown_skew: Duration::from_secs(3),
        }
    }
}

/// Where a loop is within its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// Waiting for an order snapshot and a token
    AwaitingOrders,
    /// Reading the live canvas
    AwaitingCanvas,
    /// Choosing a target
    Deciding,
    /// Declined to act this cycle
    Skipping,
    /// Submitting a placement
    Placing,
    /// Sleeping until the next cycle
    Cooldown,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingOrders => "awaiting-orders",
            Self::AwaitingCanvas => "awaiting-canvas",
            Self::Deciding => "deciding",
            Self::Skipping => "skipping",
            Self::Placing => "placing",
            Self::Cooldown => "cooldown",
        };
        f.write_str(name)
    }
}

/// What one cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No order snapshot loaded yet
    AwaitingOrders,
    /// This loop's slot has no token yet
    AwaitingCredential,
    /// Canvas read failed; pass aborted
    CanvasUnavailable(CanvasError),
    /// Every order satisfied
    AllCorrect,
    /// Wrong pixels seen, but the collision gate declined
    Deferred {
        /// Wrong-pixel count
        wrong: usize,
    },
    /// Submission accepted
    Placed {
        /// What was placed
        target: PlacementTarget,
        /// Epoch ms of the next allowed placement
        next_allowed_at: i64,
    },
    /// Credential still cooling down
    RateLimited {
        /// Epoch ms of the next allowed placement
        next_allowed_at: i64,
    },
    /// Submission failed or came back unreadable
    Failed {
        /// Whether a credential refresh was requested
        credential_expired: bool,
    },
}

/// Outcome plus the delay before the next cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// What happened
    pub outcome: CycleOutcome,
    /// Sleep before the next cycle
    pub delay: Duration,
}

impl CycleReport {
    #[inline]
    fn new(outcome: CycleOutcome, delay: Duration) -> Self {
        Self { outcome, delay }
    }
}

/// Collaborators shared by every loop
#[derive(Clone)]
pub struct LoopContext {
    /// Order snapshot source
    pub orders: Arc<OrderStore>,
    /// Per-slot bearer tokens
    pub credentials: Arc<CredentialPool>,
    /// Live canvas
    pub canvas: Arc<dyn CanvasView>,
    /// Placement submission
    pub gateway: Arc<dyn PlacementGateway>,
    /// Diff engine
    pub reconciler: Reconciler,
    /// How targets are picked
    pub selection: SelectionMode,
    /// Collect-all collision gate
    pub gate: CollisionGate,
    /// Backoffs
    pub timings: Timings,
    /// Wall time
    pub clock: Arc<dyn Clock>,
}

/// Control loop for one credential slot
pub struct PlacementLoop {
    ctx: LoopContext,
    slot: usize,
    rng: StdRng,
    state: LoopState,
}

impl PlacementLoop {
    /// Create loop for credential `slot`
    #[must_use]
    pub fn new(ctx: LoopContext, slot: usize) -> Self {
        Self {
            ctx,
            slot,
            rng: StdRng::from_os_rng(),
            state: LoopState::AwaitingOrders,
        }
    }

    /// Replace the random source
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Credential slot this loop drives
    #[inline]
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// State the last cycle ended in
    #[inline]
    #[must_use]
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run one cycle to completion
    pub async fn cycle(&mut self) -> CycleReport {
        let timings = self.ctx.timings;
        self.state = LoopState::AwaitingOrders;

        let Some(orders) = self.ctx.orders.loaded() else {
            tracing::debug!(slot = self.slot, "Waiting for placement orders");
            return CycleReport::new(CycleOutcome::AwaitingOrders, timings.awaiting_orders);
        };
        let Some(credential) = self.ctx.credentials.get(self.slot) else {
            tracing::debug!(slot = self.slot, "Waiting for access token");
            return CycleReport::new(CycleOutcome::AwaitingCredential, timings.awaiting_orders);
        };

        self.state = LoopState::AwaitingCanvas;
        let wrong = match self
            .ctx
            .reconciler
            .reconcile(&orders, self.ctx.canvas.as_ref(), self.ctx.selection)
            .await
        {
            Ok(wrong) => wrong,
            Err(err) => {
                tracing::warn!(credential = %credential, error = %err, "Error retrieving map");
                self.state = LoopState::Cooldown;
                return CycleReport::new(CycleOutcome::CanvasUnavailable(err), timings.canvas_failure);
            }
        };

        self.state = LoopState::Deciding;
        if wrong.is_empty() {
            tracing::info!(credential = %credential, orders = orders.len(), "All pixels are correct");
            self.state = LoopState::Cooldown;
            return CycleReport::new(CycleOutcome::AllCorrect, timings.idle);
        }

        let pick = match self.ctx.selection {
            SelectionMode::ScanFirst => wrong.first(),
            SelectionMode::CollectAll => {
                let draw: f64 = self.rng.random();
                if !self.ctx.gate.admits(wrong.len(), draw) {
                    tracing::info!(
                        credential = %credential,
                        wrong = wrong.len(),
                        "Leaving wrong pixels to other defenders this round"
                    );
                    self.state = LoopState::Skipping;
                    return CycleReport::new(CycleOutcome::Deferred { wrong: wrong.len() }, timings.gate_backoff);
                }
                wrong.choose(&mut self.rng)
            }
        };
        let Some(pick) = pick else {
            return CycleReport::new(CycleOutcome::AllCorrect, timings.idle);
        };

        self.state = LoopState::Placing;
        let target = pick.target();
        tracing::info!(
            credential = %credential,
            x = target.x,
            y = target.y,
            observed = pick.observed.as_ref().map_or("undefined", |c| c.name.as_str()),
            color = %pick.desired,
            wrong = wrong.len(),
            "Changing pixel"
        );

        let result = self.ctx.gateway.submit(target, &credential).await;
        self.state = LoopState::Cooldown;
        self.settle(target, &credential.to_string(), result)
    }

    fn settle(&self, target: PlacementTarget, credential: &str, result: PlacementResult) -> CycleReport {
        let timings = self.ctx.timings;
        let now = self.ctx.clock.now_ms();
        let skew = i64::try_from(timings.cooldown_skew.as_millis()).unwrap_or(i64::MAX);

        match result {
            PlacementResult::Accepted { next_allowed_at } => {
                tracing::info!(
                    credential,
                    x = target.x,
                    y = target.y,
                    next = %clock::local_time(next_allowed_at),
                    "Pixel placed"
                );
                CycleReport::new(
                    CycleOutcome::Placed { target, next_allowed_at },
                    clock::until(next_allowed_at.saturating_add(skew), now),
                )
            }
            PlacementResult::RateLimited { next_allowed_at } => {
                tracing::info!(
                    credential,
                    next = %clock::local_time(next_allowed_at),
                    "Credential cooling down"
                );
                CycleReport::new(
                    CycleOutcome::RateLimited { next_allowed_at },
                    clock::until(next_allowed_at.saturating_add(skew), now),
                )
            }
            failure @ (PlacementResult::TransportFailure { .. } | PlacementResult::MalformedResponse { .. }) => {
                let credential_expired = failure.indicates_expired_credential();
                match &failure {
                    PlacementResult::TransportFailure { cause } => {
                        tracing::warn!(credential, error = %cause, "Placement request failed");
                    }
                    PlacementResult::MalformedResponse { cause } => {
                        tracing::error!(credential, response = %cause, "Unrecognized placement response");
                    }
                    _ => {}
                }
                if credential_expired {
                    tracing::warn!(credential, "Access token looks expired, requesting refresh");
                    self.ctx.credentials.request_refresh();
                }
                CycleReport::new(CycleOutcome::Failed { credential_expired }, timings.placement_failure)
            }
        }
    }

    /// Cycle forever, sleeping the reported delay between cycles
    pub async fn run(mut self) {
        tracing::info!(slot = self.slot, selection = %self.ctx.selection, "Placement loop started");
        loop {
            let report = self.cycle().await;
            tracing::debug!(
                slot = self.slot,
                state = %self.state,
                delay_ms = u64::try_from(report.delay.as_millis()).unwrap_or(u64::MAX),
                "Cycle finished"
            );
            tokio::time::sleep(report.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{PassthroughTokenSource, TokenSource};
    use crate::error::{CredentialError, FeedError, GatewayError};
    use crate::orders::OrderFeed;
    use crate::types::{Credential, Order};
    use async_trait::async_trait;
    use cw_canvas::PixelSample;
    use cw_palette::Palette;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Feed(Vec<Order>);

    #[async_trait]
    impl OrderFeed for Feed {
        async fn fetch(&self) -> Result<Vec<Order>, FeedError> {
            Ok(self.0.clone())
        }
    }

    /// Every pixel reads black
    struct Black;

    #[async_trait]
    impl CanvasView for Black {
        async fn color_at(&self, _x: u32, _y: u32) -> Result<PixelSample, CanvasError> {
            Ok(PixelSample::opaque(0, 0, 0))
        }
    }

    struct Fixed(i64);

    impl Clock for Fixed {
        fn now_ms(&self) -> i64 {
            self.0
        }
    }

    /// Answers every submission with `reply`, recording targets
    struct Reply {
        reply: PlacementResult,
        calls: Mutex<Vec<PlacementTarget>>,
    }

    #[async_trait]
    impl PlacementGateway for Reply {
        async fn submit(&self, target: PlacementTarget, _credential: &Credential) -> PlacementResult {
            self.calls.lock().push(target);
            self.reply.clone()
        }
    }

    async fn context(orders: Vec<Order>, reply: PlacementResult, selection: SelectionMode) -> (LoopContext, Arc<Reply>) {
        let store = Arc::new(OrderStore::new(Arc::new(Feed(orders))));
        store.refresh().await.unwrap();
        let credentials = Arc::new(CredentialPool::new(vec!["token".into()], Arc::new(PassthroughTokenSource)).unwrap());
        credentials.refresh_all().await;
        let gateway = Arc::new(Reply {
            reply,
            calls: Mutex::new(Vec::new()),
        });

        let ctx = LoopContext {
            orders: store,
            credentials,
            canvas: Arc::new(Black),
            gateway: gateway.clone(),
            reconciler: Reconciler::new(Arc::new(Palette::extended())),
            selection,
            gate: CollisionGate::default(),
            timings: Timings::default(),
            clock: Arc::new(Fixed(1_000_000)),
        };
        (ctx, gateway)
    }

    #[tokio::test]
    async fn no_snapshot_waits_for_orders() {
        let (mut ctx, gateway) = context(vec![], PlacementResult::RateLimited { next_allowed_at: 0 }, SelectionMode::ScanFirst).await;
        ctx.orders = Arc::new(OrderStore::new(Arc::new(Feed(vec![]))));

        let report = PlacementLoop::new(ctx, 0).cycle().await;

        assert_eq!(report.outcome, CycleOutcome::AwaitingOrders);
        assert_eq!(report.delay, Duration::from_secs(2));
        assert!(gateway.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn empty_slot_waits_for_token() {
        let (ctx, _) = context(vec![Order::new(0, 0, 2)], PlacementResult::RateLimited { next_allowed_at: 0 }, SelectionMode::ScanFirst).await;

        let report = PlacementLoop::new(ctx, 4).cycle().await;

        assert_eq!(report.outcome, CycleOutcome::AwaitingCredential);
        assert_eq!(report.delay, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn rate_limit_sleeps_until_slot_plus_skew() {
        let (ctx, _) = context(
            vec![Order::new(0, 0, 2)],
            PlacementResult::RateLimited { next_allowed_at: 1_060_000 },
            SelectionMode::ScanFirst,
        )
        .await;
        let mut placement = PlacementLoop::new(ctx, 0);

        let report = placement.cycle().await;

        assert_eq!(report.outcome, CycleOutcome::RateLimited { next_allowed_at: 1_060_000 });
        assert_eq!(report.delay, Duration::from_millis(63_000));
        assert_eq!(placement.state(), LoopState::Cooldown);
    }

    #[tokio::test]
    async fn past_cooldown_retries_immediately() {
        let (ctx, _) = context(
            vec![Order::new(0, 0, 2)],
            PlacementResult::Accepted { next_allowed_at: 0 },
            SelectionMode::ScanFirst,
        )
        .await;

        let report = PlacementLoop::new(ctx, 0).cycle().await;

        assert_eq!(report.delay, Duration::ZERO);
    }

    #[tokio::test]
    async fn closed_gate_skips_without_submitting() {
        let (mut ctx, gateway) = context(
            vec![Order::new(0, 0, 2)],
            PlacementResult::Accepted { next_allowed_at: 0 },
            SelectionMode::CollectAll,
        )
        .await;
        ctx.gate = CollisionGate::new(1.0);
        let mut placement = PlacementLoop::new(ctx, 0).with_rng(StdRng::seed_from_u64(7));

        let report = placement.cycle().await;

        assert_eq!(report.outcome, CycleOutcome::Deferred { wrong: 1 });
        assert_eq!(report.delay, Duration::from_secs(5));
        assert_eq!(placement.state(), LoopState::Skipping);
        assert!(gateway.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn collect_all_picks_one_of_the_wrong_pixels() {
        let orders = vec![Order::new(0, 0, 2), Order::new(1, 0, 3), Order::new(2, 0, 27)];
        let (mut ctx, gateway) = context(orders, PlacementResult::Accepted { next_allowed_at: 0 }, SelectionMode::CollectAll).await;
        ctx.gate = CollisionGate::disabled();
        let mut placement = PlacementLoop::new(ctx, 0).with_rng(StdRng::seed_from_u64(7));

        for _ in 0..20 {
            placement.cycle().await;
        }

        let calls = gateway.calls.lock();
        assert_eq!(calls.len(), 20);
        // (2, 0) is already black
        assert!(calls.iter().all(|t| t.y == 0 && t.x < 2));
    }

    /// Counts token acquisitions
    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl TokenSource for Counting {
        async fn acquire(&self, session: &str) -> Result<String, CredentialError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{session}-{n}"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_auth_failure_requests_refresh() {
        let (mut ctx, _) = context(
            vec![Order::new(0, 0, 2)],
            PlacementResult::MalformedResponse {
                cause: r#"{"errors":[{"message":"Unauthorized"}]}"#.into(),
            },
            SelectionMode::ScanFirst,
        )
        .await;
        let source = Arc::new(Counting::default());
        let pool = Arc::new(CredentialPool::new(vec!["s".into()], source.clone()).unwrap());
        pool.refresh_all().await;
        let refresher = pool.spawn_refresher(Duration::from_secs(1800), Duration::from_secs(15));
        ctx.credentials = pool.clone();

        let report = PlacementLoop::new(ctx, 0).cycle().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(report.outcome, CycleOutcome::Failed { credential_expired: true });
        assert_eq!(report.delay, Duration::from_secs(10));
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
        assert_eq!(pool.get(0).unwrap().token(), "s-1");

        refresher.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn plain_transport_failure_leaves_token_alone() {
        let (mut ctx, _) = context(
            vec![Order::new(0, 0, 2)],
            PlacementResult::TransportFailure {
                cause: GatewayError::Request("connection reset".into()),
            },
            SelectionMode::ScanFirst,
        )
        .await;
        let source = Arc::new(Counting::default());
        let pool = Arc::new(CredentialPool::new(vec!["s".into()], source.clone()).unwrap());
        pool.refresh_all().await;
        let refresher = pool.spawn_refresher(Duration::from_secs(1800), Duration::from_secs(15));
        ctx.credentials = pool;

        let report = PlacementLoop::new(ctx, 0).cycle().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(report.outcome, CycleOutcome::Failed { credential_expired: false });
        assert_eq!(source.0.load(Ordering::SeqCst), 1);

        refresher.abort();
    }

    /// Near-black gray no catalog entry matches
    struct Unmatched;

    #[async_trait]
    impl CanvasView for Unmatched {
        async fn color_at(&self, _x: u32, _y: u32) -> Result<PixelSample, CanvasError> {
            Ok(PixelSample::opaque(10, 10, 10))
        }
    }

    /// Shared buffer the fmt layer writes into
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    async fn changing_pixel_line(canvas: Arc<dyn CanvasView>) -> String {
        let logs = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (mut ctx, _) = context(
            vec![Order::new(0, 0, 2)],
            PlacementResult::Accepted { next_allowed_at: 0 },
            SelectionMode::ScanFirst,
        )
        .await;
        ctx.canvas = canvas;
        PlacementLoop::new(ctx, 0).cycle().await;

        let text = String::from_utf8(logs.0.lock().clone()).unwrap();
        text.lines()
            .find(|line| line.contains("Changing pixel"))
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn changing_pixel_log_names_current_color() {
        let line = changing_pixel_line(Arc::new(Black)).await;

        assert!(line.contains("observed=\"black\"") || line.contains("observed=black"), "{line}");
        assert!(line.contains("red (2)"), "{line}");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn changing_pixel_log_marks_unmatched_color() {
        let line = changing_pixel_line(Arc::new(Unmatched)).await;

        assert!(line.contains("undefined"), "{line}");
    }

    #[test]
    fn loop_state_display() {
        assert_eq!(LoopState::AwaitingOrders.to_string(), "awaiting-orders");
        assert_eq!(LoopState::Cooldown.to_string(), "cooldown");
    }
}
