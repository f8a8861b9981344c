//! Testing utilities for the Canvas Warden workspace
//!
//! In-memory stand-ins for every remote collaborator of a placement loop,
//! plus a [`TestRig`] that wires them into a [`LoopContext`].

#![allow(missing_docs)]

use async_trait::async_trait;
use cw_canvas::{CanvasError, CanvasView, PixelSample};
use cw_core::{
    Clock, CollisionGate, Credential, CredentialPool, FeedError, LoopContext, Order, OrderFeed,
    OrderStore, PassthroughTokenSource, PlacementGateway, PlacementResult, PlacementTarget,
    Reconciler, SelectionMode, Timings,
};
use cw_palette::Palette;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const RED: (u8, u8, u8) = (0xFF, 0x45, 0x00);
pub const BLACK: (u8, u8, u8) = (0x00, 0x00, 0x00);
pub const WHITE: (u8, u8, u8) = (0xFF, 0xFF, 0xFF);

/// Fixed wall time of every rig, epoch ms
pub const T0: i64 = 1_648_826_000_000;

/// In-memory canvas; unset pixels read as `fill`
pub struct FakeCanvas {
    fill: PixelSample,
    pixels: Mutex<HashMap<(u32, u32), PixelSample>>,
    failing: AtomicBool,
    reads: AtomicUsize,
}

impl FakeCanvas {
    pub fn filled(rgb: (u8, u8, u8)) -> Self {
        Self {
            fill: PixelSample::opaque(rgb.0, rgb.1, rgb.2),
            pixels: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn paint(&self, x: u32, y: u32, rgb: (u8, u8, u8)) {
        self.pixels.lock().insert((x, y), PixelSample::opaque(rgb.0, rgb.1, rgb.2));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CanvasView for FakeCanvas {
    async fn color_at(&self, x: u32, y: u32) -> Result<PixelSample, CanvasError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CanvasError::Subscription("socket closed".to_string()));
        }
        Ok(self.pixels.lock().get(&(x, y)).copied().unwrap_or(self.fill))
    }
}

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub target: PlacementTarget,
    pub account: String,
    pub token: String,
}

/// Replays queued results, then repeats `fallback`
pub struct ScriptedGateway {
    queue: Mutex<VecDeque<PlacementResult>>,
    fallback: PlacementResult,
    calls: Mutex<Vec<Submission>>,
}

impl ScriptedGateway {
    pub fn always(fallback: PlacementResult) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, result: PlacementResult) -> Self {
        self.queue.lock().push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<Submission> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PlacementGateway for ScriptedGateway {
    async fn submit(&self, target: PlacementTarget, credential: &Credential) -> PlacementResult {
        self.calls.lock().push(Submission {
            target,
            account: credential.account().to_string(),
            token: credential.token().to_string(),
        });
        self.queue.lock().pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

/// Feed whose next answer tests can swap
pub struct StaticOrderFeed {
    next: Mutex<Result<Vec<Order>, FeedError>>,
    fetches: AtomicUsize,
}

impl StaticOrderFeed {
    pub fn new(orders: Vec<Order>) -> Self {
        Self {
            next: Mutex::new(Ok(orders)),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn respond(&self, next: Result<Vec<Order>, FeedError>) {
        *self.next.lock() = next;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderFeed for StaticOrderFeed {
    async fn fetch(&self) -> Result<Vec<Order>, FeedError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.next.lock().clone()
    }
}

/// Settable wall clock
#[derive(Debug)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn at(now_ms: i64) -> Self {
        Self(AtomicI64::new(now_ms))
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fakes plus the context built from them
pub struct TestRig {
    pub canvas: Arc<FakeCanvas>,
    pub gateway: Arc<ScriptedGateway>,
    pub feed: Arc<StaticOrderFeed>,
    pub clock: Arc<FixedClock>,
    pub orders: Arc<OrderStore>,
    pub credentials: Arc<CredentialPool>,
    pub ctx: LoopContext,
}

impl TestRig {
    /// Rig with orders and tokens already loaded
    pub async fn new(
        orders: Vec<Order>,
        canvas: FakeCanvas,
        gateway: ScriptedGateway,
        selection: SelectionMode,
        tokens: &[&str],
    ) -> Self {
        let feed = Arc::new(StaticOrderFeed::new(orders));
        let store = Arc::new(OrderStore::new(feed.clone()));
        store.refresh().await.unwrap();

        let sessions = tokens.iter().map(ToString::to_string).collect();
        let credentials = Arc::new(CredentialPool::new(sessions, Arc::new(PassthroughTokenSource)).unwrap());
        credentials.refresh_all().await;

        let canvas = Arc::new(canvas);
        let gateway = Arc::new(gateway);
        let clock = Arc::new(FixedClock::at(T0));

        let ctx = LoopContext {
            orders: store.clone(),
            credentials: credentials.clone(),
            canvas: canvas.clone(),
            gateway: gateway.clone(),
            reconciler: Reconciler::new(Arc::new(Palette::extended())),
            selection,
            gate: CollisionGate::default(),
            timings: Timings::default(),
            clock: clock.clone(),
        };

        Self {
            canvas,
            gateway,
            feed,
            clock,
            orders: store,
            credentials,
            ctx,
        }
    }

    /// Single-credential scan-first rig
    pub async fn scan_first(orders: Vec<Order>, canvas: FakeCanvas, gateway: ScriptedGateway) -> Self {
        Self::new(orders, canvas, gateway, SelectionMode::ScanFirst, &["cred"]).await
    }
}

/// Loopback HTTP server answering exactly one request with a canned reply
pub struct CannedHttp {
    pub url: String,
    request: JoinHandle<String>,
}

impl CannedHttp {
    pub async fn reply(status: u16, body: impl Into<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let body = body.into();

        let request = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });

        Self { url, request }
    }

    /// Raw request the server received, head and body
    pub async fn request(self) -> String {
        self.request.await.unwrap()
    }
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
