//! Live tile source
//!
//! Each tile's current frame is announced over a `graphql-ws` subscription.
//! [`resolve_frame_url`] opens the socket, subscribes to the tile's canvas
//! channel, waits for the first message that names a frame, and closes.
//! [`RealtimeTileSource`] then downloads and decodes that frame.

use crate::error::CanvasError;
use crate::view::TileSource;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use image::RgbaImage;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

const SUBSCRIPTION_QUERY: &str = "subscription replace($input: SubscribeInput!) {\n  subscribe(input: $input) {\n    id\n    ... on BasicMessage {\n      data {\n        __typename\n        ... on FullFrameMessageData {\n          __typename\n          name\n          timestamp\n        }\n      }\n      __typename\n    }\n    __typename\n  }\n}";

/// Supplies the bearer token used to open the frame subscription
pub trait BearerProvider: Send + Sync {
    /// Current bearer token, if one has been acquired
    fn bearer_token(&self) -> Option<String>;
}

/// Frame subscription endpoint settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSubscription {
    /// WebSocket endpoint
    pub endpoint: String,
    /// `Origin` header the service expects
    pub origin: String,
    /// Channel owner the canvas is published under
    pub team_owner: String,
    /// Upper bound on connect plus first usable message
    pub timeout: Duration,
}

impl Default for FrameSubscription {
    fn default() -> Self {
        Self {
            endpoint: "wss://gql-realtime-2.reddit.com/query".to_string(),
            origin: "https://hot-potato.reddit.com".to_string(),
            team_owner: "AFD2022".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl FrameSubscription {
    fn init_message(bearer: &str) -> Value {
        json!({
            "type": "connection_init",
            "payload": { "Authorization": format!("Bearer {bearer}") },
        })
    }

    fn start_message(&self, tile: usize) -> Value {
        json!({
            "id": "1",
            "type": "start",
            "payload": {
                "variables": {
                    "input": {
                        "channel": {
                            "teamOwner": self.team_owner,
                            "category": "CANVAS",
                            "tag": tile.to_string(),
                        }
                    }
                },
                "extensions": {},
                "operationName": "replace",
                "query": SUBSCRIPTION_QUERY,
            }
        })
    }
}

/// Frame URL carried by a subscription message, if it carries one
///
/// Only messages shaped `{payload: {data: {subscribe: {data: {name}}}}}`
/// qualify; acks, keep-alives and diff messages return `None`.
#[must_use]
pub fn frame_name(message: &Value) -> Option<String> {
    message
        .pointer("/payload/data/subscribe/data/name")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Resolve the current frame URL of `tile`
///
/// # Errors
/// - `CanvasError::Timeout` if no usable message arrives within `timeout`
/// - `CanvasError::Subscription` on connect, send, or read failure, or if the
///   socket closes first
pub async fn resolve_frame_url(
    subscription: &FrameSubscription,
    tile: usize,
    bearer: &str,
) -> Result<String, CanvasError> {
    tokio::time::timeout(subscription.timeout, subscribe_once(subscription, tile, bearer))
        .await
        .map_err(|_| CanvasError::Timeout(subscription.timeout))?
}

async fn subscribe_once(
    subscription: &FrameSubscription,
    tile: usize,
    bearer: &str,
) -> Result<String, CanvasError> {
    let mut request = subscription
        .endpoint
        .as_str()
        .into_client_request()
        .map_err(subscription_error)?;
    let headers = request.headers_mut();
    headers.insert(
        "Origin",
        HeaderValue::from_str(&subscription.origin).map_err(subscription_error)?,
    );
    headers.insert("Sec-WebSocket-Protocol", HeaderValue::from_static("graphql-ws"));

    let (mut socket, _) = connect_async(request).await.map_err(subscription_error)?;

    for message in [
        FrameSubscription::init_message(bearer),
        subscription.start_message(tile),
    ] {
        socket
            .send(Message::Text(message.to_string().into()))
            .await
            .map_err(subscription_error)?;
    }

    while let Some(frame) = socket.next().await {
        let raw = match frame.map_err(subscription_error)? {
            Message::Text(text) => text.to_string(),
            Message::Binary(bytes) => String::from_utf8_lossy(&bytes).to_string(),
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(parsed) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        if let Some(name) = frame_name(&parsed) {
            let _ = socket.close(None).await;
            return Ok(name);
        }
    }

    Err(CanvasError::Subscription(
        "socket closed before a frame was announced".to_string(),
    ))
}

fn subscription_error(err: impl std::fmt::Display) -> CanvasError {
    CanvasError::Subscription(err.to_string())
}

/// [`TileSource`] backed by the live frame feed
pub struct RealtimeTileSource {
    subscription: FrameSubscription,
    http: reqwest::Client,
    bearer: Arc<dyn BearerProvider>,
}

impl RealtimeTileSource {
    /// Create source authenticating through `bearer`
    #[must_use]
    pub fn new(subscription: FrameSubscription, http: reqwest::Client, bearer: Arc<dyn BearerProvider>) -> Self {
        Self {
            subscription,
            http,
            bearer,
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, CanvasError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| CanvasError::Download(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CanvasError::Download(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl TileSource for RealtimeTileSource {
    async fn fetch(&self, index: usize) -> Result<RgbaImage, CanvasError> {
        let bearer = self.bearer.bearer_token().ok_or(CanvasError::NoCredential)?;
        let url = resolve_frame_url(&self.subscription, index, &bearer).await?;
        tracing::debug!(tile = index, %url, "Resolved canvas frame");

        let bytes = self.download(&url).await?;
        let decoded = image::load_from_memory(&bytes).map_err(|e| CanvasError::Decode(e.to_string()))?;
        Ok(decoded.to_rgba8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_name_accepts_full_frame_message() {
        let message = json!({
            "id": "1",
            "type": "data",
            "payload": {
                "data": {
                    "subscribe": {
                        "id": "abc",
                        "data": {
                            "__typename": "FullFrameMessageData",
                            "name": "https://hot-potato.reddit.com/media/canvas-images/full-frame.png",
                            "timestamp": 1_648_826_000_000_u64,
                        }
                    }
                }
            }
        });

        assert_eq!(
            frame_name(&message).as_deref(),
            Some("https://hot-potato.reddit.com/media/canvas-images/full-frame.png")
        );
    }

    #[test]
    fn frame_name_ignores_other_messages() {
        assert_eq!(frame_name(&json!({"type": "connection_ack"})), None);
        assert_eq!(frame_name(&json!({"type": "ka"})), None);
        assert_eq!(
            frame_name(&json!({"payload": {"data": {"subscribe": {"data": {"__typename": "DiffFrameMessageData"}}}}})),
            None
        );
        assert_eq!(
            frame_name(&json!({"payload": {"data": {"subscribe": {"data": {"name": 42}}}}})),
            None
        );
    }

    #[test]
    fn start_message_tags_tile_channel() {
        let subscription = FrameSubscription::default();
        let start = subscription.start_message(3);

        assert_eq!(start["type"], "start");
        assert_eq!(start["payload"]["variables"]["input"]["channel"]["tag"], "3");
        assert_eq!(start["payload"]["variables"]["input"]["channel"]["teamOwner"], "AFD2022");
    }

    #[test]
    fn init_message_carries_bearer() {
        let init = FrameSubscription::init_message("tok");
        assert_eq!(init["payload"]["Authorization"], "Bearer tok");
    }

    #[tokio::test]
    async fn resolve_fails_fast_on_unreachable_endpoint() {
        let subscription = FrameSubscription {
            endpoint: "ws://127.0.0.1:9/query".to_string(),
            timeout: Duration::from_secs(2),
            ..FrameSubscription::default()
        };

        let err = resolve_frame_url(&subscription, 0, "tok").await.unwrap_err();
        assert!(matches!(err, CanvasError::Subscription(_) | CanvasError::Timeout(_)));
    }

    struct NoBearer;

    impl BearerProvider for NoBearer {
        fn bearer_token(&self) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn fetch_without_bearer_is_rejected() {
        let source = RealtimeTileSource::new(
            FrameSubscription::default(),
            reqwest::Client::new(),
            Arc::new(NoBearer),
        );

        assert_eq!(source.fetch(0).await.unwrap_err(), CanvasError::NoCredential);
    }
}
