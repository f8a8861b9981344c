//! Placement gateway
//!
//! Submits one pixel on behalf of one credential and normalizes whatever
//! comes back into a [`PlacementResult`]. Rate limits are scheduling
//! signals here, not errors.

use crate::error::GatewayError;
use crate::types::{Credential, PlacementTarget};
use async_trait::async_trait;
use cw_canvas::TileLayout;
use serde_json::{json, Value};

const SET_PIXEL_MUTATION: &str = "mutation setPixel($input: ActInput!) {\n  act(input: $input) {\n    data {\n      ... on BasicMessage {\n        id\n        data {\n          ... on GetUserCooldownResponseMessageData {\n            nextAvailablePixelTimestamp\n            __typename\n          }\n          ... on SetPixelResponseMessageData {\n            timestamp\n            __typename\n          }\n          __typename\n        }\n        __typename\n      }\n      __typename\n    }\n    __typename\n  }\n}\n";

/// Default placement endpoint
pub const DEFAULT_PLACEMENT_ENDPOINT: &str = "https://gql-realtime-2.reddit.com/query";

/// Default `Origin` for placement requests
pub const DEFAULT_ORIGIN: &str = "https://hot-potato.reddit.com";

/// Outcome of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementResult {
    /// Pixel placed; next placement allowed at the given epoch ms
    Accepted {
        /// Epoch milliseconds
        next_allowed_at: i64,
    },
    /// Credential is cooling down until the given epoch ms
    RateLimited {
        /// Epoch milliseconds
        next_allowed_at: i64,
    },
    /// No usable response
    TransportFailure {
        /// What went wrong
        cause: GatewayError,
    },
    /// Response arrived in an unrecognized shape
    MalformedResponse {
        /// Raw payload
        cause: String,
    },
}

impl PlacementResult {
    /// Cooldown end, when the service gave one
    #[inline]
    #[must_use]
    pub fn next_allowed_at(&self) -> Option<i64> {
        match self {
            Self::Accepted { next_allowed_at } | Self::RateLimited { next_allowed_at } => {
                Some(*next_allowed_at)
            }
            _ => None,
        }
    }

    /// Check if the failure points at a stale bearer token
    #[must_use]
    pub fn indicates_expired_credential(&self) -> bool {
        match self {
            Self::TransportFailure { cause } => cause.indicates_expired_credential(),
            Self::MalformedResponse { cause } => {
                let lower = cause.to_ascii_lowercase();
                lower.contains("unauthorized") || lower.contains("not authenticated")
            }
            _ => false,
        }
    }
}

/// Submits placements for a credential
#[async_trait]
pub trait PlacementGateway: Send + Sync {
    /// Place `target.color_id` at `(target.x, target.y)`
    async fn submit(&self, target: PlacementTarget, credential: &Credential) -> PlacementResult;
}

#[async_trait]
impl<T: PlacementGateway + ?Sized> PlacementGateway for std::sync::Arc<T> {
    async fn submit(&self, target: PlacementTarget, credential: &Credential) -> PlacementResult {
        (**self).submit(target, credential).await
    }
}

#[allow(clippy::cast_possible_truncation)]
fn timestamp(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

/// Normalize a mutation response body
#[must_use]
pub fn parse_placement_response(body: &Value) -> PlacementResult {
    if let Some(next) = body
        .pointer("/errors/0/extensions/nextAvailablePixelTs")
        .and_then(timestamp)
    {
        return PlacementResult::RateLimited { next_allowed_at: next };
    }

    let accepted = body
        .pointer("/data/act/data")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find_map(|entry| entry.pointer("/data/nextAvailablePixelTimestamp").and_then(timestamp));
    if let Some(next) = accepted {
        return PlacementResult::Accepted { next_allowed_at: next };
    }

    PlacementResult::MalformedResponse {
        cause: body.to_string(),
    }
}

/// Live gateway posting the `setPixel` GraphQL mutation
#[derive(Debug, Clone)]
pub struct GraphqlGateway {
    client: reqwest::Client,
    endpoint: String,
    origin: String,
    layout: TileLayout,
}

impl GraphqlGateway {
    /// Create gateway against `endpoint`
    #[must_use]
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, layout: TileLayout) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            origin: DEFAULT_ORIGIN.to_string(),
            layout,
        }
    }

    /// Override the `Origin`/`Referer` host
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Request body for `target`, in tile-local coordinates
    ///
    /// # Errors
    /// [`GatewayError::OutOfCanvas`] if the layout has no tile there
    pub fn request_body(&self, target: PlacementTarget) -> Result<Value, GatewayError> {
        let coord = self
            .layout
            .locate(target.x, target.y)
            .ok_or(GatewayError::OutOfCanvas { x: target.x, y: target.y })?;

        Ok(json!({
            "operationName": "setPixel",
            "variables": {
                "input": {
                    "actionName": "r/replace:set_pixel",
                    "PixelMessageData": {
                        "coordinate": { "x": coord.local_x, "y": coord.local_y },
                        "colorIndex": target.color_id,
                        "canvasIndex": coord.index,
                    }
                }
            },
            "query": SET_PIXEL_MUTATION,
        }))
    }

    async fn post(&self, body: Value, credential: &Credential) -> PlacementResult {
        let transport = |cause: GatewayError| PlacementResult::TransportFailure { cause };

        let response = match self
            .client
            .post(&self.endpoint)
            .header("origin", &self.origin)
            .header("referer", format!("{}/", self.origin))
            .header("apollographql-client-name", "mona-lisa")
            .bearer_auth(credential.token())
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return transport(GatewayError::Request(e.to_string())),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return transport(GatewayError::Request(e.to_string())),
        };

        // Cooldowns arrive on error statuses too
        let parsed = serde_json::from_str::<Value>(&text)
            .ok()
            .map(|payload| parse_placement_response(&payload));
        match parsed {
            Some(result) if result.next_allowed_at().is_some() => result,
            _ if !status.is_success() => transport(GatewayError::Status {
                code: status.as_u16(),
                body: text,
            }),
            Some(result) => result,
            None => PlacementResult::MalformedResponse { cause: text },
        }
    }
}

#[async_trait]
impl PlacementGateway for GraphqlGateway {
    async fn submit(&self, target: PlacementTarget, credential: &Credential) -> PlacementResult {
        let body = match self.request_body(target) {
            Ok(body) => body,
            Err(cause) => return PlacementResult::TransportFailure { cause },
        };

        self.post(body, credential).await
    }
}
