//! Agent configuration
//!
//! Every setting has a default; a TOML file may override any subset, and
//! command-line flags override the file.
//!
//! ```toml
//! sessions = "token-a;token-b"
//! selection = "scan-first"
//!
//! [timings]
//! idle_ms = 10000
//!
//! [gate]
//! miss_rate = 0.8
//! ```

use crate::credentials::{
    parse_sessions, DEFAULT_CREDENTIAL_REFRESH, DEFAULT_CREDENTIAL_RETRY, DEFAULT_SESSION_PAGE,
};
use crate::error::ConfigError;
use crate::gate::CollisionGate;
use crate::gateway::{DEFAULT_ORIGIN, DEFAULT_PLACEMENT_ENDPOINT};
use crate::orders::DEFAULT_REFRESH_INTERVAL;
use crate::scheduler::Timings;
use crate::types::SelectionMode;
use cw_canvas::{FrameSubscription, TileLayout, DEFAULT_FRESHNESS};
use cw_palette::{Palette, PaletteKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default order feed
pub const DEFAULT_ORDERS_URL: &str = "https://cdn.scoresaber.com/downloads/placeOrders.json";

/// Sessions beyond this count risk account-level throttling
pub const RECOMMENDED_MAX_SESSIONS: usize = 4;

/// How session identifiers become bearer tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenSourceKind {
    /// Sessions are bearer tokens already
    #[default]
    Passthrough,
    /// Scrape the token from the canvas page per session cookie
    SessionPage,
}

/// Remote endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Endpoints {
    /// Order list URL
    pub orders_url: String,
    /// GraphQL placement endpoint
    pub placement_url: String,
    /// Frame subscription WebSocket
    pub subscription_url: String,
    /// `Origin` the canvas service expects
    pub origin: String,
    /// Page embedding the access token
    pub session_page_url: String,
    /// Channel owner the canvas is published under
    pub team_owner: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        let subscription = FrameSubscription::default();
        Self {
            orders_url: DEFAULT_ORDERS_URL.to_string(),
            placement_url: DEFAULT_PLACEMENT_ENDPOINT.to_string(),
            subscription_url: subscription.endpoint,
            origin: DEFAULT_ORIGIN.to_string(),
            session_page_url: DEFAULT_SESSION_PAGE.to_string(),
            team_owner: subscription.team_owner,
        }
    }
}

/// Canvas geometry and tile freshness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CanvasSettings {
    /// Tile width in pixels
    pub tile_width: u32,
    /// Tile height in pixels
    pub tile_height: u32,
    /// Tiles per row
    pub columns: u32,
    /// Tile rows
    pub rows: u32,
    /// Age after which a cached tile is refetched
    pub freshness_ms: u64,
    /// Limit on resolving one frame URL
    pub subscription_timeout_ms: u64,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        let layout = TileLayout::default();
        Self {
            tile_width: layout.tile_width(),
            tile_height: layout.tile_height(),
            columns: layout.width() / layout.tile_width(),
            rows: layout.height() / layout.tile_height(),
            freshness_ms: millis(DEFAULT_FRESHNESS),
            subscription_timeout_ms: millis(FrameSubscription::default().timeout),
        }
    }
}

/// Scheduler backoffs, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingSettings {
    /// Wait while no orders or token are loaded
    pub awaiting_orders_ms: u64,
    /// Wait after a canvas read failure
    pub canvas_failure_ms: u64,
    /// Wait after an all-correct pass
    pub idle_ms: u64,
    /// Wait after the collision gate declined
    pub gate_backoff_ms: u64,
    /// Wait after a failed submission
    pub placement_failure_ms: u64,
    /// Added to every reported cooldown end
    pub cooldown_skew_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Timings::default().into()
    }
}

impl From<Timings> for TimingSettings {
    fn from(t: Timings) -> Self {
        Self {
            awaiting_orders_ms: millis(t.awaiting_orders),
            canvas_failure_ms: millis(t.canvas_failure),
            idle_ms: millis(t.idle),
            gate_backoff_ms: millis(t.gate_backoff),
            placement_failure_ms: millis(t.placement_failure),
            cooldown_skew_ms: millis(t.cooldown_skew),
        }
    }
}

impl From<TimingSettings> for Timings {
    fn from(t: TimingSettings) -> Self {
        Self {
            awaiting_orders: Duration::from_millis(t.awaiting_orders_ms),
            canvas_failure: Duration::from_millis(t.canvas_failure_ms),
            idle: Duration::from_millis(t.idle_ms),
            gate_backoff: Duration::from_millis(t.gate_backoff_ms),
            placement_failure: Duration::from_millis(t.placement_failure_ms),
            cooldown_skew: Duration::from_millis(t.cooldown_skew_ms),
        }
    }
}

/// Background refresh periods, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshSettings {
    /// Order list refresh period
    pub orders_secs: u64,
    /// Access token refresh period
    pub credentials_secs: u64,
    /// Retry period while some slot holds no token
    pub credential_retry_secs: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            orders_secs: DEFAULT_REFRESH_INTERVAL.as_secs(),
            credentials_secs: DEFAULT_CREDENTIAL_REFRESH.as_secs(),
            credential_retry_secs: DEFAULT_CREDENTIAL_RETRY.as_secs(),
        }
    }
}

/// Full agent configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// `;`-delimited session identifiers
    pub sessions: Option<String>,
    /// How sessions become tokens
    pub token_source: TokenSourceKind,
    /// Target selection mode
    pub selection: SelectionMode,
    /// Built-in palette
    pub palette: PaletteKind,
    /// Explicit palette, overriding `palette`
    pub custom_palette: Option<Palette>,
    /// Append-only log mirror
    pub log_file: Option<PathBuf>,
    /// Remote endpoints
    pub endpoints: Endpoints,
    /// Canvas geometry
    pub canvas: CanvasSettings,
    /// Scheduler backoffs
    pub timings: TimingSettings,
    /// Collect-all collision gate
    pub gate: CollisionGate,
    /// Background refresh periods
    pub refresh: RefreshSettings,
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// `--sessions` / `CANVAS_WARDEN_SESSIONS`
    pub sessions: Option<String>,
    /// `--selection`
    pub selection: Option<SelectionMode>,
    /// `--palette`
    pub palette: Option<PaletteKind>,
    /// `--log-file`
    pub log_file: Option<PathBuf>,
    /// `--orders-url`
    pub orders_url: Option<String>,
}

impl AgentConfig {
    /// Read config from a TOML file
    ///
    /// # Errors
    /// Unreadable file or invalid TOML
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse config from TOML text
    ///
    /// # Errors
    /// Invalid TOML or unknown keys
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply command-line overrides
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(sessions) = overrides.sessions {
            self.sessions = Some(sessions);
        }
        if let Some(selection) = overrides.selection {
            self.selection = selection;
        }
        if let Some(palette) = overrides.palette {
            self.palette = palette;
            self.custom_palette = None;
        }
        if let Some(log_file) = overrides.log_file {
            self.log_file = Some(log_file);
        }
        if let Some(url) = overrides.orders_url {
            self.endpoints.orders_url = url;
        }
        self
    }

    /// Check the settings the agent cannot start without
    ///
    /// # Errors
    /// [`ConfigError::MissingCredentials`] or [`ConfigError::Invalid`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_list().is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        let c = &self.canvas;
        if TileLayout::try_new(c.tile_width, c.tile_height, c.columns, c.rows).is_none() {
            return Err(ConfigError::Invalid {
                field: "canvas",
                reason: "tile dimensions and counts must be positive and the grid must fit in u32".to_string(),
            });
        }
        if c.freshness_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "canvas.freshness_ms",
                reason: "must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.gate.miss_rate) {
            return Err(ConfigError::Invalid {
                field: "gate.miss_rate",
                reason: format!("{} is outside [0, 1]", self.gate.miss_rate),
            });
        }
        let r = &self.refresh;
        if r.orders_secs == 0 || r.credentials_secs == 0 || r.credential_retry_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "refresh",
                reason: "intervals must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Configured session identifiers
    #[must_use]
    pub fn session_list(&self) -> Vec<String> {
        self.sessions.as_deref().map(parse_sessions).unwrap_or_default()
    }

    /// Palette to classify with
    #[must_use]
    pub fn palette_catalog(&self) -> Palette {
        self.custom_palette
            .clone()
            .unwrap_or_else(|| Palette::builtin(self.palette))
    }

    /// Scheduler backoffs
    #[inline]
    #[must_use]
    pub fn timings(&self) -> Timings {
        self.timings.into()
    }

    /// Canvas tile layout
    #[must_use]
    pub fn layout(&self) -> TileLayout {
        let c = &self.canvas;
        TileLayout::new(c.tile_width, c.tile_height, c.columns, c.rows)
    }

    /// Tile freshness window
    #[inline]
    #[must_use]
    pub fn freshness(&self) -> Duration {
        Duration::from_millis(self.canvas.freshness_ms)
    }

    /// Frame subscription settings
    #[must_use]
    pub fn subscription(&self) -> FrameSubscription {
        FrameSubscription {
            endpoint: self.endpoints.subscription_url.clone(),
            origin: self.endpoints.origin.clone(),
            team_owner: self.endpoints.team_owner.clone(),
            timeout: Duration::from_millis(self.canvas.subscription_timeout_ms),
        }
    }

    /// Order refresh period
    #[inline]
    #[must_use]
    pub fn orders_refresh(&self) -> Duration {
        Duration::from_secs(self.refresh.orders_secs)
    }

    /// Credential refresh period
    #[inline]
    #[must_use]
    pub fn credentials_refresh(&self) -> Duration {
        Duration::from_secs(self.refresh.credentials_secs)
    }

    /// Credential retry period while a slot is empty
    #[inline]
    #[must_use]
    pub fn credentials_retry(&self) -> Duration {
        Duration::from_secs(self.refresh.credential_retry_secs)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
