//! Error types for Canvas Warden
//!
//! Provides error handling for:
//! - Order feed refreshes
//! - Placement submissions
//! - Credential acquisition
//! - Startup configuration

use std::path::PathBuf;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Credential could not be acquired
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Logging could not be initialised
    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl WardenError {
    /// Check if error is a setup mistake the operator must fix
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Logging(_))
    }

    /// Process exit status: 2 for setup mistakes, 1 otherwise
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.is_fatal() {
            2
        } else {
            1
        }
    }
}

/// Order feed errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// Request never produced a response
    #[error("request failed: {0}")]
    Request(String),

    /// Non-success status code
    #[error("non-ok status code: {0}")]
    Status(u16),

    /// Body was not a list of `[x, y, colorId]` triples
    #[error("malformed order list: {0}")]
    Parse(String),
}

/// Placement transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Request never produced a response
    #[error("request failed: {0}")]
    Request(String),

    /// Non-success status code
    #[error("status {code}: {body}")]
    Status {
        /// HTTP status
        code: u16,
        /// Response body, for diagnosis
        body: String,
    },

    /// Target lies outside the canvas layout
    #[error("pixel ({x}, {y}) is outside the canvas")]
    OutOfCanvas {
        /// Requested x
        x: u32,
        /// Requested y
        y: u32,
    },
}

impl GatewayError {
    /// Check if the service rejected the bearer token
    #[inline]
    #[must_use]
    pub fn indicates_expired_credential(&self) -> bool {
        matches!(self, Self::Status { code: 401 | 403, .. })
    }
}

/// Credential acquisition errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// No session identifiers supplied
    #[error("no session identifiers supplied")]
    NoSessions,

    /// Slot index out of range
    #[error("no credential slot {0}")]
    UnknownSlot(usize),

    /// Token request failed
    #[error("token request failed: {0}")]
    Request(String),

    /// Page did not embed a token
    #[error("no access token found in session page")]
    TokenNotFound,
}

/// Startup configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Required credential input missing
    #[error("missing access credentials: supply --sessions or CANVAS_WARDEN_SESSIONS")]
    MissingCredentials,

    /// A value is out of range
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}
