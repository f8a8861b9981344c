//! Canvas view errors

use std::time::Duration;

/// Errors raised while reading the live canvas
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanvasError {
    /// Coordinate lies outside the tile layout or the decoded tile
    #[error("pixel ({x}, {y}) is outside the canvas")]
    OutOfBounds {
        /// Requested x
        x: u32,
        /// Requested y
        y: u32,
    },

    /// No bearer credential available to open the frame subscription
    #[error("no credential available for the canvas feed")]
    NoCredential,

    /// Frame subscription failed
    #[error("frame subscription failed: {0}")]
    Subscription(String),

    /// Frame subscription produced no frame in time
    #[error("frame subscription timed out after {0:?}")]
    Timeout(Duration),

    /// Frame download failed
    #[error("frame download failed: {0}")]
    Download(String),

    /// Frame bytes were not a decodable image
    #[error("frame decode failed: {0}")]
    Decode(String),
}

impl CanvasError {
    /// Check if a later attempt may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::OutOfBounds { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_is_not_retryable() {
        assert!(!CanvasError::OutOfBounds { x: 1, y: 2 }.is_retryable());
        assert!(CanvasError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(CanvasError::Download("503".into()).is_retryable());
    }

    #[test]
    fn display_mentions_coordinates() {
        let err = CanvasError::OutOfBounds { x: 2001, y: 4 };
        assert!(err.to_string().contains("(2001, 4)"));
    }
}
