//! Palette errors

/// Errors raised while building or parsing a palette
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaletteError {
    /// Hex string is not `#RRGGBB`
    #[error("invalid hex color: {0}")]
    InvalidHex(String),

    /// Two entries share an id
    #[error("duplicate color id: {0}")]
    DuplicateId(u8),

    /// Catalog has no entries
    #[error("palette is empty")]
    Empty,

    /// Built-in palette name not recognised
    #[error("unknown palette: {0}")]
    UnknownKind(String),
}
