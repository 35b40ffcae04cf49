//! Error types for the marisma workspace

use thiserror::Error;

/// Main error type for marisma operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("band '{band}' not found (available: {available:?})")]
    BandNotFound {
        band: String,
        available: Vec<String>,
    },

    #[error("duplicate band name '{0}'")]
    DuplicateBand(String),

    #[error("band schema mismatch: {left:?} vs {right:?}")]
    SchemaMismatch {
        left: Vec<String>,
        right: Vec<String>,
    },

    #[error("grid size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch {
        er: usize,
        ec: usize,
        ar: usize,
        ac: usize,
    },

    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("index out of bounds: ({row}, {col}) in grid of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("invalid grid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("expression error: {0}")]
    Expression(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("external service failure in {operation} for '{id}': {detail}")]
    External {
        operation: String,
        id: String,
        detail: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for marisma operations
pub type Result<T> = std::result::Result<T, Error>;
