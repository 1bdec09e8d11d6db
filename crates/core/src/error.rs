//! Error types for Rivulet

use thiserror::Error;

/// Main error type for Rivulet operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// The raster cannot be opened, is multi-band, or holds a value that
    /// cannot be decoded.
    #[error("Invalid raster: {reason}")]
    InvalidRaster { reason: String },

    /// The seed is off the grid or sits on a no-data cell.
    #[error("Seed {location} cannot start a trace: {reason}")]
    SeedOutOfBounds {
        location: String,
        reason: &'static str,
    },

    /// Flow directions loop back onto an already visited cell.
    #[error("Cyclic flow: cell ({row}, {col}) revisited after {steps} steps")]
    CyclicFlow { row: usize, col: usize, steps: usize },

    #[error("Elevation grid does not match flow direction grid: expected {expected}, got {actual}")]
    GridMismatch { expected: String, actual: String },

    #[error("Cannot sample elevation for cell ({row}, {col}) at ({x:.3}, {y:.3}): {reason}")]
    ElevationSample {
        row: usize,
        col: usize,
        x: f64,
        y: f64,
        reason: &'static str,
    },

    #[error("{0}")]
    Other(String),
}

/// Shorthand constructors
impl Error {
    pub fn invalid_raster(reason: impl Into<String>) -> Self {
        Error::InvalidRaster {
            reason: reason.into(),
        }
    }
}

/// Result type alias for Rivulet operations
pub type Result<T> = std::result::Result<T, Error>;
