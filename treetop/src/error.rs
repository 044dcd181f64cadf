//! Error types for tree-top detection and stand summaries

use thiserror::Error;

/// Errors raised by the detection and aggregation core.
///
/// Empty results (no valid cells, no tree tops, stands without trees) are
/// never reported here; they are carried as data.
#[derive(Error, Debug)]
pub enum TreeTopError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid geometry for {entity}: {reason}")]
    GeometryInput { entity: String, reason: String },

    #[error("Stand {setting_id} has zero area; trees per acre is undefined")]
    ZeroArea { setting_id: String },

    #[error("Invalid grid dimensions: {rows}x{cols} with {len} values")]
    InvalidDimensions { rows: usize, cols: usize, len: usize },

    #[error("Grid size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch {
        er: usize,
        ec: usize,
        ar: usize,
        ac: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl TreeTopError {
    /// True for errors caused by run configuration rather than input data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TreeTopError::Configuration(_)
                | TreeTopError::InvalidParameter { .. }
                | TreeTopError::ZeroArea { .. }
        )
    }

    pub(crate) fn geometry(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        TreeTopError::GeometryInput {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for the detection and aggregation core
pub type Result<T> = std::result::Result<T, TreeTopError>;
