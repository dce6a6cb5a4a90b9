//! Error types for the placement engine
//!
//! Per-image processing is infallible: malformed proposals, rejected
//! candidates, unsatisfiable separations and degenerate energy fields are all
//! recorded in [`Diagnostics`](crate::Diagnostics) instead. The variants here
//! cover what is left: invalid configuration (checked once at startup) and the
//! I/O helpers around the core.

use thiserror::Error;

/// Errors raised by configuration loading and the I/O helpers
#[derive(Debug, Error)]
pub enum PlacementError {
    /// Configuration failed validation
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PlacementError {
    /// Shorthand for [`PlacementError::InvalidConfig`]
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns true if this error came from configuration validation
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}

/// Per-entry problems found while reading a proposal's element arrays.
///
/// These never abort a layout: the offending entry is kept with no box (or
/// dropped, if it is not even an object) and the error is logged as a
/// `MalformedInput` diagnostic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElementParseError {
    #[error("entry is not a JSON object")]
    NotAnObject,

    #[error("bbox is missing")]
    MissingBbox,

    #[error("bbox must have 4 entries, found {0}")]
    WrongArity(usize),

    #[error("bbox entry {index} is not a finite number")]
    NonNumeric { index: usize },

    #[error("bbox is not an array")]
    NotAnArray,
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PlacementError>;
