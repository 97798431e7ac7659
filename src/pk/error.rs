//! PK extraction error types

use thiserror::Error;

/// Errors that make a curve unusable for PK extraction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PkError {
    #[error("Time ({time}) and concentration ({concentration}) lengths differ")]
    LengthMismatch { time: usize, concentration: usize },

    #[error("At least {required} samples are required, found {found}")]
    TooFewPoints { found: usize, required: usize },

    #[error("Time is not strictly increasing at index {index}")]
    NotIncreasing { index: usize },

    #[error("Non-finite sample at index {index}")]
    NonFinite { index: usize },

    #[error("Invalid window [{start}, {end}]")]
    InvalidWindow { start: f64, end: f64 },

    #[error("Selection '{selection}' is not part of the trajectory")]
    MissingSelection { selection: String },
}
