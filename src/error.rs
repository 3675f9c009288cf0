use thiserror::Error;

use crate::cleaner::CleaningDiagnostics;

/// Failures that abort a single animal-day (or pair-day) run
#[derive(Error, Debug)]
pub enum HerdError {
    #[error("Insufficient data: {valid_samples} valid samples after cleaning (need at least 2)")]
    InsufficientData {
        valid_samples: usize,
        diagnostics: CleaningDiagnostics,
    },

    #[error("No overlapping time window between {first} and {second}")]
    NoOverlap { first: String, second: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for pipeline operations
pub type HerdResult<T> = Result<T, HerdError>;

/// Why a single raw record was dropped. Counted, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unparsable time of day: {0:?}")]
    Time(String),

    #[error("Unparsable latitude: {0:?}")]
    Latitude(String),

    #[error("Unparsable longitude: {0:?}")]
    Longitude(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = HerdError::NoOverlap {
            first: "12".to_string(),
            second: "34".to_string(),
        };
        assert_eq!(err.to_string(), "No overlapping time window between 12 and 34");

        let err = HerdError::InsufficientData {
            valid_samples: 1,
            diagnostics: CleaningDiagnostics::default(),
        };
        assert!(err.to_string().contains("1 valid samples"));

        assert_eq!(
            ParseError::Time("25:99".to_string()).to_string(),
            "Unparsable time of day: \"25:99\""
        );
    }
}
