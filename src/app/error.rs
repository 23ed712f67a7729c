use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::Strategy;

#[derive(Error, Debug)]
pub enum SedimentError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Rate limited by upstream{}", reset_at.map(|t| format!(" (resets at {})", t.format("%H:%M:%S UTC"))).unwrap_or_default())]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("Response parsing error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Strategy {0} is not supported by this source")]
    UnsupportedStrategy(Strategy),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl SedimentError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// True for a primary-key / unique constraint rejection from the store.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
                    && matches!(
                        err.extended_code,
                        rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                            | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    )
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SedimentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_display_with_reset() {
        let reset = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let err = SedimentError::RateLimited {
            reset_at: Some(reset),
        };
        assert!(err.is_rate_limited());
        assert_eq!(
            err.to_string(),
            "Rate limited by upstream (resets at 22:13:20 UTC)"
        );
    }

    #[test]
    fn test_rate_limited_display_without_reset() {
        let err = SedimentError::RateLimited { reset_at: None };
        assert_eq!(err.to_string(), "Rate limited by upstream");
    }

    #[test]
    fn test_unique_violation_detection() {
        let err = SedimentError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY),
            Some("UNIQUE constraint failed: posts.post_id".into()),
        ));
        assert!(err.is_unique_violation());
        assert!(!SedimentError::Other("x".into()).is_unique_violation());
    }
}
