use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised before any regime computation starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegimeError {
    #[error("timestamp at index {index} ({current}) precedes the previous point ({previous})")]
    NonMonotonicTimestamp {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("duplicate timestamp {timestamp} at index {index}")]
    DuplicateTimestamp {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("price at index {index} must be positive, got {price}")]
    NonPositivePrice { index: usize, price: Decimal },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
