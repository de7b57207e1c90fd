pub mod file;
pub mod yahoo;

pub use file::*;
pub use yahoo::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::PricePoint;

/// Provider of closing prices, oldest first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_closes(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PricePoint>>;
}
