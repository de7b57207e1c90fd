use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

use super::PriceSource;
use crate::types::PricePoint;

/// Offline price history stored as a JSON array of `{"timestamp", "price"}` records.
///
/// The ticker is ignored; one file holds one instrument.
#[derive(Debug, Clone)]
pub struct FilePriceSource {
    path: PathBuf,
}

impl FilePriceSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<Vec<PricePoint>> {
        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read price file {}", self.path.display()))?;
        let points: Vec<PricePoint> = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse price file {}", self.path.display()))?;
        Ok(points)
    }
}

#[async_trait]
impl PriceSource for FilePriceSource {
    async fn fetch_closes(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>> {
        let points: Vec<PricePoint> = self
            .load()?
            .into_iter()
            .filter(|p| p.timestamp >= start && p.timestamp <= end)
            .collect();

        info!(
            "Loaded {} closes for {} from {}",
            points.len(),
            ticker,
            self.path.display()
        );
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_filters_to_requested_range() {
        let path = std::env::temp_dir().join(format!("regime_prices_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[
                {"timestamp":"2020-01-06T00:00:00Z","price":"100.5"},
                {"timestamp":"2020-01-13T00:00:00Z","price":"101"},
                {"timestamp":"2020-01-20T00:00:00Z","price":"99.75"}
            ]"#,
        )
        .unwrap();

        let source = FilePriceSource::new(&path);
        let start = Utc.with_ymd_and_hms(2020, 1, 10, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 12, 31, 0, 0, 0).unwrap();
        let points = tokio_test::block_on(source.fetch_closes("SPY", start, end)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].price, dec!(101));
        assert_eq!(points[1].price, dec!(99.75));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let source = FilePriceSource::new("/nonexistent/prices.json");
        assert!(source.load().is_err());
    }
}
