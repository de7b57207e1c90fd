use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analytics::{RegimeAnalytics, RegimeEpisode};
use crate::types::PricePoint;

pub const SERIES_FILE: &str = "regime_series.json";
pub const DISTRIBUTION_FILE: &str = "regime_distribution.json";

/// Colors for codes beyond the configured palette, cycled.
const FALLBACK_COLORS: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Writes regime artifacts for a labelled price sequence and returns the files written.
pub trait RegimeRenderer {
    fn render(
        &self,
        prices: &[PricePoint],
        regimes: &[usize],
        out_dir: &Path,
        labels: Option<&BTreeMap<usize, String>>,
    ) -> Result<Vec<PathBuf>>;
}

#[derive(Debug, Serialize)]
struct SeriesRecord<'a> {
    timestamp: DateTime<Utc>,
    price: Decimal,
    regime: usize,
    label: &'a str,
    color: &'a str,
}

#[derive(Debug, Serialize)]
struct DistributionRecord<'a> {
    regime: usize,
    label: &'a str,
    color: &'a str,
    count: usize,
    share_pct: Decimal,
}

#[derive(Debug, Serialize)]
struct DistributionReport<'a> {
    total: usize,
    regimes: Vec<DistributionRecord<'a>>,
    episodes: &'a [RegimeEpisode],
}

/// JSON artifacts: one record per labelled period plus a distribution summary.
#[derive(Debug, Clone, Default)]
pub struct JsonReportRenderer {
    colors: Vec<String>,
}

impl JsonReportRenderer {
    pub fn new(colors: Vec<String>) -> Self {
        Self { colors }
    }

    fn color(&self, code: usize) -> &str {
        self.colors
            .get(code)
            .map(String::as_str)
            .unwrap_or(FALLBACK_COLORS[code % FALLBACK_COLORS.len()])
    }

    fn resolve_labels(
        regimes: &[usize],
        overrides: Option<&BTreeMap<usize, String>>,
    ) -> BTreeMap<usize, String> {
        regimes
            .iter()
            .map(|&code| {
                let name = overrides
                    .and_then(|o| o.get(&code).cloned())
                    .unwrap_or_else(|| format!("Regime {}", code));
                (code, name)
            })
            .collect()
    }
}

impl RegimeRenderer for JsonReportRenderer {
    fn render(
        &self,
        prices: &[PricePoint],
        regimes: &[usize],
        out_dir: &Path,
        labels: Option<&BTreeMap<usize, String>>,
    ) -> Result<Vec<PathBuf>> {
        if prices.len() != regimes.len() {
            return Err(anyhow!(
                "Cannot render {} regimes against {} prices",
                regimes.len(),
                prices.len()
            ));
        }

        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;

        let names = Self::resolve_labels(regimes, labels);

        let series: Vec<SeriesRecord> = prices
            .iter()
            .zip(regimes)
            .map(|(point, &code)| SeriesRecord {
                timestamp: point.timestamp,
                price: point.price,
                regime: code,
                label: &names[&code],
                color: self.color(code),
            })
            .collect();

        let analytics = RegimeAnalytics::calculate(prices, regimes);
        let report = DistributionReport {
            total: analytics.distribution.total,
            regimes: analytics
                .distribution
                .shares
                .iter()
                .map(|share| DistributionRecord {
                    regime: share.code,
                    label: &names[&share.code],
                    color: self.color(share.code),
                    count: share.count,
                    share_pct: share.share_pct,
                })
                .collect(),
            episodes: &analytics.episodes,
        };

        let series_path = out_dir.join(SERIES_FILE);
        std::fs::write(&series_path, serde_json::to_string_pretty(&series)?)
            .with_context(|| format!("Failed to write {}", series_path.display()))?;

        let distribution_path = out_dir.join(DISTRIBUTION_FILE);
        std::fs::write(&distribution_path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write {}", distribution_path.display()))?;

        info!(
            "Wrote {} labelled periods to {}",
            series.len(),
            out_dir.display()
        );

        Ok(vec![series_path, distribution_path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use serde_json::Value;

    fn prices(n: usize) -> Vec<PricePoint> {
        let origin = Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                PricePoint::new(
                    origin + Duration::weeks(i as i64),
                    dec!(4000) - Decimal::from(i as u64),
                )
            })
            .collect()
    }

    fn out_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("regime_render_{}_{}", name, std::process::id()))
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_render_with_label_overrides() {
        let dir = out_dir("labels");
        let renderer =
            JsonReportRenderer::new(vec!["#097969".into(), "#ffca3a".into(), "#D22B2B".into()]);
        let overrides: BTreeMap<usize, String> =
            [(0, "Bull Market"), (1, "Correction"), (2, "Bear Market")]
                .into_iter()
                .map(|(k, v)| (k, v.to_string()))
                .collect();

        let files = renderer
            .render(&prices(4), &[0, 1, 2, 2], &dir, Some(&overrides))
            .unwrap();
        assert_eq!(files, vec![dir.join(SERIES_FILE), dir.join(DISTRIBUTION_FILE)]);

        let series = read_json(&files[0]);
        assert_eq!(series.as_array().unwrap().len(), 4);
        assert_eq!(series[2]["label"], "Bear Market");
        assert_eq!(series[1]["color"], "#ffca3a");

        let report = read_json(&files[1]);
        assert_eq!(report["total"], 4);
        assert_eq!(report["regimes"][2]["count"], 2);
        assert_eq!(report["episodes"].as_array().unwrap().len(), 3);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_render_without_overrides_uses_generic_names() {
        let dir = out_dir("generic");
        let renderer = JsonReportRenderer::default();

        let files = renderer.render(&prices(3), &[0, 1, 1], &dir, None).unwrap();
        let series = read_json(&files[0]);
        assert_eq!(series[0]["label"], "Regime 0");
        assert_eq!(series[2]["label"], "Regime 1");
        assert_eq!(series[0]["color"], FALLBACK_COLORS[0]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_render_rejects_misaligned_input() {
        let dir = out_dir("misaligned");
        let renderer = JsonReportRenderer::default();
        assert!(renderer.render(&prices(3), &[0, 1], &dir, None).is_err());
        assert!(!dir.exists());
    }
}
