use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::{Classification, ClassificationStatus, RegimeClassifier};
use crate::data::PriceSource;
use crate::types::{PricePoint, PriceSeries, RegimeLabel};

/// Inclusive timestamp bounds applied to an already classified history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DisplayWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| timestamp >= s) && self.end.map_or(true, |e| timestamp <= e)
    }
}

/// Labels and prices for the requested window, aligned one-to-one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeView {
    pub status: ClassificationStatus,
    pub prices: Vec<PricePoint>,
    pub labels: Vec<RegimeLabel>,
}

impl RegimeView {
    /// Post-hoc projection of a full classification onto `window`.
    pub fn project(classification: &Classification, window: &DisplayWindow) -> Self {
        let (prices, labels): (Vec<_>, Vec<_>) = classification
            .steps
            .iter()
            .filter(|s| window.contains(s.timestamp))
            .map(|s| (PricePoint::new(s.timestamp, s.price), s.label))
            .unzip();

        Self {
            status: classification.status,
            prices,
            labels,
        }
    }

    /// True both for insufficient history and for a window that selects nothing;
    /// `status` tells the two apart.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn codes(&self) -> Vec<usize> {
        self.labels.iter().map(|l| l.code()).collect()
    }
}

/// Classifies from the instrument's historical origin and only then applies the
/// caller's display window, so streaks and bear state at the start of the window
/// reflect the whole history.
#[derive(Debug, Clone)]
pub struct HistoricalContextPolicy {
    origin: DateTime<Utc>,
    classifier: RegimeClassifier,
}

impl HistoricalContextPolicy {
    pub fn new(origin: DateTime<Utc>, classifier: RegimeClassifier) -> Self {
        Self { origin, classifier }
    }

    /// Classifies `history` from the origin onwards and projects the result.
    /// Points earlier than the origin are not part of the canonical run.
    pub fn classify_series(&self, history: &PriceSeries, window: &DisplayWindow) -> RegimeView {
        let canonical = history.since(self.origin);
        let classification = self.classifier.classify(&canonical);
        RegimeView::project(&classification, window)
    }

    /// Fetches everything from the origin through `end`, classifies it, then slices.
    pub async fn run(
        &self,
        source: &dyn PriceSource,
        ticker: &str,
        end: DateTime<Utc>,
        window: &DisplayWindow,
    ) -> Result<RegimeView> {
        if let Some(start) = window.start {
            if start < self.origin {
                warn!(
                    "Display start {} precedes historical origin {}; showing from the origin",
                    start.date_naive(),
                    self.origin.date_naive()
                );
            }
        }

        let points = source.fetch_closes(ticker, self.origin, end).await?;
        let history = PriceSeries::new(points)?;

        info!(
            "Classifying {} points of {} history from {}",
            history.len(),
            ticker,
            self.origin.date_naive()
        );

        let view = self.classify_series(&history, window);
        if let ClassificationStatus::InsufficientHistory { required, available } = view.status {
            warn!(
                "Only {} points available, {} needed before any regime can be labelled",
                available, required
            );
        }

        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegimeSettings;
    use crate::data::MockPriceSource;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 3, 0, 0, 0).unwrap()
    }

    fn week(n: i64) -> DateTime<Utc> {
        origin() + Duration::weeks(n)
    }

    fn points(prices: &[Decimal]) -> Vec<PricePoint> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| PricePoint::new(week(i as i64), *p))
            .collect()
    }

    /// Flat start, a ten-week decline into bear, a two-week bounce, then a second leg down.
    fn bear_history() -> Vec<Decimal> {
        let mut prices = vec![dec!(100); 5];
        prices.extend((90..=99).rev().map(Decimal::from));
        prices.extend([dec!(95), dec!(96)]);
        prices.extend((80..=89).rev().map(Decimal::from));
        prices
    }

    fn policy() -> HistoricalContextPolicy {
        let settings = RegimeSettings {
            sma_window: 5,
            bear_entry_threshold: 10,
            bear_exit_confirmation: 4,
        };
        HistoricalContextPolicy::new(origin(), RegimeClassifier::new(&settings).unwrap())
    }

    #[test]
    fn test_window_keeps_bear_state_from_history() {
        let history = PriceSeries::new(points(&bear_history())).unwrap();
        let window = DisplayWindow::new(Some(week(17)), None);

        let view = policy().classify_series(&history, &window);

        // The window opens on the second leg down while the bear regime from the
        // first decline is still active.
        assert_eq!(view.prices[0].timestamp, week(17));
        assert!(view.labels.iter().all(|l| *l == RegimeLabel::Bear));

        // Classifying only the windowed data restarts the state machine.
        let truncated = PriceSeries::new(
            points(&bear_history())
                .into_iter()
                .filter(|p| p.timestamp >= week(17))
                .collect(),
        )
        .unwrap();
        let naive = policy().classify_series(&truncated, &DisplayWindow::default());
        assert_ne!(naive.labels.first(), view.labels.first());
    }

    #[test]
    fn test_subwindow_matches_full_window() {
        let history = PriceSeries::new(points(&bear_history())).unwrap();
        let policy = policy();

        let wide_window = DisplayWindow::new(Some(week(6)), Some(week(24)));
        let narrow_window = DisplayWindow::new(Some(week(10)), Some(week(18)));
        let wide = policy.classify_series(&history, &wide_window);
        let narrow = policy.classify_series(&history, &narrow_window);

        for (point, label) in narrow.prices.iter().zip(&narrow.labels) {
            let i = wide.prices.iter().position(|p| p.timestamp == point.timestamp).unwrap();
            assert_eq!(wide.labels[i], *label);
        }
        assert_eq!(narrow.labels.len(), 9);
    }

    #[test]
    fn test_window_beyond_data_is_empty_but_complete() {
        let history = PriceSeries::new(points(&bear_history())).unwrap();
        let view = policy().classify_series(&history, &DisplayWindow::new(Some(week(500)), None));

        assert!(view.is_empty());
        assert_eq!(view.status, ClassificationStatus::Complete);
    }

    #[test]
    fn test_points_before_origin_are_ignored() {
        let early = origin() - Duration::weeks(3);
        let mut all = vec![
            PricePoint::new(early, dec!(500)),
            PricePoint::new(early + Duration::weeks(1), dec!(500)),
            PricePoint::new(early + Duration::weeks(2), dec!(500)),
        ];
        all.extend(points(&bear_history()));
        let with_prefix = PriceSeries::new(all).unwrap();
        let canonical = PriceSeries::new(points(&bear_history())).unwrap();

        let policy = policy();
        assert_eq!(
            policy.classify_series(&with_prefix, &DisplayWindow::default()),
            policy.classify_series(&canonical, &DisplayWindow::default())
        );
    }

    #[test]
    fn test_run_fetches_from_origin_not_display_start() {
        let mut source = MockPriceSource::new();
        source
            .expect_fetch_closes()
            .withf(|ticker, start, _end| ticker == "^GSPC" && *start == origin())
            .times(1)
            .returning(|_, _, _| Ok(points(&bear_history())));

        let window = DisplayWindow::new(Some(week(17)), None);
        let view =
            tokio_test::block_on(policy().run(&source, "^GSPC", week(100), &window)).unwrap();

        assert_eq!(view.labels.len(), bear_history().len() - 17);
        assert!(view.labels.iter().all(|l| *l == RegimeLabel::Bear));
    }

    #[test]
    fn test_run_rejects_unordered_history() {
        let mut source = MockPriceSource::new();
        source.expect_fetch_closes().returning(|_, _, _| {
            let mut pts = points(&[dec!(100), dec!(101), dec!(102)]);
            pts.swap(0, 2);
            Ok(pts)
        });

        let window = DisplayWindow::default();
        let result = tokio_test::block_on(policy().run(&source, "SPY", week(10), &window));
        assert!(result.is_err());
    }

    #[test]
    fn test_run_reports_insufficient_history() {
        let mut source = MockPriceSource::new();
        source
            .expect_fetch_closes()
            .returning(|_, _, _| Ok(points(&[dec!(100), dec!(101)])));

        let window = DisplayWindow::default();
        let view = tokio_test::block_on(policy().run(&source, "SPY", week(10), &window)).unwrap();
        assert!(view.is_empty());
        assert_eq!(
            view.status,
            ClassificationStatus::InsufficientHistory {
                required: 5,
                available: 2,
            }
        );
    }
}
