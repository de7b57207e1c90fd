use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use super::{count_streaks, BearState, RegimeStateMachine, StreakState};
use crate::config::RegimeSettings;
use crate::error::RegimeError;
use crate::indicators::calculate_sma_series;
use crate::types::{PricePoint, PriceSeries, RegimeLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassificationStatus {
    Complete,
    /// Fewer points than the moving-average window; no step has a label.
    InsufficientHistory { required: usize, available: usize },
}

/// Everything derived for one step of the valid region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeStep {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub moving_average: Decimal,
    pub streak: StreakState,
    pub bear_state: BearState,
    pub label: RegimeLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub status: ClassificationStatus,
    pub steps: Vec<RegimeStep>,
}

/// Moving average, streak counting and bear hysteresis over one full price history.
#[derive(Debug, Clone)]
pub struct RegimeClassifier {
    sma_window: usize,
    machine: RegimeStateMachine,
}

impl RegimeClassifier {
    pub fn new(settings: &RegimeSettings) -> Result<Self, RegimeError> {
        settings.validate()?;
        Ok(Self {
            sma_window: settings.sma_window,
            machine: RegimeStateMachine::new(
                settings.bear_entry_threshold,
                settings.bear_exit_confirmation,
            ),
        })
    }

    pub fn classify(&self, series: &PriceSeries) -> Classification {
        if series.len() < self.sma_window {
            debug!(
                "Insufficient history: {} points for a {}-period average",
                series.len(),
                self.sma_window
            );
            return Classification {
                status: ClassificationStatus::InsufficientHistory {
                    required: self.sma_window,
                    available: series.len(),
                },
                steps: Vec::new(),
            };
        }

        let averages = calculate_sma_series(&series.prices(), self.sma_window);
        let valid: Vec<(&PricePoint, Decimal)> = series
            .points()
            .iter()
            .zip(averages)
            .filter_map(|(point, ma)| ma.map(|ma| (point, ma)))
            .collect();

        let streaks = count_streaks(valid.iter().map(|(point, ma)| point.price >= *ma));
        let states = self.machine.run(&streaks);

        let steps: Vec<RegimeStep> = valid
            .into_iter()
            .zip(streaks)
            .zip(states)
            .map(|(((point, ma), streak), (bear_state, label))| RegimeStep {
                timestamp: point.timestamp,
                price: point.price,
                moving_average: ma,
                streak,
                bear_state,
                label,
            })
            .collect();

        debug!(
            "Classified {} steps ({} warm-up points skipped)",
            steps.len(),
            self.sma_window - 1
        );

        Classification {
            status: ClassificationStatus::Complete,
            steps,
        }
    }
}
