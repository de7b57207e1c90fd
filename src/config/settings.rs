use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::RegimeError;
use crate::types::{Interval, RegimeLabel};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub regime: RegimeSettings,
    pub data: DataSettings,
    pub hmm: HmmSettings,
    pub output: OutputSettings,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Regime validation
        if let Err(e) = self.regime.validate() {
            errors.push(e.to_string());
        }

        // Data validation
        if self.data.ticker.trim().is_empty() {
            errors.push("data.ticker must not be empty".to_string());
        }
        if let Some(end) = self.data.end {
            if end < self.data.history_start {
                errors.push("data.end must not precede data.history_start".to_string());
            }
        }
        if let (Some(start), Some(end)) = (self.data.display_start, self.data.display_end) {
            if end < start {
                errors.push("data.display_end must not precede data.display_start".to_string());
            }
        }

        // HMM validation
        if self.hmm.n_states == 0 {
            errors.push("hmm.n_states must be > 0".to_string());
        }
        if self.hmm.n_iter == 0 {
            errors.push("hmm.n_iter must be > 0".to_string());
        }
        if self.hmm.tolerance.is_nan() || self.hmm.tolerance <= 0.0 {
            errors.push("hmm.tolerance must be > 0".to_string());
        }
        if self.hmm.ticker.trim().is_empty() || self.hmm.vix_ticker.trim().is_empty() {
            errors.push("hmm.ticker and hmm.vix_ticker must not be empty".to_string());
        }

        // Output validation
        if self.output.regime_labels.len() != RegimeLabel::ALL.len() {
            errors.push(format!(
                "output.regime_labels must name {} regimes",
                RegimeLabel::ALL.len()
            ));
        }
        if self.output.regime_colors.len() != RegimeLabel::ALL.len() {
            errors.push(format!(
                "output.regime_colors must list {} colors",
                RegimeLabel::ALL.len()
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Moving-average window and bear hysteresis thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeSettings {
    pub sma_window: usize,
    pub bear_entry_threshold: u32,
    pub bear_exit_confirmation: u32,
}

impl Default for RegimeSettings {
    fn default() -> Self {
        Self {
            sma_window: 50,
            bear_entry_threshold: 10,
            bear_exit_confirmation: 4,
        }
    }
}

impl RegimeSettings {
    pub fn validate(&self) -> Result<(), RegimeError> {
        if self.sma_window == 0 {
            return Err(RegimeError::InvalidConfiguration(
                "sma_window must be > 0".to_string(),
            ));
        }
        if self.bear_entry_threshold == 0 {
            return Err(RegimeError::InvalidConfiguration(
                "bear_entry_threshold must be > 0".to_string(),
            ));
        }
        if self.bear_exit_confirmation == 0 {
            return Err(RegimeError::InvalidConfiguration(
                "bear_exit_confirmation must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    pub ticker: String,
    /// Canonical first date of the instrument; every run classifies from here.
    pub history_start: NaiveDate,
    /// Last date to fetch, today when unset.
    pub end: Option<NaiveDate>,
    pub display_start: Option<NaiveDate>,
    pub display_end: Option<NaiveDate>,
    pub interval: Interval,
    /// Read prices from this JSON file instead of the network.
    pub price_file: Option<PathBuf>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            ticker: "^GSPC".to_string(),
            history_start: date(1946, 5, 21),
            end: None,
            display_start: None,
            display_end: None,
            interval: Interval::Weekly,
            price_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HmmSettings {
    pub ticker: String,
    pub vix_ticker: String,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub interval: Interval,
    pub n_states: usize,
    pub n_iter: usize,
    pub tolerance: f64,
}

impl Default for HmmSettings {
    fn default() -> Self {
        Self {
            ticker: "SPY".to_string(),
            vix_ticker: "^VIX".to_string(),
            start: date(2000, 1, 1),
            end: None,
            interval: Interval::Daily,
            n_states: 2,
            n_iter: 1000,
            tolerance: 1e-2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    pub dir: PathBuf,
    /// Display names indexed by regime code.
    pub regime_labels: Vec<String>,
    /// Hex colors indexed by regime code.
    pub regime_colors: Vec<String>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("plots"),
            regime_labels: RegimeLabel::ALL
                .iter()
                .map(|l| l.display_name().to_string())
                .collect(),
            regime_colors: RegimeLabel::ALL
                .iter()
                .map(|l| l.color().to_string())
                .collect(),
        }
    }
}

impl OutputSettings {
    /// Label overrides keyed by regime code, as handed to a renderer.
    pub fn label_overrides(&self) -> BTreeMap<usize, String> {
        self.regime_labels.iter().cloned().enumerate().collect()
    }
}
