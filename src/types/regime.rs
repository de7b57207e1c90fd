use serde::{Deserialize, Serialize};
use std::fmt;

/// Market regime assigned to one step of the valid region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegimeLabel {
    Bull = 0,
    Correction = 1,
    Bear = 2,
}

impl RegimeLabel {
    pub const ALL: [RegimeLabel; 3] = [
        RegimeLabel::Bull,
        RegimeLabel::Correction,
        RegimeLabel::Bear,
    ];

    pub fn code(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeLabel::Bull => "Bull",
            RegimeLabel::Correction => "Correction",
            RegimeLabel::Bear => "Bear",
        }
    }

    /// Name used on rendered artifacts.
    pub fn display_name(&self) -> &'static str {
        match self {
            RegimeLabel::Bull => "Bull Market",
            RegimeLabel::Correction => "Correction",
            RegimeLabel::Bear => "Bear Market",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            RegimeLabel::Bull => "#097969",
            RegimeLabel::Correction => "#ffca3a",
            RegimeLabel::Bear => "#D22B2B",
        }
    }
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sampling period of a price history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Daily,
    Weekly,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "1d",
            Interval::Weekly => "1wk",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
