use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::PricePoint;

/// Summary of a labelled price sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeAnalytics {
    pub distribution: RegimeDistribution,
    pub episodes: Vec<RegimeEpisode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeDistribution {
    pub total: usize,
    pub shares: Vec<RegimeShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeShare {
    pub code: usize,
    pub count: usize,
    /// Percentage of all labelled periods, two decimal places.
    pub share_pct: Decimal,
}

/// Maximal run of consecutive periods sharing one regime code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeEpisode {
    pub code: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub periods: usize,
}

impl RegimeAnalytics {
    /// `prices` and `codes` are aligned index by index; any surplus on either side is ignored.
    pub fn calculate(prices: &[PricePoint], codes: &[usize]) -> Self {
        let n = prices.len().min(codes.len());
        Self {
            distribution: RegimeDistribution::from_codes(&codes[..n]),
            episodes: regime_episodes(&prices[..n], &codes[..n]),
        }
    }

    pub fn longest_episode(&self, code: usize) -> Option<&RegimeEpisode> {
        self.episodes
            .iter()
            .filter(|e| e.code == code)
            .max_by_key(|e| e.periods)
    }

    pub fn current_episode(&self) -> Option<&RegimeEpisode> {
        self.episodes.last()
    }
}

impl RegimeDistribution {
    pub fn from_codes(codes: &[usize]) -> Self {
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for &code in codes {
            *counts.entry(code).or_insert(0) += 1;
        }

        let total = codes.len();
        let shares = counts
            .into_iter()
            .map(|(code, count)| RegimeShare {
                code,
                count,
                share_pct: (Decimal::from(count as u64) / Decimal::from(total as u64) * dec!(100))
                    .round_dp(2),
            })
            .collect();

        Self { total, shares }
    }
}

pub fn regime_episodes(prices: &[PricePoint], codes: &[usize]) -> Vec<RegimeEpisode> {
    let mut episodes: Vec<RegimeEpisode> = Vec::new();

    for (point, &code) in prices.iter().zip(codes) {
        match episodes.last_mut() {
            Some(current) if current.code == code => {
                current.end = point.timestamp;
                current.periods += 1;
            }
            _ => episodes.push(RegimeEpisode {
                code,
                start: point.timestamp,
                end: point.timestamp,
                periods: 1,
            }),
        }
    }

    episodes
}
