use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use ndarray::{Array2, Axis};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use tracing::debug;

use crate::types::{PricePoint, PriceSeries};

pub const FEATURE_NAMES: [&str; 2] = ["asset_log_return", "vix_log"];

/// Standardized observation matrix plus the asset prices aligned to its rows.
#[derive(Debug, Clone)]
pub struct RegimeFeatures {
    pub observations: Array2<f64>,
    pub prices: Vec<PricePoint>,
}

impl RegimeFeatures {
    pub fn len(&self) -> usize {
        self.observations.nrows()
    }
}

/// Builds the two HMM features:
/// 1. Asset log return against the previous asset close
/// 2. Log level of the volatility index
///
/// Rows are kept only for calendar dates present in both series with a defined
/// return, then each column is z-scored with the sample standard deviation.
pub fn extract_regime_features(asset: &PriceSeries, vix: &PriceSeries) -> Result<RegimeFeatures> {
    let vix_log: HashMap<NaiveDate, f64> = vix
        .points()
        .iter()
        .map(|p| -> Result<(NaiveDate, f64)> { Ok((p.timestamp.date_naive(), to_f64(p)?.ln())) })
        .collect::<Result<_>>()?;

    let mut rows = Vec::new();
    let mut prices = Vec::new();

    for pair in asset.points().windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        let Some(&vix_value) = vix_log.get(&curr.timestamp.date_naive()) else {
            continue;
        };
        if !vix_value.is_finite() {
            continue;
        }

        let log_return = (to_f64(curr)? / to_f64(prev)?).ln();
        rows.extend([log_return, vix_value]);
        prices.push(*curr);
    }

    let n_obs = prices.len();
    if n_obs < 2 {
        return Err(anyhow!(
            "Need at least 2 aligned observations for regime features, got {}",
            n_obs
        ));
    }

    let mut observations = Array2::from_shape_vec((n_obs, FEATURE_NAMES.len()), rows)?;
    standardize(&mut observations)?;

    debug!(
        "Extracted {} observations ({} asset closes, {} vix closes)",
        n_obs,
        asset.len(),
        vix.len()
    );

    Ok(RegimeFeatures {
        observations,
        prices,
    })
}

fn to_f64(point: &PricePoint) -> Result<f64> {
    point
        .price
        .to_f64()
        .ok_or_else(|| anyhow!("Price {} at {} is not representable", point.price, point.timestamp))
}

/// In-place z-score of each column using the sample (n - 1) standard deviation.
fn standardize(observations: &mut Array2<f64>) -> Result<()> {
    for (j, mut column) in observations.axis_iter_mut(Axis(1)).enumerate() {
        let mean = column.mean().unwrap_or(0.0);
        let std = column.std(1.0);
        if !(std.is_finite() && std > 0.0) {
            return Err(anyhow!("Feature '{}' has zero variance", FEATURE_NAMES[j]));
        }
        column.mapv_inplace(|v| (v - mean) / std);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn day(n: i64, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 3, 2, hour, 30, 0).unwrap() + Duration::days(n)
    }

    fn series(values: &[(i64, Decimal)], hour: u32) -> PriceSeries {
        PriceSeries::new(
            values
                .iter()
                .map(|(d, p)| PricePoint::new(day(*d, hour), *p))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_features_are_standardized() {
        let asset = series(
            &[(0, dec!(100)), (1, dec!(102)), (2, dec!(99)), (3, dec!(101)), (4, dec!(104))],
            14,
        );
        let vix = series(
            &[(0, dec!(20)), (1, dec!(18)), (2, dec!(25)), (3, dec!(22)), (4, dec!(17))],
            14,
        );

        let features = extract_regime_features(&asset, &vix).unwrap();
        assert_eq!(features.observations.shape(), &[4, 2]);
        assert_eq!(features.prices[0].price, dec!(102));

        for column in features.observations.columns() {
            assert!(column.mean().unwrap().abs() < 1e-12);
            assert!((column.std(1.0) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_aligns_on_calendar_date() {
        // Different intraday stamps, one missing vix day.
        let asset = series(
            &[(0, dec!(100)), (1, dec!(101)), (2, dec!(103)), (3, dec!(102)), (4, dec!(105))],
            14,
        );
        let vix = series(&[(0, dec!(20)), (1, dec!(21)), (3, dec!(19)), (4, dec!(23))], 20);

        let features = extract_regime_features(&asset, &vix).unwrap();
        let dates: Vec<NaiveDate> = features
            .prices
            .iter()
            .map(|p| p.timestamp.date_naive())
            .collect();

        assert_eq!(features.len(), 3);
        assert_eq!(
            dates,
            vec![day(1, 0).date_naive(), day(3, 0).date_naive(), day(4, 0).date_naive()]
        );
    }

    #[test]
    fn test_too_few_rows() {
        let asset = series(&[(0, dec!(100)), (1, dec!(101))], 14);
        let vix = series(&[(0, dec!(20)), (1, dec!(21))], 14);
        assert!(extract_regime_features(&asset, &vix).is_err());
    }

    #[test]
    fn test_constant_vix_rejected() {
        let asset = series(&[(0, dec!(100)), (1, dec!(101)), (2, dec!(99))], 14);
        let vix = series(&[(0, dec!(20)), (1, dec!(20)), (2, dec!(20))], 14);
        assert!(extract_regime_features(&asset, &vix).is_err());
    }
}
