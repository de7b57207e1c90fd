use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::RegimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self { timestamp, price }
    }
}

/// Price history sorted by strictly increasing timestamp with positive prices.
///
/// The only way to build one is [`PriceSeries::new`], so every series handed to the
/// classifier has already been checked for ordering, uniqueness and sign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>) -> Result<Self, RegimeError> {
        for (index, point) in points.iter().enumerate() {
            if point.price <= Decimal::ZERO {
                return Err(RegimeError::NonPositivePrice {
                    index,
                    price: point.price,
                });
            }

            if index == 0 {
                continue;
            }

            let previous = points[index - 1].timestamp;
            if point.timestamp == previous {
                return Err(RegimeError::DuplicateTimestamp {
                    index,
                    timestamp: point.timestamp,
                });
            }
            if point.timestamp < previous {
                return Err(RegimeError::NonMonotonicTimestamp {
                    index,
                    previous,
                    current: point.timestamp,
                });
            }
        }

        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn prices(&self) -> Vec<Decimal> {
        self.points.iter().map(|p| p.price).collect()
    }

    /// Points at or after `start`. A suffix keeps the ordering and sign guarantees.
    pub fn since(&self, start: DateTime<Utc>) -> PriceSeries {
        let from = self.points.partition_point(|p| p.timestamp < start);
        PriceSeries {
            points: self.points[from..].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn week(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 6, 0, 0, 0).unwrap() + Duration::weeks(n)
    }

    #[test]
    fn test_accepts_ordered_positive_series() {
        let series = PriceSeries::new(vec![
            PricePoint::new(week(0), dec!(100)),
            PricePoint::new(week(1), dec!(101.5)),
            PricePoint::new(week(2), dec!(99)),
        ])
        .unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.prices(), vec![dec!(100), dec!(101.5), dec!(99)]);
    }

    #[test]
    fn test_empty_series_is_valid() {
        let series = PriceSeries::new(Vec::new()).unwrap();
        assert_eq!(series.len(), 0);
        assert!(series.first().is_none());
    }

    #[test]
    fn test_since_keeps_suffix_from_timestamp() {
        let series = PriceSeries::new(
            (0..5)
                .map(|i| PricePoint::new(week(i), dec!(100) + Decimal::from(i)))
                .collect(),
        )
        .unwrap();

        let suffix = series.since(week(2));
        assert_eq!(suffix.prices(), vec![dec!(102), dec!(103), dec!(104)]);
        assert_eq!(suffix.first().unwrap().timestamp, week(2));

        // Between two points the later one is the first kept.
        let between = series.since(week(1) + Duration::days(3));
        assert_eq!(between.first().unwrap().timestamp, week(2));

        assert_eq!(series.since(week(0) - Duration::weeks(10)), series);
        assert_eq!(series.since(week(9)).len(), 0);
    }

    #[test]
    fn test_rejects_out_of_order_timestamps() {
        let err = PriceSeries::new(vec![
            PricePoint::new(week(0), dec!(100)),
            PricePoint::new(week(2), dec!(100)),
            PricePoint::new(week(1), dec!(100)),
        ])
        .unwrap_err();

        assert_eq!(
            err,
            RegimeError::NonMonotonicTimestamp {
                index: 2,
                previous: week(2),
                current: week(1),
            }
        );
    }

    #[test]
    fn test_rejects_duplicate_timestamps() {
        let err = PriceSeries::new(vec![
            PricePoint::new(week(0), dec!(100)),
            PricePoint::new(week(0), dec!(101)),
        ])
        .unwrap_err();

        assert!(matches!(err, RegimeError::DuplicateTimestamp { index: 1, .. }));
    }

    #[test]
    fn test_rejects_non_positive_price() {
        let err = PriceSeries::new(vec![
            PricePoint::new(week(0), dec!(100)),
            PricePoint::new(week(1), dec!(0)),
        ])
        .unwrap_err();

        assert_eq!(
            err,
            RegimeError::NonPositivePrice {
                index: 1,
                price: dec!(0),
            }
        );
    }
}
