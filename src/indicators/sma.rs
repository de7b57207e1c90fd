use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Trailing simple moving average over a fixed window.
#[derive(Debug, Clone)]
pub struct SMA {
    period: usize,
    window: VecDeque<Decimal>,
}

impl SMA {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: VecDeque::with_capacity(period),
        }
    }

    pub fn update(&mut self, price: Decimal) -> Option<Decimal> {
        if self.period == 0 {
            return None;
        }

        if self.window.len() == self.period {
            self.window.pop_front();
        }
        self.window.push_back(price);

        if self.window.len() < self.period {
            return None;
        }

        // Re-summed each step: the value depends only on the trailing window.
        let sum: Decimal = self.window.iter().sum();
        Some(sum / Decimal::from(self.period as u64))
    }
}

/// Moving average aligned to `prices`: `None` for the first `period - 1` entries.
pub fn calculate_sma_series(prices: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut sma = SMA::new(period);
    prices.iter().map(|p| sma.update(*p)).collect()
}
