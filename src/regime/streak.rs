use serde::{Deserialize, Serialize};

/// Length of the current run below / at-or-above the moving average.
///
/// Exactly one counter is nonzero once at least one step has been counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub weeks_below: u32,
    pub weeks_above: u32,
}

impl StreakState {
    pub fn advance(self, above_or_equal: bool) -> Self {
        if above_or_equal {
            Self {
                weeks_below: 0,
                weeks_above: self.weeks_above + 1,
            }
        } else {
            Self {
                weeks_below: self.weeks_below + 1,
                weeks_above: 0,
            }
        }
    }
}

/// Run lengths for each step, starting from zero at the first flag.
pub fn count_streaks<I>(above_or_equal: I) -> Vec<StreakState>
where
    I: IntoIterator<Item = bool>,
{
    above_or_equal
        .into_iter()
        .scan(StreakState::default(), |streak, flag| {
            *streak = streak.advance(flag);
            Some(*streak)
        })
        .collect()
}
