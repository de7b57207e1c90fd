use serde::{Deserialize, Serialize};

use super::StreakState;
use crate::types::RegimeLabel;

/// Whether a bear regime has been confirmed. The only state carried across steps
/// besides the streak counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BearState {
    #[default]
    NotInBear,
    InBear,
}

impl BearState {
    pub fn is_bear(&self) -> bool {
        matches!(self, BearState::InBear)
    }
}

/// Entry/exit hysteresis over the streak counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegimeStateMachine {
    bear_entry_threshold: u32,
    bear_exit_confirmation: u32,
}

impl RegimeStateMachine {
    pub fn new(bear_entry_threshold: u32, bear_exit_confirmation: u32) -> Self {
        Self {
            bear_entry_threshold,
            bear_exit_confirmation,
        }
    }

    /// One transition followed by labelling from the post-transition state.
    ///
    /// Both transitions are tested against the incoming state, so a step that
    /// enters the bear regime never leaves it in the same step.
    pub fn step(&self, state: BearState, streak: StreakState) -> (BearState, RegimeLabel) {
        let next = match state {
            BearState::NotInBear if streak.weeks_below >= self.bear_entry_threshold => {
                BearState::InBear
            }
            BearState::InBear if streak.weeks_above >= self.bear_exit_confirmation => {
                BearState::NotInBear
            }
            unchanged => unchanged,
        };

        let label = if next.is_bear() {
            RegimeLabel::Bear
        } else if streak.weeks_below > 0 {
            RegimeLabel::Correction
        } else {
            RegimeLabel::Bull
        };

        (next, label)
    }

    /// Folds [`step`](Self::step) over the streaks from `BearState::NotInBear`.
    pub fn run(&self, streaks: &[StreakState]) -> Vec<(BearState, RegimeLabel)> {
        streaks
            .iter()
            .scan(BearState::NotInBear, |state, streak| {
                let (next, label) = self.step(*state, *streak);
                *state = next;
                Some((next, label))
            })
            .collect()
    }
}
