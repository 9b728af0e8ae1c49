//! Per-user study progress: review totals and daily streaks.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::sm2::Rating;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_study_day: Option<NaiveDate>,
    pub reviews_total: u64,
    pub reviews_successful: u64,
}

impl Progress {
    /// Counts one review made on `today` and extends the daily streak.
    pub fn record_review(&mut self, today: NaiveDate, rating: Rating) {
        self.reviews_total += 1;
        if rating.is_success() {
            self.reviews_successful += 1;
        }

        match self.last_study_day {
            Some(last) if last == today => {}
            // clock went backwards; keep the streak as is
            Some(last) if today < last => return,
            Some(last) if last.succ_opt() == Some(today) => self.current_streak += 1,
            _ => self.current_streak = 1,
        }
        self.last_study_day = Some(today);
        self.longest_streak = self.longest_streak.max(self.current_streak);
    }

    /// The streak as it stands on `today`: zero once a whole day has been missed.
    pub fn current_streak_as_of(&self, today: NaiveDate) -> u32 {
        match self.last_study_day {
            Some(last) if last == today || last.succ_opt() == Some(today) => {
                self.current_streak
            }
            _ => 0,
        }
    }
}
