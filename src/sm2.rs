// SM-2 spaced repetition scheduling.
// Ratings run from 0 (Again) to 5 (Perfect); 3 and above is a successful recall.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MIN_RATING: u8 = 0;
pub const MAX_RATING: u8 = 5;
pub const SUCCESS_THRESHOLD: u8 = 3;

pub const MIN_EASE: f64 = 1.3;
pub const MAX_EASE: f64 = 3.0;
pub const DEFAULT_EASE: f64 = 2.5;
pub const DEFAULT_INTERVAL: u32 = 1;
/// Longest interval a card can reach (100 years); growth saturates here.
pub const MAX_INTERVAL: u32 = 36_500;

const FAILURE_EASE_PENALTY: f64 = 0.2;

/// Learner's self-assessed recall quality for one review.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const AGAIN: Rating = Rating(MIN_RATING);
    pub const PERFECT: Rating = Rating(MAX_RATING);

    pub fn new(value: i64) -> Result<Rating> {
        if (i64::from(MIN_RATING)..=i64::from(MAX_RATING)).contains(&value) {
            Ok(Rating(value as u8))
        } else {
            Err(out_of_range())
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 >= SUCCESS_THRESHOLD
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            0 => "Again",
            1 => "Wrong",
            2 => "Almost",
            3 => "Hard",
            4 => "Good",
            _ => "Perfect",
        }
    }

    /// Every rating on the scale, lowest first.
    pub fn all() -> impl Iterator<Item = Rating> {
        (MIN_RATING..=MAX_RATING).map(Rating)
    }
}

fn out_of_range() -> Error {
    Error::InvalidInput(format!(
        "rating must be between {MIN_RATING} and {MAX_RATING}"
    ))
}

impl TryFrom<i64> for Rating {
    type Error = Error;

    fn try_from(value: i64) -> Result<Rating> {
        Rating::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(r: Rating) -> u8 {
        r.0
    }
}

impl FromStr for Rating {
    type Err = Error;

    fn from_str(s: &str) -> Result<Rating> {
        let n: i64 = s.trim().parse().map_err(|_| out_of_range())?;
        Rating::new(n)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

/// Scheduling record for one (user, card) pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
    pub ease_factor: f64,
    /// Between 1 and [`MAX_INTERVAL`].
    pub interval_days: u32,
    pub repetitions: u32,
    pub due_at: DateTime<Utc>,
    pub last_reviewed_at: DateTime<Utc>,
    pub rating: Rating,
}

impl ReviewState {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }

    /// Rejects states that could not have been produced by [`schedule_review`].
    pub fn validate(&self) -> Result<()> {
        if !self.ease_factor.is_finite() || !(MIN_EASE..=MAX_EASE).contains(&self.ease_factor) {
            return Err(Error::InvalidInput(format!(
                "ease factor must be between {MIN_EASE} and {MAX_EASE}, got {}",
                self.ease_factor
            )));
        }
        if !(1..=MAX_INTERVAL).contains(&self.interval_days) {
            return Err(Error::InvalidInput(format!(
                "interval must be between 1 and {MAX_INTERVAL} days, got {}",
                self.interval_days
            )));
        }
        Ok(())
    }
}

fn ease_after_success(ease: f64, rating: Rating) -> f64 {
    let miss = f64::from(MAX_RATING - rating.value());
    (ease + (0.1 - miss * (0.08 + miss * 0.02))).max(MIN_EASE)
}

fn grow_interval(interval: u32, ease: f64) -> u32 {
    // `as` saturates on overflow; the clamp then pins it at MAX_INTERVAL
    ((f64::from(interval) * ease).round() as u32).clamp(1, MAX_INTERVAL)
}

/// Computes the state that follows `state` after a review rated `rating` at `now`.
///
/// `None` means the card has never been reviewed and starts from the defaults.
pub fn schedule_review(
    state: Option<&ReviewState>,
    rating: Rating,
    now: DateTime<Utc>,
) -> Result<ReviewState> {
    let (ease, interval, repetitions) = match state {
        Some(s) => {
            s.validate()?;
            (s.ease_factor, s.interval_days, s.repetitions)
        }
        None => (DEFAULT_EASE, DEFAULT_INTERVAL, 0),
    };

    let (ease, interval, repetitions) = if rating.is_success() {
        let repetitions = repetitions.saturating_add(1);
        let interval = match repetitions {
            1 => 1,
            2 => 6,
            _ => grow_interval(interval, ease),
        };
        (ease_after_success(ease, rating), interval, repetitions)
    } else {
        ((ease - FAILURE_EASE_PENALTY).max(MIN_EASE), 1, 0)
    };

    let due_at = now
        .checked_add_signed(Duration::days(i64::from(interval)))
        .ok_or_else(|| {
            Error::InvalidInput(format!("interval of {interval} days is out of range"))
        })?;

    Ok(ReviewState {
        ease_factor: ease.clamp(MIN_EASE, MAX_EASE),
        interval_days: interval,
        repetitions,
        due_at,
        last_reviewed_at: now,
        rating,
    })
}

/// Interval each rating would produce, lowest rating first.
pub fn preview_intervals(
    state: Option<&ReviewState>,
    now: DateTime<Utc>,
) -> Result<Vec<(Rating, u32)>> {
    Rating::all()
        .map(|r| schedule_review(state, r, now).map(|next| (r, next.interval_days)))
        .collect()
}
