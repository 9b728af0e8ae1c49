//! Review-state and progress storage.
//!
//! States are kept in memory behind the [`ReviewStore`] trait and persisted as
//! CSV files, one row per (user, card) pair or per user.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::progress::Progress;
use crate::sm2::{Rating, ReviewState};

const REVIEW_HEADER: [&str; 8] = [
    "user_id",
    "card_id",
    "ease_factor",
    "interval_days",
    "repetitions",
    "due_at",
    "last_reviewed_at",
    "rating",
];

const PROGRESS_HEADER: [&str; 6] = [
    "user_id",
    "current_streak",
    "longest_streak",
    "last_study_day",
    "reviews_total",
    "reviews_successful",
];

/// Lookup and upsert of review states by (user, card).
pub trait ReviewStore {
    fn get(&self, user_id: &str, card_id: &str) -> Option<ReviewState>;
    fn put(&mut self, user_id: &str, card_id: &str, state: ReviewState);
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    states: HashMap<(String, String), ReviewState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All states belonging to `user_id`, keyed by card id.
    pub fn states_for(&self, user_id: &str) -> HashMap<String, ReviewState> {
        self.states
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|((_, card), state)| (card.clone(), state.clone()))
            .collect()
    }

    fn sorted(&self) -> Vec<(&(String, String), &ReviewState)> {
        let mut rows: Vec<_> = self.states.iter().collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        rows
    }
}

impl ReviewStore for MemoryStore {
    fn get(&self, user_id: &str, card_id: &str) -> Option<ReviewState> {
        self.states
            .get(&(user_id.to_string(), card_id.to_string()))
            .cloned()
    }

    fn put(&mut self, user_id: &str, card_id: &str, state: ReviewState) {
        self.states
            .insert((user_id.to_string(), card_id.to_string()), state);
    }
}

// -- CSV row parsing --

struct Row<'a> {
    path: &'a Path,
    line: u64,
    record: csv::StringRecord,
}

impl Row<'_> {
    fn invalid(&self, message: impl Into<String>) -> Error {
        Error::InvalidRecord {
            path: self.path.to_path_buf(),
            line: self.line,
            message: message.into(),
        }
    }

    fn text(&self, index: usize, name: &str) -> Result<&str> {
        match self.record.get(index).map(str::trim) {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(self.invalid(format!("missing {name}"))),
        }
    }

    fn parse<T: std::str::FromStr>(&self, index: usize, name: &str) -> Result<T> {
        let s = self.text(index, name)?;
        s.parse()
            .map_err(|_| self.invalid(format!("invalid {name}: {s:?}")))
    }

    fn timestamp(&self, index: usize, name: &str) -> Result<DateTime<Utc>> {
        let s = self.text(index, name)?;
        DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| self.invalid(format!("invalid {name}: {e}")))
    }

    fn optional_date(&self, index: usize, name: &str) -> Result<Option<NaiveDate>> {
        match self.record.get(index).map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Some)
                .map_err(|e| self.invalid(format!("invalid {name}: {e}"))),
        }
    }
}

fn rows(path: &Path) -> Result<Vec<Row<'_>>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::csv(path, e))?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| Error::csv(path, e))?;
        let line = record.position().map_or(0, |p| p.line());
        rows.push(Row { path, line, record });
    }
    Ok(rows)
}

// -- Review states --

/// Loads a review-state file. A missing file is an empty store.
pub fn load_reviews(path: &Path) -> Result<MemoryStore> {
    let mut store = MemoryStore::new();
    if !path.exists() {
        debug!("no review file at {}, starting empty", path.display());
        return Ok(store);
    }

    for row in rows(path)? {
        let user_id = row.text(0, "user_id")?.to_string();
        let card_id = row.text(1, "card_id")?.to_string();
        let rating: i64 = row.parse(7, "rating")?;
        let state = ReviewState {
            ease_factor: row.parse(2, "ease_factor")?,
            interval_days: row.parse(3, "interval_days")?,
            repetitions: row.parse(4, "repetitions")?,
            due_at: row.timestamp(5, "due_at")?,
            last_reviewed_at: row.timestamp(6, "last_reviewed_at")?,
            rating: Rating::new(rating).map_err(|e| row.invalid(e.to_string()))?,
        };
        state.validate().map_err(|e| row.invalid(e.to_string()))?;
        store.put(&user_id, &card_id, state);
    }

    debug!("loaded {} review states from {}", store.len(), path.display());
    Ok(store)
}

pub fn save_reviews(path: &Path, store: &MemoryStore) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| Error::csv(path, e))?;

    writer
        .write_record(REVIEW_HEADER)
        .map_err(|e| Error::csv(path, e))?;
    for ((user_id, card_id), state) in store.sorted() {
        writer
            .write_record([
                user_id.clone(),
                card_id.clone(),
                state.ease_factor.to_string(),
                state.interval_days.to_string(),
                state.repetitions.to_string(),
                state.due_at.to_rfc3339(),
                state.last_reviewed_at.to_rfc3339(),
                state.rating.value().to_string(),
            ])
            .map_err(|e| Error::csv(path, e))?;
    }

    writer.flush()?;
    Ok(())
}

// -- Progress --

/// Loads per-user progress. A missing file yields no records.
pub fn load_progress(path: &Path) -> Result<HashMap<String, Progress>> {
    let mut progress = HashMap::new();
    if !path.exists() {
        return Ok(progress);
    }

    for row in rows(path)? {
        let user_id = row.text(0, "user_id")?.to_string();
        let record = Progress {
            current_streak: row.parse(1, "current_streak")?,
            longest_streak: row.parse(2, "longest_streak")?,
            last_study_day: row.optional_date(3, "last_study_day")?,
            reviews_total: row.parse(4, "reviews_total")?,
            reviews_successful: row.parse(5, "reviews_successful")?,
        };
        progress.insert(user_id, record);
    }
    Ok(progress)
}

pub fn save_progress(path: &Path, progress: &HashMap<String, Progress>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| Error::csv(path, e))?;

    writer
        .write_record(PROGRESS_HEADER)
        .map_err(|e| Error::csv(path, e))?;

    let mut users: Vec<&String> = progress.keys().collect();
    users.sort();
    for user_id in users {
        let p = &progress[user_id];
        writer
            .write_record([
                user_id.clone(),
                p.current_streak.to_string(),
                p.longest_streak.to_string(),
                p.last_study_day
                    .map_or(String::new(), |d| d.format("%Y-%m-%d").to_string()),
                p.reviews_total.to_string(),
                p.reviews_successful.to_string(),
            ])
            .map_err(|e| Error::csv(path, e))?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sm2::schedule_review;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap()
    }

    fn reviewed(rating: i64) -> ReviewState {
        schedule_review(None, Rating::new(rating).unwrap(), now()).unwrap()
    }

    #[test]
    fn get_put_by_user_and_card() {
        let mut store = MemoryStore::new();
        assert!(store.get("ana", "c1").is_none());

        store.put("ana", "c1", reviewed(4));
        store.put("ben", "c1", reviewed(1));

        assert_eq!(store.get("ana", "c1").unwrap().repetitions, 1);
        assert_eq!(store.get("ben", "c1").unwrap().repetitions, 0);
        assert!(store.get("ana", "c2").is_none());
        assert_eq!(store.states_for("ana").len(), 1);
    }

    #[test]
    fn put_replaces() {
        let mut store = MemoryStore::new();
        store.put("ana", "c1", reviewed(4));
        store.put("ana", "c1", reviewed(0));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("ana", "c1").unwrap().rating, Rating::AGAIN);
    }

    #[test]
    fn reviews_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.csv");

        let mut store = MemoryStore::new();
        let mut state = reviewed(5);
        state = schedule_review(Some(&state), Rating::new(3).unwrap(), now()).unwrap();
        store.put("ana", "es-1", state.clone());
        store.put("ana", "es-2", reviewed(2));

        save_reviews(&path, &store).unwrap();
        let loaded = load_reviews(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("ana", "es-1"), Some(state));
    }

    #[test]
    fn missing_reviews_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = load_reviews(&dir.path().join("none.csv")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn bad_row_names_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.csv");
        std::fs::write(
            &path,
            "user_id,card_id,ease_factor,interval_days,repetitions,due_at,last_reviewed_at,rating\n\
             ana,c1,0.9,1,0,2025-06-02T08:30:00+00:00,2025-06-01T08:30:00+00:00,4\n",
        )
        .unwrap();

        match load_reviews(&path).unwrap_err() {
            Error::InvalidRecord { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("ease factor"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_rating_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.csv");
        std::fs::write(
            &path,
            "user_id,card_id,ease_factor,interval_days,repetitions,due_at,last_reviewed_at,rating\n\
             ana,c1,2.5,1,1,2025-06-02T08:30:00+00:00,2025-06-01T08:30:00+00:00,9\n",
        )
        .unwrap();
        assert!(matches!(
            load_reviews(&path),
            Err(Error::InvalidRecord { .. })
        ));
    }

    #[test]
    fn progress_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.csv");

        let mut ana = Progress::default();
        ana.record_review(now().date_naive(), Rating::new(4).unwrap());
        let mut progress = HashMap::new();
        progress.insert("ana".to_string(), ana.clone());
        progress.insert("ben".to_string(), Progress::default());

        save_progress(&path, &progress).unwrap();
        let loaded = load_progress(&path).unwrap();
        assert_eq!(loaded, progress);
        assert_eq!(loaded["ana"], ana);
    }
}
