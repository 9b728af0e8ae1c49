use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::card::Card;
use crate::error::Result;
use crate::sm2::{self, Rating, ReviewState};
use crate::store::ReviewStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Due,
    New,
}

/// Cards picked for the next session, as indices into the card list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub kind: QueueKind,
    pub indices: Vec<usize>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[derive(Debug, Serialize)]
pub struct DeckSummary {
    pub name: String,
    pub total: usize,
    pub due: usize,
    pub new: usize,
}

/// Due cards win: if any card is due every due card is returned, otherwise up to
/// `new_limit` never-reviewed cards. Both groups keep card-list order.
pub fn select_for_review(
    cards: &[Card],
    states: &HashMap<String, ReviewState>,
    now: DateTime<Utc>,
    new_limit: usize,
) -> Selection {
    let mut due = Vec::new();
    let mut new = Vec::new();
    for (i, card) in cards.iter().enumerate() {
        match states.get(&card.id) {
            Some(state) if state.is_due(now) => due.push(i),
            Some(_) => {}
            None => new.push(i),
        }
    }

    if !due.is_empty() {
        return Selection {
            kind: QueueKind::Due,
            indices: due,
        };
    }
    new.truncate(new_limit);
    Selection {
        kind: QueueKind::New,
        indices: new,
    }
}

/// Loads the card's state, schedules the review and stores the result.
///
/// Callers must not run two submissions for the same (user, card) concurrently.
pub fn submit_review<S: ReviewStore + ?Sized>(
    store: &mut S,
    user_id: &str,
    card_id: &str,
    rating: Rating,
    now: DateTime<Utc>,
) -> Result<ReviewState> {
    let prior = store.get(user_id, card_id);
    let next = sm2::schedule_review(prior.as_ref(), rating, now)?;
    debug!(
        user_id,
        card_id,
        rating = rating.value(),
        interval_days = next.interval_days,
        "review scheduled"
    );
    store.put(user_id, card_id, next.clone());
    Ok(next)
}

pub fn deck_summaries(
    cards: &[Card],
    states: &HashMap<String, ReviewState>,
    now: DateTime<Utc>,
) -> Vec<DeckSummary> {
    let mut decks: BTreeMap<&str, DeckSummary> = BTreeMap::new();
    for card in cards {
        let entry = decks.entry(&card.deck).or_insert_with(|| DeckSummary {
            name: card.deck.clone(),
            total: 0,
            due: 0,
            new: 0,
        });
        entry.total += 1;
        match states.get(&card.id) {
            Some(state) if state.is_due(now) => entry.due += 1,
            Some(_) => {}
            None => entry.new += 1,
        }
    }
    decks.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap()
    }

    fn card(id: &str, deck: &str) -> Card {
        Card {
            deck: deck.into(),
            front: format!("front {id}"),
            back: format!("back {id}"),
            media: String::new(),
            id: id.into(),
        }
    }

    fn state_due_at(due_at: DateTime<Utc>) -> ReviewState {
        ReviewState {
            ease_factor: 2.5,
            interval_days: 1,
            repetitions: 1,
            due_at,
            last_reviewed_at: due_at - Duration::days(1),
            rating: Rating::new(4).unwrap(),
        }
    }

    #[test]
    fn due_cards_hide_new_cards() {
        let cards = vec![card("1", "fr"), card("2", "fr"), card("3", "fr")];
        let mut states = HashMap::new();
        states.insert("2".to_string(), state_due_at(now() - Duration::days(2)));

        let sel = select_for_review(&cards, &states, now(), 10);
        assert_eq!(sel.kind, QueueKind::Due);
        assert_eq!(sel.indices, vec![1]);
    }

    #[test]
    fn new_cards_when_nothing_due() {
        let cards: Vec<Card> = (0..5).map(|i| card(&i.to_string(), "fr")).collect();
        let mut states = HashMap::new();
        states.insert("1".to_string(), state_due_at(now() + Duration::days(3)));

        let sel = select_for_review(&cards, &states, now(), 3);
        assert_eq!(sel.kind, QueueKind::New);
        assert_eq!(sel.indices, vec![0, 2, 3]);
    }

    #[test]
    fn due_boundary_is_inclusive() {
        let cards = vec![card("1", "fr")];
        let mut states = HashMap::new();
        states.insert("1".to_string(), state_due_at(now()));
        let sel = select_for_review(&cards, &states, now(), 10);
        assert_eq!(sel.kind, QueueKind::Due);
        assert_eq!(sel.indices, vec![0]);
    }

    #[test]
    fn nothing_to_review() {
        let cards = vec![card("1", "fr")];
        let mut states = HashMap::new();
        states.insert("1".to_string(), state_due_at(now() + Duration::hours(1)));
        let sel = select_for_review(&cards, &states, now(), 10);
        assert!(sel.is_empty());
        assert_eq!(sel.kind, QueueKind::New);
    }

    #[test]
    fn submit_creates_then_updates() {
        let mut store = MemoryStore::new();
        let good = Rating::new(4).unwrap();

        let first = submit_review(&mut store, "ana", "c1", good, now()).unwrap();
        assert_eq!(first.repetitions, 1);
        assert_eq!(first.interval_days, 1);

        let later = first.due_at;
        let second = submit_review(&mut store, "ana", "c1", good, later).unwrap();
        assert_eq!(second.repetitions, 2);
        assert_eq!(second.interval_days, 6);
        assert_eq!(store.get("ana", "c1"), Some(second));
    }

    #[test]
    fn submit_rejects_corrupt_state_without_writing() {
        let mut store = MemoryStore::new();
        let mut bad = state_due_at(now());
        bad.interval_days = 0;
        store.put("ana", "c1", bad.clone());

        let err = submit_review(&mut store, "ana", "c1", Rating::PERFECT, now()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(store.get("ana", "c1"), Some(bad));
    }

    #[test]
    fn deck_summaries_grouping() {
        let cards = vec![
            card("1", "spanish"),
            card("2", "spanish"),
            card("3", "german"),
        ];
        let mut states = HashMap::new();
        states.insert("1".to_string(), state_due_at(now() - Duration::days(1)));
        states.insert("3".to_string(), state_due_at(now() + Duration::days(1)));

        let summaries = deck_summaries(&cards, &states, now());
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "german");
        assert_eq!(
            (summaries[0].total, summaries[0].due, summaries[0].new),
            (1, 0, 0)
        );
        let spanish = &summaries[1];
        assert_eq!((spanish.total, spanish.due, spanish.new), (2, 1, 1));
    }
}
