use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};

const HEADER: [&str; 5] = ["deck", "front", "back", "media", "id"];

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Card {
    pub deck: String,
    pub front: String,
    pub back: String,
    pub media: String,
    pub id: String,
}

pub fn expand_newlines(s: &str) -> String {
    s.replace("\\n", "\n")
}

fn get_field(record: &csv::StringRecord, index: usize) -> String {
    record.get(index).unwrap_or("").to_string()
}

/// Reads one deck file. The flag is `true` when any card lacked an id and got a fresh one.
pub fn load_csv(path: &Path) -> Result<(Vec<Card>, bool)> {
    let default_deck = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("default")
        .to_string();

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::csv(path, e))?;

    let mut cards = Vec::new();
    let mut assigned = false;
    for result in reader.records() {
        let record = result.map_err(|e| Error::csv(path, e))?;

        let deck_raw = get_field(&record, 0);
        let deck = if deck_raw.trim().is_empty() {
            default_deck.clone()
        } else {
            deck_raw
        };

        let id_raw = get_field(&record, 4);
        let id = if id_raw.trim().is_empty() {
            assigned = true;
            uuid::Uuid::new_v4().to_string()
        } else {
            id_raw
        };

        cards.push(Card {
            deck,
            front: get_field(&record, 1),
            back: get_field(&record, 2),
            media: get_field(&record, 3),
            id,
        });
    }
    Ok((cards, assigned))
}

pub fn save_csv(path: &Path, cards: &[Card]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| Error::csv(path, e))?;

    writer.write_record(HEADER).map_err(|e| Error::csv(path, e))?;
    for card in cards {
        writer
            .write_record([&card.deck, &card.front, &card.back, &card.media, &card.id])
            .map_err(|e| Error::csv(path, e))?;
    }

    writer.flush()?;
    Ok(())
}

/// Expands files and directories into the `.csv` files they contain, sorted.
pub fn discover_files(paths: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for p in paths {
        let path = PathBuf::from(p);
        if path.is_dir() {
            collect_csv_recursive(&path, &mut files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
    files.sort();
    files.dedup();
    files
}

fn collect_csv_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        warn!("cannot read directory {}", dir.display());
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_csv_recursive(&path, files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
}

/// Every card from a set of deck files, in file then row order.
#[derive(Debug, Default)]
pub struct CardSet {
    pub cards: Vec<Card>,
}

impl CardSet {
    /// Loads all deck files under `paths`. Unreadable files are skipped with a warning;
    /// files where ids were generated are rewritten so the ids stay stable.
    pub fn load(paths: &[String]) -> Result<CardSet> {
        let files = discover_files(paths);
        let mut set = CardSet::default();

        for file in &files {
            match load_csv(file) {
                Ok((cards, assigned)) => {
                    if assigned {
                        info!("assigning card ids in {}", file.display());
                        save_csv(file, &cards)?;
                    }
                    set.cards.extend(cards);
                }
                Err(e) => warn!("skipping deck file: {e}"),
            }
        }

        info!(
            "loaded {} cards from {} files",
            set.cards.len(),
            files.len()
        );
        Ok(set)
    }

    pub fn find(&self, id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
