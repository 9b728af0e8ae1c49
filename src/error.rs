//! Error types shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A rating, prior review state or stored value is outside its allowed range.
    #[error("{0}")]
    InvalidInput(String),

    #[error("card not found: {0}")]
    CardNotFound(String),

    /// A CSV row was readable but its values did not validate.
    #[error("{}:{line}: {message}", path.display())]
    InvalidRecord {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn csv(path: &std::path::Path, source: csv::Error) -> Self {
        Error::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Returns `true` for errors caused by caller-supplied values.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
