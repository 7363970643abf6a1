use std::path::PathBuf;

use thiserror::Error;

use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("could not write {filename}: {source}")]
    Write {
        filename: String,
        #[source]
        source: PersistError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedBook {
    pub location: PathBuf,
    pub bytes: usize,
}

/// Receives the finished book.
pub trait SaveTarget: Send + Sync {
    fn save(&self, html: &str, filename: &str) -> Result<SavedBook, SaveError>;
}

/// Saves books as files in one directory.
#[derive(Debug, Clone)]
pub struct DirectorySaveTarget {
    writer: AtomicFileWriter,
}

impl DirectorySaveTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir),
        }
    }
}

impl SaveTarget for DirectorySaveTarget {
    fn save(&self, html: &str, filename: &str) -> Result<SavedBook, SaveError> {
        let location = self
            .writer
            .write(filename, html)
            .map_err(|source| SaveError::Write {
                filename: filename.to_string(),
                source,
            })?;
        Ok(SavedBook {
            location,
            bytes: html.len(),
        })
    }
}
