//! Persistence of the harvested dataset.
//!
//! The dataset is keyed by identifier. Crawls read the set of identifiers
//! already held, append rows, or replace the whole table after a backup.
//! A watermark records the highest identifier seen for the next
//! incremental run.

mod columns;
mod csv_store;
mod sqlite;

use std::collections::HashSet;
use std::path::PathBuf;

pub use columns::{
    clean_column_order, column_order, record_to_row, row_to_record, BASE_COLUMNS, CAPTURED_AT_COLUMN,
    CAPTURED_AT_FORMAT, IDENTIFIER_COLUMN, STATUS_COLUMN,
};
pub use csv_store::{
    read_records, write_clean_records, write_increment, write_records, CsvBackups, CsvStore,
};
pub use sqlite::SqliteStore;

use crate::config::{StoreConfig, StoreKind};
use crate::identifier::Identifier;
use crate::record::Record;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },
    #[error("invalid watermark {0:?}")]
    InvalidWatermark(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A persisted dataset of records keyed by identifier.
pub trait DatasetStore {
    fn existing_identifiers(&self) -> Result<HashSet<Identifier>, StoreError>;

    /// Every persisted record, in stored order.
    fn load_all(&self) -> Result<Vec<Record>, StoreError>;

    /// Adds records whose identifier is not yet stored. Stored rows are
    /// never touched.
    fn append(&mut self, records: &[Record]) -> Result<usize, StoreError>;

    /// Backs the current dataset up, then overwrites it with `records`.
    /// Returns the backup location when there was something to back up.
    fn replace_all(&mut self, records: &[Record]) -> Result<Option<PathBuf>, StoreError>;

    /// The recorded resume watermark, falling back to the highest stored
    /// identifier when none was recorded.
    fn watermark(&self) -> Result<Option<Identifier>, StoreError>;

    fn set_watermark(&mut self, identifier: Identifier) -> Result<(), StoreError>;

    /// Where the dataset lives, for log lines.
    fn location(&self) -> String;
}

/// Opens the store the configuration names.
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn DatasetStore>, StoreError> {
    match config.kind {
        StoreKind::Csv => Ok(Box::new(CsvStore::new(
            &config.dataset,
            &config.watermark,
            &config.backup_dir,
        ))),
        StoreKind::Sqlite => Ok(Box::new(
            SqliteStore::open(&config.dataset)?.with_backup_dir(&config.backup_dir),
        )),
    }
}
