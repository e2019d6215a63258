//! CSV dataset files with a watermark side file.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

use crate::identifier::Identifier;
use crate::record::Record;
use crate::walker::CheckpointSink;

use super::columns::{
    clean_column_order, column_order, record_to_row, row_to_record, IDENTIFIER_COLUMN,
};
use super::{DatasetStore, StoreError};

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads every record of a dataset CSV. A missing file is an empty dataset.
pub fn read_records(path: &Path) -> Result<Vec<Record>, StoreError> {
    read_rows(path)?
        .iter()
        .enumerate()
        .map(|(i, row)| row_to_record(row, i + 2))
        .collect()
}

/// Writes `records` to `path` with a BOM, creating parent directories.
pub fn write_records(path: &Path, records: &[Record]) -> Result<(), StoreError> {
    let rows: Vec<BTreeMap<String, String>> = records.iter().map(record_to_row).collect();
    let header = column_order(&rows);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let mut file = fs::File::create(path).map_err(|e| StoreError::io(path, e))?;
    file.write_all(BOM).map_err(|e| StoreError::io(path, e))?;

    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(&header)?;
    for row in &rows {
        wtr.write_record(
            header
                .iter()
                .map(|column| row.get(column).map(String::as_str).unwrap_or("")),
        )?;
    }
    wtr.flush().map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Writes cleaned records to `path` without a BOM or capture times.
pub fn write_clean_records(path: &Path, records: &[Record]) -> Result<(), StoreError> {
    let rows: Vec<BTreeMap<String, String>> = records.iter().map(record_to_row).collect();
    let header = clean_column_order(&rows);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&header)?;
    for row in &rows {
        wtr.write_record(
            header
                .iter()
                .map(|column| row.get(column).map(String::as_str).unwrap_or("")),
        )?;
    }
    wtr.flush().map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Writes a session's records to `increment_YYYYMMDD_HHMMSS.csv` in `dir`.
pub fn write_increment(dir: &Path, records: &[Record], at: NaiveDateTime) -> Result<PathBuf, StoreError> {
    let path = dir.join(format!("increment_{}.csv", at.format("%Y%m%d_%H%M%S")));
    write_records(&path, records)?;
    Ok(path)
}

fn read_rows(path: &Path) -> Result<Vec<BTreeMap<String, String>>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    let body = bytes.strip_prefix(BOM).unwrap_or(&bytes);

    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(body);
    let header: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row: BTreeMap<String, String> = header
            .iter()
            .zip(record.iter())
            .filter(|(_, value)| !value.is_empty())
            .map(|(column, value)| (column.clone(), value.to_string()))
            .collect();
        if row.get(IDENTIFIER_COLUMN).map_or(true, |id| id.trim().is_empty()) {
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Dataset held in one CSV file.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
    watermark_path: PathBuf,
    backup_dir: PathBuf,
}

impl CsvStore {
    pub fn new(
        path: impl Into<PathBuf>,
        watermark_path: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            path: path.into(),
            watermark_path: watermark_path.into(),
            backup_dir: backup_dir.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        self.backup_dir
            .join(format!("{}_backup_{}.csv", stem, Local::now().timestamp()))
    }
}

impl DatasetStore for CsvStore {
    fn existing_identifiers(&self) -> Result<HashSet<Identifier>, StoreError> {
        Ok(self.load_all()?.into_iter().map(|r| r.identifier).collect())
    }

    fn load_all(&self) -> Result<Vec<Record>, StoreError> {
        read_records(&self.path)
    }

    fn append(&mut self, records: &[Record]) -> Result<usize, StoreError> {
        let mut all = self.load_all()?;
        let mut known: HashSet<Identifier> = all.iter().map(|r| r.identifier).collect();
        let before = all.len();
        all.extend(
            records
                .iter()
                .filter(|r| known.insert(r.identifier))
                .cloned(),
        );
        let added = all.len() - before;
        if added > 0 {
            write_records(&self.path, &all)?;
        }
        Ok(added)
    }

    fn replace_all(&mut self, records: &[Record]) -> Result<Option<PathBuf>, StoreError> {
        let backup = if self.path.exists() {
            let backup = self.backup_path();
            fs::create_dir_all(&self.backup_dir).map_err(|e| StoreError::io(&self.backup_dir, e))?;
            fs::copy(&self.path, &backup).map_err(|e| StoreError::io(&backup, e))?;
            tracing::info!("Backed up {} to {}", self.path.display(), backup.display());
            Some(backup)
        } else {
            None
        };
        write_records(&self.path, records)?;
        Ok(backup)
    }

    fn watermark(&self) -> Result<Option<Identifier>, StoreError> {
        if self.watermark_path.exists() {
            let raw = fs::read_to_string(&self.watermark_path)
                .map_err(|e| StoreError::io(&self.watermark_path, e))?;
            if !raw.trim().is_empty() {
                return raw
                    .parse()
                    .map(Some)
                    .map_err(|_| StoreError::InvalidWatermark(raw.trim().to_string()));
            }
        }
        Ok(self.existing_identifiers()?.into_iter().max())
    }

    fn set_watermark(&mut self, identifier: Identifier) -> Result<(), StoreError> {
        if let Some(parent) = self
            .watermark_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        fs::write(&self.watermark_path, identifier.to_string())
            .map_err(|e| StoreError::io(&self.watermark_path, e))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Writes checkpoints to `backup_<count>.csv` in a directory.
#[derive(Debug, Clone)]
pub struct CsvBackups {
    dir: PathBuf,
}

impl CsvBackups {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl CheckpointSink for CsvBackups {
    fn checkpoint(&self, records: &[Record], success_count: usize) -> Result<(), StoreError> {
        let path = self.dir.join(format!("backup_{}.csv", success_count));
        write_records(&path, records)?;
        tracing::debug!("Checkpoint written to {}", path.display());
        Ok(())
    }
}
