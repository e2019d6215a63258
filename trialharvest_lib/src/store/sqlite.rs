//! SQLite dataset store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::identifier::Identifier;
use crate::record::Record;

use super::columns::CAPTURED_AT_FORMAT;
use super::{DatasetStore, StoreError};

const SCHEMA_VERSION: i32 = 1;
const WATERMARK_KEY: &str = "watermark";

pub struct SqliteStore {
    conn: Connection,
    location: String,
    backup_dir: Option<PathBuf>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        let store = Self {
            conn,
            location: path.display().to_string(),
            backup_dir: None,
        };
        store.init()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            location: ":memory:".to_string(),
            backup_dir: None,
        };
        store.init()?;
        Ok(store)
    }

    /// Directory `replace_all` snapshots the database into first.
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    fn init(&self) -> Result<(), StoreError> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        let schema = include_str!("../../../schema/sqlite.sql");
        self.conn.execute_batch(schema)?;

        if version < SCHEMA_VERSION {
            self.conn
                .pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row(
                "SELECT value FROM ingest_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO ingest_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn record_count(&self) -> Result<i64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(1) FROM records", [], |row| row.get(0))?;
        Ok(count)
    }

    fn insert_all(&mut self, records: &[Record], replace: bool) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            if replace {
                tx.execute("DELETE FROM records", [])?;
            }
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO records
                 (identifier, year, title, status, captured_at, fields_json, institutions_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in records {
                inserted += stmt.execute(params![
                    record.identifier.get() as i64,
                    record.year(),
                    record.title,
                    record.status,
                    record.captured_at.format(CAPTURED_AT_FORMAT).to_string(),
                    serde_json::to_string(&record.fields)?,
                    serde_json::to_string(&record.institutions)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn snapshot_to(&self, dir: &Path) -> Result<PathBuf, StoreError> {
        std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        let path = dir.join(format!("records_backup_{}.sqlite", Local::now().timestamp()));
        self.conn
            .execute("VACUUM INTO ?1", params![path.to_string_lossy().into_owned()])?;
        Ok(path)
    }
}

impl DatasetStore for SqliteStore {
    fn existing_identifiers(&self) -> Result<HashSet<Identifier>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT identifier FROM records")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .map(|id| id.map(|id| Identifier::new(id as u64)))
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn load_all(&self) -> Result<Vec<Record>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT identifier, title, status, captured_at, fields_json, institutions_json
             FROM records ORDER BY identifier",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .enumerate()
            .map(|(i, (id, title, status, captured_at, fields, institutions))| -> Result<Record, StoreError> {
                let captured_at = NaiveDateTime::parse_from_str(&captured_at, CAPTURED_AT_FORMAT)
                    .map_err(|e| StoreError::InvalidRow {
                        row: i + 1,
                        reason: format!("captured_at {:?}: {}", captured_at, e),
                    })?;
                Ok(Record {
                    identifier: Identifier::new(id as u64),
                    title,
                    status,
                    captured_at,
                    fields: serde_json::from_str(&fields)?,
                    institutions: serde_json::from_str(&institutions)?,
                })
            })
            .collect()
    }

    fn append(&mut self, records: &[Record]) -> Result<usize, StoreError> {
        self.insert_all(records, false)
    }

    fn replace_all(&mut self, records: &[Record]) -> Result<Option<PathBuf>, StoreError> {
        let backup = match self.backup_dir.clone() {
            Some(dir) if self.record_count()? > 0 => {
                let path = self.snapshot_to(&dir)?;
                tracing::info!("Backed up {} to {}", self.location, path.display());
                Some(path)
            }
            _ => None,
        };
        self.insert_all(records, true)?;
        Ok(backup)
    }

    fn watermark(&self) -> Result<Option<Identifier>, StoreError> {
        if let Some(raw) = self.get_meta(WATERMARK_KEY)? {
            return raw
                .parse()
                .map(Some)
                .map_err(|_| StoreError::InvalidWatermark(raw));
        }
        let max: Option<i64> = self
            .conn
            .query_row("SELECT MAX(identifier) FROM records", [], |row| row.get(0))?;
        Ok(max.map(|id| Identifier::new(id as u64)))
    }

    fn set_watermark(&mut self, identifier: Identifier) -> Result<(), StoreError> {
        self.set_meta(WATERMARK_KEY, &identifier.to_string())
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}
