//! SQLite record sink
//!
//! Records land in a single `records` table keyed by notice id. Writing a
//! record whose id already exists replaces the stored row.

use crate::output::traits::{OutputResult, RecordSink};
use crate::scrape::DetailRecord;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQL schema for the records database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    title TEXT,
    detail_url TEXT,
    listing_fields TEXT NOT NULL,
    detail_fields TEXT NOT NULL,
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_fetched_at ON records(fetched_at);
"#;

/// Writes records into a SQLite database
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Opens or creates the database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Database opened and schema ensured
    /// * `Err(OutputError)` - Failed to open database
    pub fn open(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> OutputResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Number of stored records
    pub fn count(&self) -> OutputResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Detail fields of the record with `id`, as stored JSON
    pub fn detail_fields_json(&self, id: &str) -> OutputResult<Option<String>> {
        let fields = self
            .conn
            .query_row(
                "SELECT detail_fields FROM records WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(fields)
    }
}

impl RecordSink for SqliteSink {
    fn write(&mut self, record: &DetailRecord) -> OutputResult<()> {
        let listing_fields = serde_json::to_string(&record.listing.fields)?;
        let detail_fields = serde_json::to_string(&record.fields)?;

        self.conn.execute(
            "INSERT INTO records (id, title, detail_url, listing_fields, detail_fields, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                detail_url = excluded.detail_url,
                listing_fields = excluded.listing_fields,
                detail_fields = excluded.detail_fields,
                fetched_at = excluded.fetched_at",
            params![
                record.id,
                record.listing.title,
                record.listing.detail_url,
                listing_fields,
                detail_fields,
                record.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        // Each write is its own transaction
        Ok(())
    }
}
