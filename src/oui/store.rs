//! SQLite persistence for vendor records and cache metadata.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::{StoreError, VendorRecord};
use crate::db::{
    create_metadata_table_if_not_exists, database_size_bytes, get_metadata,
    open_connection, open_in_memory_connection, set_metadata,
};

const LAST_UPDATE_KEY: &str = "last_update";
const TOTAL_RECORDS_KEY: &str = "total_records";

const RECORD_COLUMNS: &str = "oui, oui_hex, company_name, company_address";

pub struct Store {
    conn: Mutex<Connection>,
    path: String,
}

impl Store {
    /// Open (creating if needed) the cache file and its tables.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            conn: Mutex::new(open_connection(path)?),
            path: path.display().to_string(),
        };
        store.init()?;
        tracing::info!(path = %store.path, "OUI cache database ready");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(open_in_memory_connection()?),
            path: ":memory:".to_string(),
        };
        store.init()?;
        Ok(store)
    }

    /// Create tables and indexes. Safe to run on every startup.
    pub fn init(&self) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS oui_records (
                id INTEGER PRIMARY KEY,
                oui TEXT UNIQUE NOT NULL,
                oui_hex TEXT NOT NULL,
                company_name TEXT NOT NULL,
                company_address TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_oui_records_oui ON oui_records (oui);",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_oui_records_oui_hex ON oui_records (oui_hex);",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_oui_records_company_name ON oui_records (company_name);",
            [],
        )?;
        create_metadata_table_if_not_exists(&conn)?;
        Ok(())
    }

    /// Swap the stored generation for `records` in a single transaction.
    ///
    /// Readers see either the old generation or the new one, never an empty
    /// table. When `records` repeats a prefix the first occurrence is kept.
    /// Returns the number of rows written.
    pub fn replace_all(
        &self,
        records: &[VendorRecord],
        refreshed_at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed = tx.execute("DELETE FROM oui_records", [])?;
        tracing::debug!("Removed {} records from the previous generation", removed);

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO oui_records (oui, oui_hex, company_name, company_address, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (i, record) in records.iter().enumerate() {
                inserted += stmt.execute(params![
                    record.prefix,
                    record.prefix_hex,
                    record.vendor_name,
                    record.vendor_address,
                    refreshed_at.timestamp(),
                ])?;

                if (i + 1) % 1000 == 0 {
                    tracing::debug!("Inserted {}/{} records", i + 1, records.len());
                }
            }
        }

        if inserted < records.len() {
            tracing::warn!(
                "Skipped {} records with duplicate prefixes",
                records.len() - inserted
            );
        }

        set_metadata(&tx, LAST_UPDATE_KEY, &refreshed_at.to_rfc3339())?;
        set_metadata(&tx, TOTAL_RECORDS_KEY, &records.len().to_string())?;
        tx.commit()?;

        tracing::info!("OUI cache updated with {} records", inserted);
        Ok(inserted)
    }

    /// First record matching either prefix form, compared case-insensitively.
    pub fn lookup_by_prefix(
        &self,
        prefix: &str,
        prefix_hex: &str,
    ) -> Result<Option<VendorRecord>, StoreError> {
        let conn = self.conn();
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM oui_records
                     WHERE UPPER(oui) = UPPER(?1) OR UPPER(oui_hex) = UPPER(?2)
                     ORDER BY id ASC
                     LIMIT 1",
                    RECORD_COLUMNS
                ),
                params![prefix, prefix_hex],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Case-insensitive substring search on vendor names, alphabetical.
    pub fn search_by_name(
        &self,
        substring: &str,
        limit: usize,
    ) -> Result<Vec<VendorRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM oui_records
             WHERE company_name LIKE ?1 ESCAPE '\\'
             ORDER BY company_name COLLATE NOCASE ASC, id ASC
             LIMIT ?2",
            RECORD_COLUMNS
        ))?;

        let pattern = format!("%{}%", escape_like(substring));
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![pattern, limit], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM oui_records", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// When the last successful refresh committed, if ever.
    pub fn last_update(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.conn();
        match get_metadata(&conn, LAST_UPDATE_KEY)? {
            Some(value) => DateTime::parse_from_rfc3339(&value)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(|_| StoreError::InvalidTimestamp(value)),
            None => Ok(None),
        }
    }

    /// Record count handed to the last successful refresh.
    pub fn total_records(&self) -> Result<Option<usize>, StoreError> {
        let conn = self.conn();
        Ok(get_metadata(&conn, TOTAL_RECORDS_KEY)?.and_then(|v| v.parse().ok()))
    }

    pub fn size_bytes(&self) -> Result<u64, StoreError> {
        let conn = self.conn();
        Ok(database_size_bytes(&conn)?)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(super) fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-query leaves no partial state behind the lock; SQLite rolls back
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<VendorRecord> {
    Ok(VendorRecord {
        prefix: row.get(0)?,
        prefix_hex: row.get(1)?,
        vendor_name: row.get(2)?,
        vendor_address: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
    })
}

/// Escape LIKE wildcards so user input only ever matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
