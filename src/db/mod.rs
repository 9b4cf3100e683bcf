use rusqlite::{Connection, OptionalExtension};

use std::path::Path;
use std::time::Duration;

/// Open the cache database at `path` with the pragmas every connection needs.
pub fn open_connection(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path).map_err(|e| {
        tracing::error!(
            "Failed to open database at '{}': {} (cwd: {:?})",
            path.display(),
            e,
            std::env::current_dir()
        );
        e
    })?;

    // Wait out a concurrent writer instead of failing immediately
    conn.busy_timeout(Duration::from_secs(30))?;

    // WAL lets readers keep serving the previous generation during a refresh.
    // This may fail if another connection holds a transaction, which is OK
    if let Err(e) =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
    {
        tracing::warn!("Could not enable WAL mode: {}", e);
    }

    // NORMAL sync is safe with WAL mode
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    Ok(conn)
}

pub fn open_in_memory_connection() -> Result<Connection, rusqlite::Error> {
    Connection::open_in_memory()
}

pub fn create_metadata_table_if_not_exists(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cache_metadata (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;
    Ok(())
}

/// Get a metadata value
pub fn get_metadata(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM cache_metadata WHERE key = ?1",
        [key],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()
    .map(Option::flatten)
}

/// Insert or overwrite a metadata value
pub fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO cache_metadata (key, value, updated_at) VALUES (?1, ?2, strftime('%s', 'now'))
         ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = strftime('%s', 'now')",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

/// Bytes currently allocated by the database, free pages included.
pub fn database_size_bytes(conn: &Connection) -> Result<u64, rusqlite::Error> {
    let size: i64 = conn.query_row(
        "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        [],
        |row| row.get(0),
    )?;
    Ok(size.max(0) as u64)
}
