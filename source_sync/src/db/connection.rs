//! SQLite connection helpers.
//!
//! Provides [`connect_sqlite`] that opens a connection and applies the PRAGMAs every
//! unit of work relies on: a 5000ms busy_timeout, WAL journaling, and foreign_keys=ON.
//!
//! Example:
//! ```no_run
//! use source_sync::db::connection::connect_sqlite;
//!
//! let path = std::env::temp_dir().join("source_sync_example.db");
//! let _conn = connect_sqlite(path.to_str().unwrap()).expect("open sqlite");
//! ```

use anyhow::{Context, bail};
use diesel::{Connection, SqliteConnection, connection::SimpleConnection};

/// Turn a configured database url into something `SqliteConnection::establish` accepts.
///
/// - bare paths and `:memory:` pass through
/// - `sqlite://path` and `sqlite:path` lose their prefix (`sqlite:///abs` keeps the leading `/`)
/// - `file:` URIs pass through untouched
/// - any other `scheme://` is rejected
pub fn resolve_sqlite_url(database_url: &str) -> anyhow::Result<String> {
    let url = database_url.trim();
    if url.is_empty() {
        bail!("database url is empty");
    }

    let resolved = if let Some(rest) = url.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = url.strip_prefix("sqlite:") {
        rest
    } else if url.starts_with("file:") {
        url
    } else if url.contains("://") {
        bail!("Unsupported DATABASE_URL: {url}");
    } else {
        url
    };

    if resolved.is_empty() {
        bail!("database url has no path: {url}");
    }
    Ok(resolved.to_string())
}

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    let url = resolve_sqlite_url(database_url)?;
    let mut conn =
        SqliteConnection::establish(&url).with_context(|| format!("open sqlite at {url}"))?;

    // busy_timeout first so switching to WAL waits instead of failing under contention
    conn.batch_execute(
        "PRAGMA busy_timeout=5000;
         PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(conn)
}
