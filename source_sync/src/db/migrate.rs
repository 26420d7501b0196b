//! Embedded schema migrations.

use anyhow::anyhow;
use diesel::{Connection, SqliteConnection, connection::SimpleConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

use crate::db::connection::resolve_sqlite_url;

/// Embedded Diesel migrations bundled with this crate.
///
/// These are applied by [`run_sqlite`] to bring the database schema up to date.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Runs pending Diesel migrations on a SQLite database at the given path.
///
/// This sets the SQLite journal mode to WAL and applies all embedded migrations, returning an
/// error on failure.
pub fn run_sqlite(path: &str) -> anyhow::Result<()> {
    let mut conn = SqliteConnection::establish(path)?;
    conn.batch_execute("PRAGMA busy_timeout=5000; PRAGMA journal_mode=WAL;")?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!(e))?;

    for version in &applied {
        info!(%version, "applied migration");
    }
    Ok(())
}

/// Runs pending migrations for the given database url.
///
/// Accepts bare paths and `sqlite:` / `sqlite://` / `file:` urls, returning an error for any
/// other scheme.
pub fn run_all(database_url: &str) -> anyhow::Result<()> {
    let path = resolve_sqlite_url(database_url)?;
    run_sqlite(&path)
}
