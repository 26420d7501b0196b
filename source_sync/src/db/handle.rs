use std::sync::Arc;

use anyhow::Context;
use diesel::SqliteConnection;

use crate::db::{
    connection::{connect_sqlite, resolve_sqlite_url},
    migrate,
};

/// Cloneable handle to the SQLite store used from async code.
///
/// Every call to [`Database::with_conn`] opens a tuned connection on tokio's blocking pool,
/// so concurrent sync runs never share a connection. Writers are arbitrated by SQLite itself.
#[derive(Debug, Clone)]
pub struct Database {
    url: Arc<str>,
}

impl Database {
    /// Validates the url and builds a handle. No connection is opened yet.
    pub fn new(database_url: &str) -> anyhow::Result<Self> {
        let url = resolve_sqlite_url(database_url)?;
        Ok(Self { url: url.into() })
    }

    /// The resolved SQLite path or URI.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Applies pending migrations (blocking).
    pub fn migrate(&self) -> anyhow::Result<()> {
        migrate::run_sqlite(&self.url)
    }

    /// Opens a connection synchronously, for CLI paths and tests.
    pub fn connect(&self) -> anyhow::Result<SqliteConnection> {
        connect_sqlite(&self.url)
    }

    /// Runs `f` with a fresh connection on the blocking pool.
    pub async fn with_conn<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let url = Arc::clone(&self.url);
        tokio::task::spawn_blocking(move || {
            let mut conn = connect_sqlite(&url)?;
            f(&mut conn)
        })
        .await
        .context("database task did not complete")?
    }
}
