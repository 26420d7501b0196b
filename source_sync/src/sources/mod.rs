//! Source repository: per-source configuration and watermarks.
//!
//! Configs and watermarks live in separate tables with independent lifecycles. Deleting a
//! config never touches its watermark or records, and a watermark can be written for a source
//! that has no config at all.

pub mod repo;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::records::RepoResult;

pub use repo::SqliteSourceRepo;

/// One monitored source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique, stable name.
    pub name: String,
    /// Disabled sources are never scheduled.
    pub enabled: bool,
    /// Cron-like expression; empty falls back to the process default.
    pub schedule: String,
    /// Per-fetch item cap; 0 falls back to the process default.
    pub max_items: u32,
    /// Higher sorts first in listings.
    pub priority: i32,
    /// Optional free text.
    pub description: Option<String>,
}

impl SourceConfig {
    /// Enabled config with defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            schedule: String::new(),
            max_items: 0,
            priority: 0,
            description: None,
        }
    }
}

/// A [`SourceConfig`] as persisted, with its bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredSourceConfig {
    /// The configuration itself.
    #[serde(flatten)]
    pub config: SourceConfig,
    /// First insert.
    pub created_at: DateTime<Utc>,
    /// Last upsert.
    pub updated_at: DateTime<Utc>,
}

/// Sync progress for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceWatermark {
    /// Source name; not required to match a config.
    pub name: String,
    /// Start time of the last successful run.
    pub last_synced_at: DateTime<Utc>,
    /// First write.
    pub created_at: DateTime<Utc>,
    /// Last write, including writes that did not move `last_synced_at`.
    pub updated_at: DateTime<Utc>,
}

/// Portable surface, SQLite implementation lives in `repo.rs`.
pub trait SourceRepo {
    /// Insert or replace a config; `created_at` is kept on replace.
    fn upsert_config(
        &self,
        conn: &mut diesel::SqliteConnection,
        config: &SourceConfig,
    ) -> RepoResult<StoredSourceConfig>;

    /// Point lookup by name.
    fn get_config(
        &self,
        conn: &mut diesel::SqliteConnection,
        name: &str,
    ) -> RepoResult<Option<StoredSourceConfig>>;

    /// Remove a config. Returns whether a row was deleted. Does not cascade.
    fn delete_config(&self, conn: &mut diesel::SqliteConnection, name: &str) -> RepoResult<bool>;

    /// Every config, ordered by name.
    fn list_all_configs(
        &self,
        conn: &mut diesel::SqliteConnection,
    ) -> RepoResult<Vec<StoredSourceConfig>>;

    /// Enabled configs ordered by priority descending, then name ascending.
    fn list_active_configs(
        &self,
        conn: &mut diesel::SqliteConnection,
    ) -> RepoResult<Vec<StoredSourceConfig>>;

    /// Last successful sync start, or `None` if the source was never synced.
    fn get_watermark(
        &self,
        conn: &mut diesel::SqliteConnection,
        name: &str,
    ) -> RepoResult<Option<DateTime<Utc>>>;

    /// Record a successful run started at `at`.
    ///
    /// The stored value never moves backwards: if it is already later than `at` it is kept,
    /// though `updated_at` is still refreshed. Returns the value now stored.
    fn set_watermark(
        &self,
        conn: &mut diesel::SqliteConnection,
        name: &str,
        at: DateTime<Utc>,
    ) -> RepoResult<DateTime<Utc>>;

    /// Every watermark, ordered by name.
    fn list_watermarks(
        &self,
        conn: &mut diesel::SqliteConnection,
    ) -> RepoResult<Vec<SourceWatermark>>;
}
