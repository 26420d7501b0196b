//! Record repository: canonical records keyed by natural key.
//!
//! Upserts split fields into two halves. `inserted_at` is written only when a natural key is
//! first seen; every other column, `updated_at` included, is replaced on each upsert. Running
//! the same sync window twice therefore keeps the original insertion time while still picking
//! up changed scores or titles.

pub mod repo;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use repo::SqliteRecordRepo;

/// Errors raised by the record and source repositories.
///
/// Repository calls return [`RepoResult`]; match on these with `err.downcast_ref::<RepoError>()`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    /// A value failed the repository's own shape checks.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Every record in a non-empty batch was invalid.
    #[error("no valid records to persist")]
    NoValidRecords,
    /// Every individual upsert in a batch failed.
    #[error("all {failed} record upserts failed")]
    AllFailed {
        /// Number of failed upserts.
        failed: usize,
    },
    /// The store rejected one record.
    #[error("failed to persist record {natural_key}: {message}")]
    Persistence {
        /// Natural key of the rejected record.
        natural_key: String,
        /// Underlying store message.
        message: String,
    },
}

/// Result type used throughout the repositories.
pub type RepoResult<T> = anyhow::Result<T>;

/// One deduplicated content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Upstream identifier used for deduplication.
    pub natural_key: String,
    /// Non-empty title.
    pub title: String,
    /// Optional body text.
    pub body: Option<String>,
    /// Optional author handle.
    pub author: Option<String>,
    /// Optional link.
    pub url: Option<String>,
    /// Optional flair/label.
    pub flair: Option<String>,
    /// Upstream score.
    pub score: i64,
    /// Owning source, always set by the pipeline.
    pub source_name: String,
    /// Creation time reported upstream.
    pub origin_created_at: DateTime<Utc>,
    /// First persistence time; preserved across upserts.
    pub inserted_at: DateTime<Utc>,
    /// Last persistence time.
    pub updated_at: DateTime<Utc>,
}

/// Counters for one [`RecordRepo::upsert_many`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Records handed to the call.
    pub submitted: usize,
    /// Records skipped by the defensive shape check.
    pub skipped: usize,
    /// Records written.
    pub stored: usize,
    /// Records the store rejected.
    pub failed: usize,
}

/// Portable surface, SQLite implementation lives in `repo.rs`.
pub trait RecordRepo {
    /// Insert or update one record by natural key.
    ///
    /// Fails with [`RepoError::Validation`] for an empty key or title and with
    /// [`RepoError::Persistence`] when the store rejects the write.
    fn upsert_one(&self, conn: &mut diesel::SqliteConnection, record: &Record) -> RepoResult<()>;

    /// Apply [`RecordRepo::upsert_one`] to each record, tolerating partial failure.
    ///
    /// Empty input is a no-op. A batch with no valid record fails with
    /// [`RepoError::NoValidRecords`]; a batch where every upsert failed fails with
    /// [`RepoError::AllFailed`]. Anything else succeeds with the counters.
    fn upsert_many(
        &self,
        conn: &mut diesel::SqliteConnection,
        records: &[Record],
    ) -> RepoResult<BatchOutcome>;

    /// Point lookup by natural key.
    fn get_by_key(
        &self,
        conn: &mut diesel::SqliteConnection,
        natural_key: &str,
    ) -> RepoResult<Option<Record>>;

    /// Records of one source, newest origin time first.
    fn list_by_source(
        &self,
        conn: &mut diesel::SqliteConnection,
        source: &str,
        limit: Option<i64>,
    ) -> RepoResult<Vec<Record>>;

    /// Number of records for one source, or for all sources when `source` is `None`.
    fn count_by_source(
        &self,
        conn: &mut diesel::SqliteConnection,
        source: Option<&str>,
    ) -> RepoResult<i64>;

    /// Records of one source created *or* updated at or after `cutoff`.
    fn list_recent_since(
        &self,
        conn: &mut diesel::SqliteConnection,
        source: &str,
        cutoff: DateTime<Utc>,
    ) -> RepoResult<Vec<Record>>;
}
