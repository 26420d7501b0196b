//! Append-only log of sync cycle outcomes.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::{
    models::{NewSyncRun, SyncRunRow},
    orchestrator::SyncResult,
    records::RepoResult,
    schema::sync_runs,
    tz,
};

use crate::schema::sync_runs::dsl as sr;

/// One persisted [`SyncResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunEntry {
    /// Row id, increasing with insertion.
    pub id: i32,
    /// Source the run was for.
    pub source_name: String,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: DateTime<Utc>,
    /// Terminal state.
    pub success: bool,
    /// Raw items fetched.
    pub items_fetched: u32,
    /// Items that passed validation.
    pub items_processed: u32,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Error text of a failed run.
    pub error: Option<String>,
}

fn row_to_entry(row: SyncRunRow) -> RepoResult<RunEntry> {
    Ok(RunEntry {
        id: row.id,
        started_at: tz::parse_ts_to_utc(&row.started_at)?,
        finished_at: tz::parse_ts_to_utc(&row.finished_at)?,
        source_name: row.source_name,
        success: row.success,
        items_fetched: u32::try_from(row.items_fetched).unwrap_or(0),
        items_processed: u32::try_from(row.items_processed).unwrap_or(0),
        duration_ms: u64::try_from(row.duration_ms).unwrap_or(0),
        error: row.error,
    })
}

/// Run log stored in [`crate::schema::sync_runs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLog;

impl RunLog {
    /// Append one result. Returns the new row id.
    pub fn record(conn: &mut SqliteConnection, result: &SyncResult) -> RepoResult<i32> {
        let started = tz::to_rfc3339_millis(result.started_at);
        let finished = tz::to_rfc3339_millis(result.finished_at);
        let row = NewSyncRun {
            source_name: &result.source_name,
            started_at: &started,
            finished_at: &finished,
            success: result.success,
            items_fetched: i32::try_from(result.items_fetched).unwrap_or(i32::MAX),
            items_processed: i32::try_from(result.items_processed).unwrap_or(i32::MAX),
            duration_ms: i64::try_from(result.duration_ms).unwrap_or(i64::MAX),
            error: result.error.as_deref(),
        };

        let id = diesel::insert_into(sync_runs::table)
            .values(&row)
            .returning(sr::id)
            .get_result::<i32>(conn)?;
        Ok(id)
    }

    /// Newest entries first, optionally for one source only.
    pub fn recent(
        conn: &mut SqliteConnection,
        source: Option<&str>,
        limit: i64,
    ) -> RepoResult<Vec<RunEntry>> {
        let mut query = sr::sync_runs
            .order((sr::started_at.desc(), sr::id.desc()))
            .select(SyncRunRow::as_select())
            .limit(limit.max(1))
            .into_boxed();
        if let Some(s) = source {
            query = query.filter(sr::source_name.eq(s.to_string()));
        }
        query
            .load::<SyncRunRow>(conn)?
            .into_iter()
            .map(row_to_entry)
            .collect()
    }

    /// Most recent successful run of `source`.
    pub fn last_success(conn: &mut SqliteConnection, source: &str) -> RepoResult<Option<RunEntry>> {
        sr::sync_runs
            .filter(sr::source_name.eq(source))
            .filter(sr::success.eq(true))
            .order((sr::started_at.desc(), sr::id.desc()))
            .select(SyncRunRow::as_select())
            .first::<SyncRunRow>(conn)
            .optional()?
            .map(row_to_entry)
            .transpose()
    }
}
