use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::{debug, warn};

use crate::{
    models::{NewRecord, RecordChangeset, RecordRow},
    records::{BatchOutcome, Record, RecordRepo, RepoError, RepoResult},
    schema::records,
    tz,
};

use crate::schema::records::dsl as r;

/// Repository for records in a SQLite database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteRecordRepo;

impl SqliteRecordRepo {
    /// New stateless repository.
    pub fn new() -> Self {
        Self
    }
}

fn check_shape(record: &Record) -> Result<(), RepoError> {
    if record.natural_key.trim().is_empty() {
        return Err(RepoError::Validation("natural key is empty".into()));
    }
    if record.title.trim().is_empty() {
        return Err(RepoError::Validation(format!(
            "title is empty for {}",
            record.natural_key
        )));
    }
    Ok(())
}

fn row_to_record(row: RecordRow) -> RepoResult<Record> {
    Ok(Record {
        origin_created_at: tz::parse_ts_to_utc(&row.origin_created_at)?,
        inserted_at: tz::parse_ts_to_utc(&row.inserted_at)?,
        updated_at: tz::parse_ts_to_utc(&row.updated_at)?,
        natural_key: row.natural_key,
        title: row.title,
        body: row.body,
        author: row.author,
        url: row.url,
        flair: row.flair,
        score: row.score,
        source_name: row.source_name,
    })
}

fn rows_to_records(rows: Vec<RecordRow>) -> RepoResult<Vec<Record>> {
    rows.into_iter().map(row_to_record).collect()
}

impl RecordRepo for SqliteRecordRepo {
    fn upsert_one(&self, conn: &mut SqliteConnection, record: &Record) -> RepoResult<()> {
        check_shape(record)?;

        let origin = tz::to_rfc3339_millis(record.origin_created_at);
        let inserted = tz::to_rfc3339_millis(record.inserted_at);
        let updated = tz::to_rfc3339_millis(record.updated_at);

        let new = NewRecord {
            natural_key: &record.natural_key,
            title: &record.title,
            body: record.body.as_deref(),
            author: record.author.as_deref(),
            url: record.url.as_deref(),
            flair: record.flair.as_deref(),
            score: record.score,
            source_name: &record.source_name,
            origin_created_at: &origin,
            inserted_at: &inserted,
            updated_at: &updated,
        };
        let changes = RecordChangeset {
            title: &record.title,
            body: record.body.as_deref(),
            author: record.author.as_deref(),
            url: record.url.as_deref(),
            flair: record.flair.as_deref(),
            score: record.score,
            source_name: &record.source_name,
            origin_created_at: &origin,
            updated_at: &updated,
        };

        // INSERT .. ON CONFLICT (natural_key) DO UPDATE, inserted_at only on the insert arm
        diesel::insert_into(records::table)
            .values(&new)
            .on_conflict(r::natural_key)
            .do_update()
            .set(&changes)
            .execute(conn)
            .map_err(|e| RepoError::Persistence {
                natural_key: record.natural_key.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn upsert_many(&self, conn: &mut SqliteConnection, batch: &[Record]) -> RepoResult<BatchOutcome> {
        let mut outcome = BatchOutcome {
            submitted: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return Ok(outcome);
        }

        let valid: Vec<&Record> = batch.iter().filter(|rec| check_shape(rec).is_ok()).collect();
        outcome.skipped = batch.len() - valid.len();
        if valid.is_empty() {
            return Err(RepoError::NoValidRecords.into());
        }

        // One write transaction for the batch. A rejected statement only rolls back itself,
        // so the remaining upserts still commit.
        conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
            for rec in &valid {
                match self.upsert_one(conn, rec) {
                    Ok(()) => outcome.stored += 1,
                    Err(err) => {
                        outcome.failed += 1;
                        warn!(natural_key = %rec.natural_key, error = %err, "record upsert failed");
                    }
                }
            }
            Ok(())
        })?;

        if outcome.stored == 0 {
            return Err(RepoError::AllFailed {
                failed: outcome.failed,
            }
            .into());
        }

        debug!(
            stored = outcome.stored,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "record batch persisted"
        );
        Ok(outcome)
    }

    fn get_by_key(&self, conn: &mut SqliteConnection, key: &str) -> RepoResult<Option<Record>> {
        r::records
            .filter(r::natural_key.eq(key))
            .select(RecordRow::as_select())
            .first::<RecordRow>(conn)
            .optional()?
            .map(row_to_record)
            .transpose()
    }

    fn list_by_source(
        &self,
        conn: &mut SqliteConnection,
        source: &str,
        limit: Option<i64>,
    ) -> RepoResult<Vec<Record>> {
        let mut query = r::records
            .filter(r::source_name.eq(source))
            .order((r::origin_created_at.desc(), r::natural_key.asc()))
            .select(RecordRow::as_select())
            .into_boxed();
        if let Some(n) = limit.filter(|n| *n > 0) {
            query = query.limit(n);
        }
        rows_to_records(query.load::<RecordRow>(conn)?)
    }

    fn count_by_source(&self, conn: &mut SqliteConnection, source: Option<&str>) -> RepoResult<i64> {
        let n: i64 = match source {
            Some(s) => r::records
                .filter(r::source_name.eq(s))
                .count()
                .get_result(conn)?,
            None => r::records.count().get_result(conn)?,
        };
        Ok(n)
    }

    fn list_recent_since(
        &self,
        conn: &mut SqliteConnection,
        source: &str,
        cutoff: DateTime<Utc>,
    ) -> RepoResult<Vec<Record>> {
        let cutoff_s = tz::to_rfc3339_millis(cutoff);
        let rows = r::records
            .filter(r::source_name.eq(source))
            .filter(
                r::origin_created_at
                    .ge(&cutoff_s)
                    .or(r::updated_at.ge(&cutoff_s)),
            )
            .order((r::origin_created_at.desc(), r::natural_key.asc()))
            .select(RecordRow::as_select())
            .load::<RecordRow>(conn)?;
        rows_to_records(rows)
    }
}
