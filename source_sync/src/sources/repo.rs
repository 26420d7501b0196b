use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::{
    models::{NewSourceConfig, NewWatermark, SourceConfigChangeset, SourceConfigRow, WatermarkRow},
    records::{RepoError, RepoResult},
    schema::{source_configs, source_watermarks},
    sources::{SourceConfig, SourceRepo, SourceWatermark, StoredSourceConfig},
    tz,
};

use crate::schema::source_configs::dsl as sc;
use crate::schema::source_watermarks::dsl as sw;

/// Repository for source configs and watermarks in a SQLite database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSourceRepo;

impl SqliteSourceRepo {
    /// New stateless repository.
    pub fn new() -> Self {
        Self
    }
}

fn row_to_config(row: SourceConfigRow) -> RepoResult<StoredSourceConfig> {
    Ok(StoredSourceConfig {
        created_at: tz::parse_ts_to_utc(&row.created_at)?,
        updated_at: tz::parse_ts_to_utc(&row.updated_at)?,
        config: SourceConfig {
            name: row.name,
            enabled: row.enabled,
            schedule: row.schedule,
            max_items: u32::try_from(row.max_items).unwrap_or(0),
            priority: row.priority,
            description: row.description,
        },
    })
}

fn rows_to_configs(rows: Vec<SourceConfigRow>) -> RepoResult<Vec<StoredSourceConfig>> {
    rows.into_iter().map(row_to_config).collect()
}

fn row_to_watermark(row: WatermarkRow) -> RepoResult<SourceWatermark> {
    Ok(SourceWatermark {
        last_synced_at: tz::parse_ts_to_utc(&row.last_synced_at)?,
        created_at: tz::parse_ts_to_utc(&row.created_at)?,
        updated_at: tz::parse_ts_to_utc(&row.updated_at)?,
        name: row.name,
    })
}

impl SourceRepo for SqliteSourceRepo {
    fn upsert_config(
        &self,
        conn: &mut SqliteConnection,
        config: &SourceConfig,
    ) -> RepoResult<StoredSourceConfig> {
        let name = config.name.trim();
        if name.is_empty() {
            return Err(RepoError::Validation("source name is empty".into()).into());
        }
        let max_items = i32::try_from(config.max_items).map_err(|_| {
            RepoError::Validation(format!("max_items {} out of range", config.max_items))
        })?;

        let now = tz::to_rfc3339_millis(Utc::now());
        let row = NewSourceConfig {
            name,
            enabled: config.enabled,
            schedule: config.schedule.trim(),
            max_items,
            priority: config.priority,
            description: config.description.as_deref(),
            created_at: &now,
            updated_at: &now,
        };
        let changes = SourceConfigChangeset {
            enabled: row.enabled,
            schedule: row.schedule,
            max_items,
            priority: row.priority,
            description: row.description,
            updated_at: &now,
        };

        // Insert .. ON CONFLICT (name) DO UPDATE .. RETURNING * (Sqlite 3.35+)
        let stored: SourceConfigRow = diesel::insert_into(source_configs::table)
            .values(&row)
            .on_conflict(sc::name)
            .do_update()
            .set(&changes)
            .returning(SourceConfigRow::as_returning())
            .get_result(conn)?;
        row_to_config(stored)
    }

    fn get_config(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
    ) -> RepoResult<Option<StoredSourceConfig>> {
        sc::source_configs
            .find(name)
            .select(SourceConfigRow::as_select())
            .first::<SourceConfigRow>(conn)
            .optional()?
            .map(row_to_config)
            .transpose()
    }

    fn delete_config(&self, conn: &mut SqliteConnection, name: &str) -> RepoResult<bool> {
        let n = diesel::delete(sc::source_configs.find(name)).execute(conn)?;
        Ok(n > 0)
    }

    fn list_all_configs(&self, conn: &mut SqliteConnection) -> RepoResult<Vec<StoredSourceConfig>> {
        let rows = sc::source_configs
            .order(sc::name.asc())
            .select(SourceConfigRow::as_select())
            .load::<SourceConfigRow>(conn)?;
        rows_to_configs(rows)
    }

    fn list_active_configs(
        &self,
        conn: &mut SqliteConnection,
    ) -> RepoResult<Vec<StoredSourceConfig>> {
        let rows = sc::source_configs
            .filter(sc::enabled.eq(true))
            .order((sc::priority.desc(), sc::name.asc()))
            .select(SourceConfigRow::as_select())
            .load::<SourceConfigRow>(conn)?;
        rows_to_configs(rows)
    }

    fn get_watermark(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
    ) -> RepoResult<Option<DateTime<Utc>>> {
        sw::source_watermarks
            .find(name)
            .select(sw::last_synced_at)
            .first::<String>(conn)
            .optional()?
            .map(|s| tz::parse_ts_to_utc(&s))
            .transpose()
    }

    fn set_watermark(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
        at: DateTime<Utc>,
    ) -> RepoResult<DateTime<Utc>> {
        if name.trim().is_empty() {
            return Err(RepoError::Validation("source name is empty".into()).into());
        }
        let at = tz::truncate_millis(at);

        // Read-max-write under BEGIN IMMEDIATE so two finishing runs cannot interleave.
        conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
            let stored = self.get_watermark(conn, name)?;
            let effective = match stored {
                Some(prev) if prev > at => prev,
                _ => at,
            };

            let now = tz::to_rfc3339_millis(Utc::now());
            let effective_s = tz::to_rfc3339_millis(effective);
            diesel::insert_into(source_watermarks::table)
                .values(NewWatermark {
                    name,
                    last_synced_at: &effective_s,
                    created_at: &now,
                    updated_at: &now,
                })
                .on_conflict(sw::name)
                .do_update()
                .set((
                    sw::last_synced_at.eq(&effective_s),
                    sw::updated_at.eq(&now),
                ))
                .execute(conn)?;
            Ok(effective)
        })
    }

    fn list_watermarks(&self, conn: &mut SqliteConnection) -> RepoResult<Vec<SourceWatermark>> {
        sw::source_watermarks
            .order(sw::name.asc())
            .select(WatermarkRow::as_select())
            .load::<WatermarkRow>(conn)?
            .into_iter()
            .map(row_to_watermark)
            .collect()
    }
}
