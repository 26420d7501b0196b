//! Diesel models mapping to the database schema.
//!
//! These types mirror the tables defined in the embedded migrations and in
//! [`crate::schema`] for use with Diesel’s Queryable/Insertable APIs:
//! - [`crate::schema::source_configs`] — per-source configuration
//! - [`crate::schema::source_watermarks`] — per-source sync progress
//! - [`crate::schema::records`] — canonical records keyed by natural key
//! - [`crate::schema::sync_runs`] — append-only run log
//!
//! All timestamps are RFC3339 UTC strings (see [`crate::tz`]). Domain types with parsed
//! timestamps live next to their repositories; these rows are the storage shape only.

use diesel::prelude::*;

use crate::schema::*;

/// A row in [`crate::schema::source_configs`].
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = source_configs, check_for_backend(diesel::sqlite::Sqlite))]
pub struct SourceConfigRow {
    /// Unique source name (primary key).
    pub name: String,
    /// Disabled sources are never scheduled.
    pub enabled: bool,
    /// Cron-like schedule; empty means the process default.
    pub schedule: String,
    /// Per-fetch item cap; 0 means the process default.
    pub max_items: i32,
    /// Listing priority, higher first.
    pub priority: i32,
    /// Optional free text.
    pub description: Option<String>,
    /// Set on first insert.
    pub created_at: String,
    /// Refreshed on every upsert.
    pub updated_at: String,
}

/// Insertable form of [`SourceConfigRow`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = source_configs)]
pub struct NewSourceConfig<'a> {
    pub name: &'a str,
    pub enabled: bool,
    pub schedule: &'a str,
    pub max_items: i32,
    pub priority: i32,
    pub description: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Fields replaced when an existing config is upserted again. `created_at` is absent on purpose.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = source_configs, treat_none_as_null = true)]
pub struct SourceConfigChangeset<'a> {
    pub enabled: bool,
    pub schedule: &'a str,
    pub max_items: i32,
    pub priority: i32,
    pub description: Option<&'a str>,
    pub updated_at: &'a str,
}

/// A row in [`crate::schema::source_watermarks`].
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = source_watermarks, check_for_backend(diesel::sqlite::Sqlite))]
pub struct WatermarkRow {
    pub name: String,
    pub last_synced_at: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Insertable form of [`WatermarkRow`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = source_watermarks)]
pub struct NewWatermark<'a> {
    pub name: &'a str,
    pub last_synced_at: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// A row in [`crate::schema::records`].
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = records, check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecordRow {
    /// Storage rowid, never exposed outside the repository.
    pub id: i32,
    pub natural_key: String,
    pub title: String,
    pub body: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    pub flair: Option<String>,
    pub score: i64,
    pub source_name: String,
    pub origin_created_at: String,
    pub inserted_at: String,
    pub updated_at: String,
}

/// Insertable form of [`RecordRow`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = records)]
pub struct NewRecord<'a> {
    pub natural_key: &'a str,
    pub title: &'a str,
    pub body: Option<&'a str>,
    pub author: Option<&'a str>,
    pub url: Option<&'a str>,
    pub flair: Option<&'a str>,
    pub score: i64,
    pub source_name: &'a str,
    pub origin_created_at: &'a str,
    pub inserted_at: &'a str,
    pub updated_at: &'a str,
}

/// Set-always half of a record upsert. `inserted_at` and `natural_key` are never touched.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = records, treat_none_as_null = true)]
pub struct RecordChangeset<'a> {
    pub title: &'a str,
    pub body: Option<&'a str>,
    pub author: Option<&'a str>,
    pub url: Option<&'a str>,
    pub flair: Option<&'a str>,
    pub score: i64,
    pub source_name: &'a str,
    pub origin_created_at: &'a str,
    pub updated_at: &'a str,
}

/// A row in [`crate::schema::sync_runs`].
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = sync_runs, check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncRunRow {
    pub id: i32,
    pub source_name: String,
    pub started_at: String,
    pub finished_at: String,
    pub success: bool,
    pub items_fetched: i32,
    pub items_processed: i32,
    pub duration_ms: i64,
    pub error: Option<String>,
}

/// Insertable form of [`SyncRunRow`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sync_runs)]
pub struct NewSyncRun<'a> {
    pub source_name: &'a str,
    pub started_at: &'a str,
    pub finished_at: &'a str,
    pub success: bool,
    pub items_fetched: i32,
    pub items_processed: i32,
    pub duration_ms: i64,
    pub error: Option<&'a str>,
}
