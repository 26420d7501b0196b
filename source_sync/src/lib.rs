//! Incremental source synchronization.
//!
//! Pulls raw items for named sources from an upstream ingestion API, validates and normalizes
//! them, upserts them into SQLite keyed by their natural id and tracks a per-source watermark
//! so the next run only asks for what changed.
//!
//! - [`orchestrator`]: one sync cycle per source, and all active sources concurrently
//! - [`records`], [`sources`]: persistence seams and their SQLite implementations
//! - [`validate`]: raw item to [`records::Record`] normalization
//! - [`catalog`]: declarative source configs from TOML, diffed into the store
//! - [`scheduler`]: timer tasks driving the orchestrator
//! - [`runs`]: append-only log of run outcomes

#![warn(missing_docs)]

pub mod catalog;
pub mod config;
pub mod db;
pub mod models;
pub mod orchestrator;
pub mod records;
pub mod runs;
pub mod scheduler;
pub mod schema;
pub mod sources;
pub mod tz;
pub mod validate;
