//! Database utilities for connections and schema migrations.
//!
//! This module provides:
//! - SQLite connection helpers: [`connection::connect_sqlite`] applies WAL, foreign_keys=ON, and a
//!   5000ms busy_timeout.
//! - Embedded Diesel migrations and runners: [`migrate::run_sqlite`] and [`migrate::run_all`], which
//!   accepts bare file paths as well as `sqlite:`, `sqlite://` and `file:` urls.
//! - [`Database`]: a cloneable handle that runs blocking Diesel work on tokio's blocking pool.
//!
//! Example:
//! ```no_run
//! use source_sync::db::{migrate, connection};
//!
//! let db_path = std::env::temp_dir().join("source_sync_example.db");
//! migrate::run_all(db_path.to_str().unwrap()).expect("migrations");
//!
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```

pub mod connection;
mod handle;
pub mod migrate;

pub use handle::Database;
