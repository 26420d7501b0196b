//! Catalog synchronization into the source repository.
//!
//! ## What this does
//! - Normalizes a [`SourceCatalog`] (lowercase names, trim, schedule check).
//! - Computes a **diff** between the catalog (desired) and the DB (current).
//! - Applies the diff with UPSERTs (idempotent) and optional **prune** deletes.
//!
//! ## Transactions & consistency
//! Reading the current state and applying the diff run inside a single **`BEGIN IMMEDIATE`**
//! transaction via `SqliteConnection::immediate_transaction`, so the whole diff applies or none
//! of it does.
//!
//! ## Dry-run
//! When `SyncOptions::dry_run` is `true`, the [`CatalogDiff`] is returned and nothing is written.
//!
//! ## Prune
//! Deleting a config never touches its watermark or its records.

mod apply;
mod diff;
mod read;
mod want;

use diesel::SqliteConnection;
use tracing::info;

pub use diff::CatalogDiff;

use crate::catalog::config::{SourceCatalog, normalize_catalog};

/// Options for catalog synchronization.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// If true, compute the diff only.
    pub dry_run: bool,
    /// If true, delete configs from the DB that are not present in the catalog.
    pub prune: bool,
}

/// Sync the source catalog into SQLite and return what changed (or would change).
pub fn sync_catalog(
    conn: &mut SqliteConnection,
    mut cat: SourceCatalog,
    opt: SyncOptions,
) -> anyhow::Result<CatalogDiff> {
    normalize_catalog(&mut cat)?;
    let wanted = want::wanted_from_catalog(&cat);

    let diff = conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
        let current = read::read_current(conn)?;
        let diff = diff::make_diff(&wanted, &current, opt.prune);
        if !opt.dry_run {
            apply::apply_diff(conn, &diff)?;
        }
        Ok(diff)
    })?;

    info!(
        dry_run = opt.dry_run,
        prune = opt.prune,
        creates = diff.creates.len(),
        updates = diff.updates.len(),
        unchanged = diff.unchanged.len(),
        deletes = diff.deletes.len(),
        "catalog sync"
    );
    Ok(diff)
}
