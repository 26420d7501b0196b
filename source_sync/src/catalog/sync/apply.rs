use diesel::SqliteConnection;

use crate::{
    catalog::sync::diff::CatalogDiff,
    sources::{SourceRepo, SqliteSourceRepo},
};

/// Apply the diff inside the current transaction.
pub fn apply_diff(conn: &mut SqliteConnection, diff: &CatalogDiff) -> anyhow::Result<()> {
    let repo = SqliteSourceRepo::new();

    for cfg in diff.creates.values().chain(diff.updates.values()) {
        repo.upsert_config(conn, cfg)?;
    }
    for name in &diff.deletes {
        repo.delete_config(conn, name)?;
    }
    Ok(())
}
