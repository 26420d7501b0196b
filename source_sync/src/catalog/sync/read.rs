use std::collections::BTreeMap;

use diesel::SqliteConnection;

use crate::sources::{SourceConfig, SourceRepo, SqliteSourceRepo};

pub struct Current {
    pub sources: BTreeMap<String, SourceConfig>,
}

pub fn read_current(conn: &mut SqliteConnection) -> anyhow::Result<Current> {
    let sources = SqliteSourceRepo::new()
        .list_all_configs(conn)?
        .into_iter()
        .map(|stored| (stored.config.name.clone(), stored.config))
        .collect();
    Ok(Current { sources })
}
