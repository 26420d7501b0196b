use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use crate::{
    catalog::sync::{read::Current, want::Wanted},
    sources::SourceConfig,
};

/// What needs to change to make DB == catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDiff {
    /// Sources in the catalog but not in the DB.
    pub creates: BTreeMap<String, SourceConfig>,
    /// Sources in both whose fields differ; values are the desired configs.
    pub updates: BTreeMap<String, SourceConfig>,
    /// Sources in both with identical fields.
    pub unchanged: BTreeSet<String>,
    /// Sources only in the DB (filled only when pruning).
    pub deletes: BTreeSet<String>,
}

impl CatalogDiff {
    /// True if there is nothing to create, update or delete.
    pub fn is_noop(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

fn describe(cfg: &SourceConfig) -> String {
    let mut s = format!("priority={} max_items={}", cfg.priority, cfg.max_items);
    if !cfg.schedule.is_empty() {
        s.push_str(&format!(" schedule=\"{}\"", cfg.schedule));
    }
    if !cfg.enabled {
        s.push_str(" (disabled)");
    }
    s
}

impl fmt::Display for CatalogDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote_any = false;
        let mut section = |title: &str,
                           body: &mut dyn FnMut(&mut fmt::Formatter<'_>) -> fmt::Result|
         -> fmt::Result {
            if wrote_any {
                writeln!(f)?;
            }
            writeln!(f, "{title}")?;
            writeln!(f, "{}", "-".repeat(title.len()))?;
            body(f)?;
            wrote_any = true;
            Ok(())
        };

        if !self.creates.is_empty() {
            section("Sources (CREATE)", &mut |f| {
                for (name, cfg) in &self.creates {
                    writeln!(f, "+ {name}  {}", describe(cfg))?;
                }
                Ok(())
            })?;
        }
        if !self.updates.is_empty() {
            section("Sources (UPDATE)", &mut |f| {
                for (name, cfg) in &self.updates {
                    writeln!(f, "~ {name}  {}", describe(cfg))?;
                }
                Ok(())
            })?;
        }
        if !self.deletes.is_empty() {
            section("Sources (DELETE)", &mut |f| {
                for name in &self.deletes {
                    writeln!(f, "- {name}")?;
                }
                Ok(())
            })?;
        }

        if !wrote_any {
            write!(f, "No changes")
        } else {
            Ok(())
        }
    }
}

pub fn make_diff(w: &Wanted, c: &Current, prune: bool) -> CatalogDiff {
    let mut d = CatalogDiff::default();

    for (name, want) in &w.sources {
        match c.sources.get(name) {
            None => {
                d.creates.insert(name.clone(), want.clone());
            }
            Some(have) if have == want => {
                d.unchanged.insert(name.clone());
            }
            Some(_) => {
                d.updates.insert(name.clone(), want.clone());
            }
        }
    }

    if prune {
        for name in c.sources.keys() {
            if !w.sources.contains_key(name) {
                d.deletes.insert(name.clone());
            }
        }
    }

    d
}
