use std::collections::BTreeMap;

use crate::{catalog::config::SourceCatalog, sources::SourceConfig};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wanted {
    pub sources: BTreeMap<String, SourceConfig>,
}

pub fn wanted_from_catalog(cat: &SourceCatalog) -> Wanted {
    Wanted {
        sources: cat
            .to_configs()
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect(),
    }
}
