//! Catalog configuration: parsing, normalization, and loading.
//!
//! A catalog is a TOML document with one `[sources.<name>]` table per source:
//!
//! ```toml
//! [sources.golang]
//! priority = 5
//! max_items = 50
//! schedule = "*/30 * * * *"
//! description = "Go community"
//!
//! [sources.rust]
//! enabled = false
//! ```
//!
//! Key behaviors:
//! - Names are trimmed and lowercased; empty names and names that collide after
//!   normalization are errors.
//! - `schedule` is trimmed and, when non-empty, must parse as a schedule expression.
//! - `description` is trimmed; an empty description becomes absent.
//!
//! Entrypoints:
//! - Parse + normalize from a TOML string: [`load_catalog_str`]
//! - Parse + normalize from a file path: [`load_catalog_path`]
//! - Normalization alone: [`normalize_catalog`]

use anyhow::{Context, bail};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use toml::from_str;

use crate::{scheduler::ScheduleSpec, sources::SourceConfig};

/// Top-level catalog mapping source names to their configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SourceCatalog {
    /// Map of source name -> configuration.
    ///
    /// The name is normalized (trimmed, lowercase) by [`normalize_catalog`].
    #[serde(default)]
    pub sources: IndexMap<String, SourceCfg>,
}

fn default_enabled() -> bool {
    true
}

/// Configuration payload for one source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SourceCfg {
    /// Defaults to `true`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Empty means the process default.
    #[serde(default)]
    pub schedule: String,
    /// 0 means the process default.
    #[serde(default)]
    pub max_items: u32,
    /// Higher sorts first.
    #[serde(default)]
    pub priority: i32,
    /// Optional free text.
    #[serde(default)]
    pub description: Option<String>,
}

/// Summary of changes performed during normalization.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    /// Number of names that changed when lowercasing/trimming.
    pub names_renamed: usize,
    /// Descriptions that were blank and got dropped.
    pub descriptions_cleared: usize,
}

/// Normalize a catalog in-place.
///
/// Errors:
/// - Empty or duplicate names after normalization
/// - A non-empty schedule that does not parse
pub fn normalize_catalog(cat: &mut SourceCatalog) -> anyhow::Result<NormalizationReport> {
    let mut report = NormalizationReport::default();
    let mut rebuilt: IndexMap<String, SourceCfg> = IndexMap::new();

    for (raw_name, mut cfg) in std::mem::take(&mut cat.sources) {
        let name = raw_name.trim().to_lowercase();
        if name.is_empty() {
            bail!("source name cannot be empty after trimming");
        }
        if name != raw_name {
            report.names_renamed += 1;
        }
        if rebuilt.contains_key(&name) {
            bail!("duplicate source name after normalization: {name}");
        }

        cfg.schedule = cfg.schedule.trim().to_string();
        if !cfg.schedule.is_empty() {
            ScheduleSpec::parse(&cfg.schedule)
                .with_context(|| format!("source {name}: invalid schedule {:?}", cfg.schedule))?;
        }

        if let Some(desc) = cfg.description.take() {
            let desc = desc.trim();
            if desc.is_empty() {
                report.descriptions_cleared += 1;
            } else {
                cfg.description = Some(desc.to_string());
            }
        }

        rebuilt.insert(name, cfg);
    }

    cat.sources = rebuilt;
    Ok(report)
}

impl SourceCatalog {
    /// Domain configs in catalog order. Call after [`normalize_catalog`].
    pub fn to_configs(&self) -> Vec<SourceConfig> {
        self.sources
            .iter()
            .map(|(name, cfg)| SourceConfig {
                name: name.clone(),
                enabled: cfg.enabled,
                schedule: cfg.schedule.clone(),
                max_items: cfg.max_items,
                priority: cfg.priority,
                description: cfg.description.clone(),
            })
            .collect()
    }
}

/// Parse and normalize a catalog from a TOML string.
pub fn load_catalog_str(toml_str: &str) -> anyhow::Result<SourceCatalog> {
    let mut cat: SourceCatalog = from_str(toml_str).context("failed to parse catalog TOML")?;
    let report = normalize_catalog(&mut cat).context("normalize_catalog failed")?;
    tracing::debug!(?report, sources = cat.sources.len(), "catalog normalized");
    Ok(cat)
}

/// Read a catalog TOML file from disk, parse, and normalize it.
///
/// See [`load_catalog_str`] for details on parsing and normalization.
pub fn load_catalog_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<SourceCatalog> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read catalog file {}", path.as_ref().display()))?;
    load_catalog_str(&text)
}
