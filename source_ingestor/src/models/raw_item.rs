use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One item exactly as the ingestion API returns it.
///
/// Nothing here is trusted: strings are untrimmed and may be missing or `null`,
/// and `source` is whatever the upstream claims. Normalization into a stored
/// record happens downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    /// Upstream-assigned identifier, used as the natural key once validated.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    /// `null` and a missing field both decode as `None`.
    #[serde(default)]
    pub score: Option<i64>,
    /// Upstream creation time (RFC-3339).
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub flair: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Source the upstream claims this item belongs to. Never used for ownership.
    #[serde(default, alias = "subreddit")]
    pub source: Option<String>,
}
