use indexmap::IndexMap;
use serde::Deserialize;

use crate::models::raw_item::RawItem;

/// Envelope of `GET /source`.
#[derive(Deserialize, Debug, Default)]
pub struct FetchResponse {
    #[serde(default)]
    pub items: Vec<RawItem>,
    /// Free-form upstream metadata (paging hints, counts). Logged, never interpreted.
    #[serde(default)]
    pub meta: IndexMap<String, serde_json::Value>,
}
