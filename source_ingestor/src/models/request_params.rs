use serde::{Deserialize, Serialize};

/// Parameters for one fetch against the ingestion API.
///
/// Mirrors the upstream query contract, so the sentinels are kept as plain integers:
/// - `limit <= 0` means "no limit" and is omitted from the query.
/// - `since <= 0` means "no lower bound" (unix seconds) and is omitted as well.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchParams {
    /// Name of the source to fetch.
    pub source: String,
    /// Maximum number of items to return.
    pub limit: i64,
    /// Lower bound on item creation time, unix seconds.
    pub since: i64,
}

impl FetchParams {
    /// Parameters for an unbounded fetch of `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            limit: 0,
            since: 0,
        }
    }

    /// Sets the item cap.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the lower bound.
    pub fn with_since(mut self, since: i64) -> Self {
        self.since = since;
        self
    }
}
