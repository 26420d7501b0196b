use thiserror::Error;

/// Errors from the main fetch path.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure, timeout, or an unreadable response body.
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The upstream answered with a non-success status.
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not the expected JSON envelope.
    #[error("failed to decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A transient failure kept happening until the retry budget ran out.
    #[error("upstream still failing after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Transport failures, 5xx and 429 are transient; other statuses and decode
    /// failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(_) => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::Decode(_) | FetchError::RetriesExhausted { .. } => false,
        }
    }

    /// HTTP status carried by this error, looking through retry exhaustion.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Request(e) => e.status().map(|s| s.as_u16()),
            FetchError::RetriesExhausted { last, .. } => last.status(),
            FetchError::Decode(_) => None,
        }
    }
}

/// Errors from the health probe. Kept apart from [`FetchError`] so liveness checks
/// never get confused with sync failures.
#[derive(Debug, Error)]
pub enum UnavailableError {
    #[error("upstream unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("upstream health check returned HTTP {status}")]
    Unhealthy { status: u16 },
}
