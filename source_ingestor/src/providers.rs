//! Upstream abstraction for the sync pipeline.
//!
//! This module defines the [`UpstreamFetcher`] trait, the single seam between the
//! orchestrator and whatever serves raw items (the HTTP ingestion API in production,
//! scripted fakes in tests).
//!
//! The trait is async and object safe, so callers hold an `Arc<dyn UpstreamFetcher>`
//! and pick the implementation at runtime.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use source_ingestor::models::{raw_item::RawItem, request_params::FetchParams};
//! use source_ingestor::providers::{FetchError, UnavailableError, UpstreamFetcher};
//!
//! struct EmptyUpstream;
//!
//! #[async_trait]
//! impl UpstreamFetcher for EmptyUpstream {
//!     async fn fetch(&self, _params: &FetchParams) -> Result<Vec<RawItem>, FetchError> {
//!         Ok(vec![])
//!     }
//!
//!     async fn health_check(&self) -> Result<(), UnavailableError> {
//!         Ok(())
//!     }
//! }
//! ```

pub mod errors;
pub mod ingestion_api;

use async_trait::async_trait;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};

use crate::models::{raw_item::RawItem, request_params::FetchParams};

pub use errors::{FetchError, UnavailableError};

/// Retrieves raw items for one source.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// Fetches items for `params.source` created after `params.since`, at most `params.limit`.
    ///
    /// Either the whole decoded batch is returned or an error; callers never see a
    /// partially decoded result.
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<RawItem>, FetchError>;

    /// Reports whether the upstream is reachable. Independent of [`UpstreamFetcher::fetch`].
    async fn health_check(&self) -> Result<(), UnavailableError>;
}

/// Errors that can occur while building an upstream client.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClientInitError {
    /// missed environment variable.
    #[snafu(display("Missing environment variable: {source}"))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// API token contains characters that are not allowed in a header.
    #[snafu(display("Invalid API token format: {source}"))]
    InvalidApiToken {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },

    /// Base url is not an absolute http(s) url.
    #[snafu(display("Invalid ingestion API base url: {url:?}"))]
    InvalidBaseUrl { url: String },
}
