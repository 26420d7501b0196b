//! Upstream side of the sync pipeline.
//!
//! - [`models`]: wire shapes returned by the ingestion API and the request parameters.
//! - [`providers`]: the [`providers::UpstreamFetcher`] trait plus the HTTP implementation.

pub mod models;
pub mod providers;
