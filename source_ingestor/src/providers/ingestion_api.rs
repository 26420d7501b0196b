//! HTTP client for the ingestion API (`GET /source`, `GET /health`).

pub mod params;
pub mod provider;
pub mod response;

pub use provider::{ClientConfig, IngestionApiClient};
