use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url, header};
use secrecy::{ExposeSecret, SecretString};
use shared_utils::env::{get_env_opt, get_env_var};
use snafu::{ResultExt, ensure};
use tracing::{debug, warn};

use crate::{
    models::{raw_item::RawItem, request_params::FetchParams},
    providers::{
        ClientBuildSnafu, ClientInitError, FetchError, InvalidApiTokenSnafu, InvalidBaseUrlSnafu,
        MissingEnvVarSnafu, UnavailableError, UpstreamFetcher,
        ingestion_api::{params::construct_params, response::FetchResponse},
    },
};

/// Settings for [`IngestionApiClient`].
#[derive(Debug)]
pub struct ClientConfig {
    /// Absolute base url, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How many times a transient failure is retried before giving up.
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry.
    pub retry_base_delay: Duration,
    /// Optional bearer token sent with every request.
    pub api_token: Option<SecretString>,
}

impl ClientConfig {
    /// Config with the default timeout and retry policy.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            api_token: None,
        }
    }
}

/// [`UpstreamFetcher`] backed by the ingestion API over HTTP.
pub struct IngestionApiClient {
    client: Client,
    base_url: String,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl IngestionApiClient {
    /// Builds a client from explicit settings.
    pub fn new(config: ClientConfig) -> Result<Self, ClientInitError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url).ok();
        ensure!(
            parsed.is_some_and(|u| matches!(u.scheme(), "http" | "https")),
            InvalidBaseUrlSnafu {
                url: config.base_url.clone()
            }
        );

        let mut headers = header::HeaderMap::new();
        if let Some(token) = &config.api_token {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .context(InvalidApiTokenSnafu)?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            base_url,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        })
    }

    /// Creates a client from the environment.
    ///
    /// Reads the base url from `INGESTION_API_URL` (required) and an optional bearer
    /// token from `INGESTION_API_TOKEN`.
    pub fn from_env() -> Result<Self, ClientInitError> {
        let base_url = get_env_var("INGESTION_API_URL").context(MissingEnvVarSnafu)?;
        let mut config = ClientConfig::new(base_url);
        config.api_token = get_env_opt("INGESTION_API_TOKEN").map(|t| SecretString::new(t.into()));
        Self::new(config)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    async fn fetch_once(&self, query: &[(String, String)]) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(self.endpoint("source"))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // Read fully before decoding so a broken body never yields a partial batch.
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice::<FetchResponse>(&bytes)?)
    }
}

#[async_trait]
impl UpstreamFetcher for IngestionApiClient {
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<RawItem>, FetchError> {
        let query = construct_params(params);
        let mut attempt: u32 = 0;

        loop {
            match self.fetch_once(&query).await {
                Ok(response) => {
                    debug!(
                        source = %params.source,
                        items = response.items.len(),
                        meta = ?response.meta,
                        "fetched upstream page"
                    );
                    return Ok(response.items);
                }
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        source = %params.source,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient upstream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() && attempt > 0 => {
                    return Err(FetchError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn health_check(&self) -> Result<(), UnavailableError> {
        let response = self.client.get(self.endpoint("health")).send().await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            other => Err(UnavailableError::Unhealthy {
                status: other.as_u16(),
            }),
        }
    }
}
