//! Sync orchestrator: one fetch → validate → persist → advance-watermark cycle per source.
//!
//! A cycle moves through these steps, strictly in order:
//! 1. capture the start time, then resolve limit and lower bound
//!    (request override → source config / stored watermark → process default / full sync)
//! 2. fetch from upstream; a failure ends the run and leaves the watermark alone
//! 3. validate and normalize; invalid items are dropped, not counted as errors
//! 4. batch-upsert the valid records
//! 5. advance the watermark to the start time captured in step 1
//! 6. report a [`SyncResult`], whatever happened
//!
//! Steps 1 to 4 honor the run deadline and the caller's cancellation signal. Step 5 only
//! begins once persistence has fully completed and is never interrupted, so a cancelled or
//! timed-out run can leave idempotently re-upserted records behind but never a moved watermark.
//!
//! Runs for different sources share nothing but the store. Two overlapping runs for the same
//! source are tolerated: upserts are idempotent and the watermark write keeps the maximum.

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use source_ingestor::{
    models::request_params::FetchParams,
    providers::{FetchError, UpstreamFetcher},
};
use tracing::{debug, info, warn};

use crate::{
    config::SyncSettings,
    db::Database,
    records::{BatchOutcome, RecordRepo, RepoError, SqliteRecordRepo},
    sources::{SourceRepo, SqliteSourceRepo},
    tz,
    validate::{self, ValidationReport},
};

/// Why a sync cycle failed.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The run request was malformed.
    #[error("invalid run request: {0}")]
    InvalidRequest(String),
    /// Upstream fetch failed; the watermark was not touched.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// Batch persistence failed as a whole.
    #[error("persist failed: {0:#}")]
    Persist(anyhow::Error),
    /// Records were stored but the watermark could not be advanced.
    #[error("watermark update failed: {0:#}")]
    Watermark(anyhow::Error),
    /// Reading the source config or watermark failed.
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
    /// The caller's cancellation signal fired.
    #[error("run cancelled")]
    Cancelled,
    /// The run deadline elapsed.
    #[error("run timed out after {0:?}")]
    TimedOut(Duration),
}

impl SyncError {
    /// The typed repository error underneath, if any.
    pub fn repo_error(&self) -> Option<&RepoError> {
        match self {
            SyncError::Persist(e) | SyncError::Watermark(e) | SyncError::Storage(e) => {
                e.downcast_ref::<RepoError>()
            }
            _ => None,
        }
    }
}

/// Strongly-typed parameters of one run, validated once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    source: String,
    limit: Option<u32>,
    since: Option<DateTime<Utc>>,
}

impl RunRequest {
    /// Request for `source` with no overrides. The name is trimmed and must not be empty.
    pub fn new(source: impl AsRef<str>) -> Result<Self, SyncError> {
        let source = source.as_ref().trim();
        if source.is_empty() {
            return Err(SyncError::InvalidRequest("source name is empty".into()));
        }
        Ok(Self {
            source: source.to_string(),
            limit: None,
            since: None,
        })
    }

    /// Override the item cap. Zero means no override.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    /// Override the lower bound. Values at or before the unix epoch mean no override.
    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = (since.timestamp() > 0).then_some(since);
        self
    }

    /// Source name.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Item cap override.
    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// Lower bound override.
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }
}

/// Structured outcome of one run; exactly one per run, success or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Source the run was for.
    pub source_name: String,
    /// Terminal state.
    pub success: bool,
    /// Raw items returned by upstream.
    pub items_fetched: usize,
    /// Items that passed validation.
    pub items_processed: usize,
    /// Records written to the store.
    pub items_stored: usize,
    /// Captured before anything else; the watermark candidate.
    pub started_at: DateTime<Utc>,
    /// When the result was built.
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Watermark stored after a successful run.
    pub watermark: Option<DateTime<Utc>>,
    /// Error text of a failed run.
    pub error: Option<String>,
}

impl SyncResult {
    /// Wall-clock duration.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// A failed result for a run that never got going.
    pub fn rejected(source: &str, err: &SyncError) -> Self {
        let now = Utc::now();
        Self {
            source_name: source.to_string(),
            success: false,
            items_fetched: 0,
            items_processed: 0,
            items_stored: 0,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            watermark: None,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct Progress {
    fetched: usize,
    report: ValidationReport,
    outcome: BatchOutcome,
}

async fn with_deadline<T>(
    fut: impl Future<Output = Result<T, SyncError>>,
    deadline: Option<Duration>,
) -> Result<T, SyncError> {
    match deadline {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| SyncError::TimedOut(d))?,
        None => fut.await,
    }
}

/// Runs sync cycles against one store and one upstream.
#[derive(Clone)]
pub struct SyncOrchestrator {
    db: Database,
    fetcher: Arc<dyn UpstreamFetcher>,
    settings: Arc<SyncSettings>,
    records: SqliteRecordRepo,
    sources: SqliteSourceRepo,
}

impl SyncOrchestrator {
    /// Wire an orchestrator. `settings` is frozen from here on.
    pub fn new(db: Database, fetcher: Arc<dyn UpstreamFetcher>, settings: SyncSettings) -> Self {
        Self {
            db,
            fetcher,
            settings: Arc::new(settings),
            records: SqliteRecordRepo::new(),
            sources: SqliteSourceRepo::new(),
        }
    }

    /// Settings this orchestrator was built with.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Store handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run one cycle, bounded by the configured run timeout.
    pub async fn run_sync_cycle(&self, request: RunRequest) -> SyncResult {
        self.run_sync_cycle_until(request, std::future::pending::<()>())
            .await
    }

    /// Run one cycle, aborting when `cancel` resolves or the run timeout elapses.
    pub async fn run_sync_cycle_until(
        &self,
        request: RunRequest,
        cancel: impl Future<Output = ()>,
    ) -> SyncResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let deadline = self.settings.run_timeout();

        // counts survive a failed, cancelled or timed-out run
        let mut progress = Progress::default();
        let prepared = tokio::select! {
            biased;
            _ = cancel => Err(SyncError::Cancelled),
            res = with_deadline(self.fetch_and_persist(&request, &mut progress), deadline) => res,
        };

        let outcome = match prepared {
            Ok(()) => self.advance_watermark(request.source(), started_at).await,
            Err(err) => Err(err),
        };

        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        let finished_at = Utc::now();
        let source = request.source();

        match outcome {
            Ok(watermark) => {
                info!(
                    source,
                    fetched = progress.fetched,
                    valid = progress.report.accepted,
                    rejected = progress.report.rejected(),
                    stored = progress.outcome.stored,
                    failed = progress.outcome.failed,
                    duration_ms,
                    "sync cycle succeeded"
                );
                SyncResult {
                    source_name: source.to_string(),
                    success: true,
                    items_fetched: progress.fetched,
                    items_processed: progress.report.accepted,
                    items_stored: progress.outcome.stored,
                    started_at,
                    finished_at,
                    duration_ms,
                    watermark: Some(watermark),
                    error: None,
                }
            }
            Err(err) => {
                warn!(
                    source,
                    fetched = progress.fetched,
                    valid = progress.report.accepted,
                    duration_ms,
                    error = %err,
                    "sync cycle failed"
                );
                SyncResult {
                    source_name: source.to_string(),
                    success: false,
                    items_fetched: progress.fetched,
                    items_processed: progress.report.accepted,
                    items_stored: progress.outcome.stored,
                    started_at,
                    finished_at,
                    duration_ms,
                    watermark: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Run every enabled source concurrently.
    ///
    /// Results come back in [`SourceRepo::list_active_configs`] order. A failing or panicking
    /// run only affects its own result.
    pub async fn run_all_active(&self) -> anyhow::Result<Vec<SyncResult>> {
        let sources = self.sources;
        let active = self
            .db
            .with_conn(move |conn| sources.list_active_configs(conn))
            .await?;

        let handles: Vec<_> = active
            .into_iter()
            .map(|stored| {
                let name = stored.config.name;
                let this = self.clone();
                let task_name = name.clone();
                let handle = tokio::spawn(async move {
                    match RunRequest::new(&task_name) {
                        Ok(req) => this.run_sync_cycle(req).await,
                        Err(err) => SyncResult::rejected(&task_name, &err),
                    }
                });
                (name, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => {
                    warn!(source = %name, error = %join_err, "sync task did not complete");
                    SyncResult::rejected(
                        &name,
                        &SyncError::Storage(anyhow::anyhow!("sync task aborted: {join_err}")),
                    )
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn fetch_and_persist(
        &self,
        request: &RunRequest,
        progress: &mut Progress,
    ) -> Result<(), SyncError> {
        let source = request.source().to_string();

        // 1. resolve parameters
        let (sources, name) = (self.sources, source.clone());
        let (config, stored_watermark) = self
            .db
            .with_conn(move |conn| {
                let config = sources.get_config(conn, &name)?;
                let watermark = sources.get_watermark(conn, &name)?;
                Ok((config, watermark))
            })
            .await
            .map_err(SyncError::Storage)?;

        let configured_cap = config
            .as_ref()
            .map(|c| c.config.max_items)
            .filter(|n| *n > 0);
        let limit = request
            .limit()
            .or(configured_cap)
            .unwrap_or(self.settings.default_limit);
        let since = request.since().or(stored_watermark);

        info!(
            source = %source,
            limit,
            since = ?since,
            configured = config.is_some(),
            "sync cycle starting"
        );

        // 2. fetch
        let params = FetchParams::new(&source)
            .with_limit(i64::from(limit))
            .with_since(since.map(|t| t.timestamp()).unwrap_or(0));
        let items = self.fetcher.fetch(&params).await?;

        progress.fetched = items.len();
        if items.is_empty() {
            debug!(source = %source, "upstream returned no items");
            return Ok(());
        }

        // 3. validate
        let (valid, report) = validate::normalize_items(&items, &source, Utc::now());
        progress.report = report;
        if report.rejected() > 0 {
            debug!(source = %source, ?report, "dropped invalid items");
        }
        if valid.is_empty() {
            warn!(source = %source, fetched = items.len(), "no fetched item passed validation");
            return Ok(());
        }

        // 4. persist
        let records = self.records;
        progress.outcome = self
            .db
            .with_conn(move |conn| records.upsert_many(conn, &valid))
            .await
            .map_err(SyncError::Persist)?;

        Ok(())
    }

    async fn advance_watermark(
        &self,
        source: &str,
        started_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SyncError> {
        let (sources, name) = (self.sources, source.to_string());
        let stored = self
            .db
            .with_conn(move |conn| sources.set_watermark(conn, &name, started_at))
            .await
            .map_err(SyncError::Watermark)?;

        if stored > tz::truncate_millis(started_at) {
            debug!(source, watermark = %stored, "kept newer watermark from an overlapping run");
        }
        Ok(stored)
    }
}
