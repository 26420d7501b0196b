use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;
use shared_utils::env::get_env_opt;
use source_ingestor::providers::{UpstreamFetcher, ingestion_api::IngestionApiClient};
use source_sync::{
    catalog::{
        config::load_catalog_path,
        sync::{SyncOptions, sync_catalog},
    },
    config::{SyncSettings, load_settings},
    db::Database,
    orchestrator::{RunRequest, SyncOrchestrator, SyncResult},
    records::{RecordRepo, SqliteRecordRepo},
    runs::RunLog,
    scheduler::Scheduler,
    sources::{SourceRepo, SqliteSourceRepo},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Incremental source sync")]
struct Cli {
    /// Settings file (TOML). Environment variables override it.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending database migrations.
    Migrate,
    /// Declarative source configuration.
    Catalog(CatalogCmd),
    /// Inspect or remove source configs.
    Sources(SourcesCmd),
    /// Run one sync cycle for a source.
    Run {
        #[arg(long)]
        source: String,
        /// Item cap for this run only.
        #[arg(long)]
        limit: Option<u32>,
        /// Lower bound for this run only (RFC3339).
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Run every enabled source once, concurrently.
    RunAll,
    /// Query stored records.
    Records(RecordsCmd),
    /// Show the run log.
    Runs {
        #[arg(long)]
        source: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Check that the upstream answers.
    Health,
    /// Run the scheduler until interrupted.
    Serve {
        /// Seconds between re-reads of the source configs.
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
        reload_secs: u64,
    },
}

#[derive(Args)]
struct CatalogCmd {
    #[command(subcommand)]
    sub: CatalogSub,
}

#[derive(Subcommand)]
enum CatalogSub {
    Sync {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        prune: bool,
    },
}

#[derive(Args)]
struct SourcesCmd {
    #[command(subcommand)]
    sub: SourcesSub,
}

#[derive(Subcommand)]
enum SourcesSub {
    List {
        /// Include disabled sources.
        #[arg(long)]
        all: bool,
    },
    Delete {
        name: String,
    },
}

#[derive(Args)]
struct RecordsCmd {
    #[command(subcommand)]
    sub: RecordsSub,
}

#[derive(Subcommand)]
enum RecordsSub {
    /// Records created or updated within the lookback window.
    Recent {
        #[arg(long)]
        source: String,
        /// Defaults to `default_lookback_hours`.
        #[arg(long)]
        hours: Option<u32>,
    },
    Count {
        #[arg(long)]
        source: Option<String>,
    },
}

fn build_fetcher(settings: &SyncSettings) -> Result<Arc<dyn UpstreamFetcher>> {
    let mut cfg = settings.client_config();
    cfg.api_token = get_env_opt("INGESTION_API_TOKEN").map(|t| SecretString::new(t.into()));
    let client = IngestionApiClient::new(cfg).context("build ingestion API client")?;
    Ok(Arc::new(client))
}

fn open_db(settings: &SyncSettings) -> Result<Database> {
    let db = Database::new(&settings.database_url)?;
    db.migrate()?;
    Ok(db)
}

async fn log_runs(db: &Database, results: Vec<SyncResult>) -> Result<Vec<SyncResult>> {
    let to_log = results.clone();
    db.with_conn(move |conn| {
        for r in &to_log {
            RunLog::record(conn, r)?;
        }
        Ok(())
    })
    .await?;
    Ok(results)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    match cli.cmd {
        Cmd::Migrate => {
            open_db(&settings)?;
            info!(database = %settings.database_url, "migrations applied");
        }
        Cmd::Catalog(CatalogCmd {
            sub:
                CatalogSub::Sync {
                    file,
                    dry_run,
                    prune,
                },
        }) => {
            let cat = load_catalog_path(&file)?;
            let db = open_db(&settings)?;
            let mut conn = db.connect()?;
            let diff = sync_catalog(&mut conn, cat, SyncOptions { dry_run, prune })?;
            println!("{diff}");
        }
        Cmd::Sources(SourcesCmd { sub }) => {
            let db = open_db(&settings)?;
            let mut conn = db.connect()?;
            let repo = SqliteSourceRepo::new();
            match sub {
                SourcesSub::List { all } => {
                    let configs = if all {
                        repo.list_all_configs(&mut conn)?
                    } else {
                        repo.list_active_configs(&mut conn)?
                    };
                    print_json(&configs)?;
                }
                SourcesSub::Delete { name } => {
                    if repo.delete_config(&mut conn, &name)? {
                        println!("deleted {name}");
                    } else {
                        println!("no source named {name}");
                    }
                }
            }
        }
        Cmd::Run {
            source,
            limit,
            since,
        } => {
            let db = open_db(&settings)?;
            let fetcher = build_fetcher(&settings)?;
            let orchestrator = SyncOrchestrator::new(db.clone(), fetcher, settings);

            let mut request = RunRequest::new(&source)?;
            if let Some(limit) = limit {
                request = request.with_limit(limit);
            }
            if let Some(since) = since {
                request = request.with_since(since);
            }
            let result = orchestrator.run_sync_cycle(request).await;
            let results = log_runs(&db, vec![result]).await?;
            print_json(&results[0])?;
            if !results[0].success {
                std::process::exit(1);
            }
        }
        Cmd::RunAll => {
            let db = open_db(&settings)?;
            let fetcher = build_fetcher(&settings)?;
            let orchestrator = SyncOrchestrator::new(db.clone(), fetcher, settings);
            let results = orchestrator.run_all_active().await?;
            let results = log_runs(&db, results).await?;
            let failed = results.iter().filter(|r| !r.success).count();
            print_json(&results)?;
            info!(total = results.len(), failed, "run-all finished");
        }
        Cmd::Records(RecordsCmd { sub }) => {
            let db = open_db(&settings)?;
            let mut conn = db.connect()?;
            let repo = SqliteRecordRepo::new();
            match sub {
                RecordsSub::Recent { source, hours } => {
                    let window = hours
                        .map(|h| chrono::TimeDelta::hours(i64::from(h)))
                        .unwrap_or_else(|| settings.default_lookback());
                    let records = repo.list_recent_since(&mut conn, &source, Utc::now() - window)?;
                    print_json(&records)?;
                }
                RecordsSub::Count { source } => {
                    let n = repo.count_by_source(&mut conn, source.as_deref())?;
                    println!("{n}");
                }
            }
        }
        Cmd::Runs { source, limit } => {
            let db = open_db(&settings)?;
            let mut conn = db.connect()?;
            let entries = RunLog::recent(&mut conn, source.as_deref(), limit)?;
            print_json(&entries)?;
        }
        Cmd::Health => {
            let fetcher = build_fetcher(&settings)?;
            match fetcher.health_check().await {
                Ok(()) => println!("ok"),
                Err(err) => {
                    error!(error = %err, "upstream unavailable");
                    std::process::exit(1);
                }
            }
        }
        Cmd::Serve { reload_secs } => {
            let db = open_db(&settings)?;
            let fetcher = build_fetcher(&settings)?;
            let default_schedule = settings.default_schedule.clone();
            let orchestrator = SyncOrchestrator::new(db.clone(), fetcher, settings);
            let mut scheduler =
                Scheduler::spawn(Arc::new(orchestrator), db, default_schedule).await?;
            info!(sources = ?scheduler.scheduled_sources(), "serving; ctrl-c to stop");

            let period = Duration::from_secs(reload_secs);
            let mut reload = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);
            loop {
                tokio::select! {
                    res = &mut ctrl_c => {
                        res.context("listen for ctrl-c")?;
                        break;
                    }
                    _ = reload.tick() => match scheduler.reload().await {
                        Ok(summary) => {
                            let changed = !(summary.started.is_empty()
                                && summary.stopped.is_empty()
                                && summary.restarted.is_empty());
                            if changed {
                                info!(
                                    started = ?summary.started,
                                    stopped = ?summary.stopped,
                                    restarted = ?summary.restarted,
                                    invalid = ?summary.invalid,
                                    "scheduler reloaded"
                                );
                            }
                        }
                        Err(err) => warn!(error = %err, "scheduler reload failed"),
                    },
                }
            }
            scheduler.shutdown().await;
        }
    }

    Ok(())
}
