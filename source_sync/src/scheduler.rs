//! Thin scheduling adapter around the orchestrator.
//!
//! The orchestrator never owns timers. This module turns schedule expressions into fire times
//! and drives a [`SyncTrigger`] from one tokio task per active source, persisting every
//! [`SyncResult`] to the [`RunLog`]. Stopping a task never interrupts a run already under
//! way: the task finishes and logs it, then exits.
//!
//! Schedule expressions:
//! - 5-field cron (`min hour dom month dow`); a seconds column of `0` is prepended
//! - 6-field cron with seconds, or the `cron` crate's `@hourly`/`@daily` shorthands
//! - `@every <duration>` with `d`, `h`, `m`, `s` components, e.g. `@every 1h30m`

use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    db::Database,
    orchestrator::{RunRequest, SyncOrchestrator, SyncResult},
    runs::RunLog,
    sources::{SourceRepo, SqliteSourceRepo},
};

/// Capability the scheduler drives: run one cycle for a named source.
#[async_trait]
pub trait SyncTrigger: Send + Sync {
    /// Run a cycle for `source` and report its outcome.
    async fn trigger(&self, source: &str) -> SyncResult;
}

#[async_trait]
impl SyncTrigger for SyncOrchestrator {
    async fn trigger(&self, source: &str) -> SyncResult {
        match RunRequest::new(source) {
            Ok(request) => self.run_sync_cycle(request).await,
            Err(err) => SyncResult::rejected(source, &err),
        }
    }
}

/// A parsed schedule expression.
#[derive(Debug, Clone)]
pub enum ScheduleSpec {
    /// Cron schedule evaluated in UTC.
    Cron(Box<Schedule>),
    /// Fixed interval between the end of one wait and the next.
    Every(Duration),
}

/// Parse `2h30m`, `1d12h`, `90s`. Returns `None` for empty, unitless or malformed input.
fn parse_interval(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut total_secs: u64 = 0;
    let mut num_buf = String::new();
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            num_buf.push(ch);
            continue;
        }
        let n: u64 = num_buf.parse().ok()?;
        num_buf.clear();
        let unit = match ch {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        total_secs = total_secs.checked_add(n.checked_mul(unit)?)?;
    }
    if !num_buf.is_empty() {
        return None;
    }
    Some(Duration::from_secs(total_secs))
}

impl ScheduleSpec {
    /// Parse a schedule expression.
    pub fn parse(expr: &str) -> anyhow::Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            bail!("schedule expression is empty");
        }

        if let Some(rest) = expr.strip_prefix("@every") {
            let every = parse_interval(rest)
                .with_context(|| format!("bad interval in {expr:?}"))?;
            if every.is_zero() {
                bail!("interval must be positive: {expr:?}");
            }
            return Ok(ScheduleSpec::Every(every));
        }

        let normalized = if expr.split_whitespace().count() == 5 {
            format!("0 {expr}")
        } else {
            expr.to_string()
        };
        let schedule = Schedule::from_str(&normalized)
            .with_context(|| format!("bad cron expression {expr:?}"))?;
        Ok(ScheduleSpec::Cron(Box::new(schedule)))
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ScheduleSpec::Cron(s) => s.after(&after).next(),
            ScheduleSpec::Every(d) => chrono::TimeDelta::from_std(*d)
                .ok()
                .and_then(|d| after.checked_add_signed(d)),
        }
    }
}

/// What a [`Scheduler::reload`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Sources that got a new task.
    pub started: Vec<String>,
    /// Sources whose task was kept as is.
    pub kept: Vec<String>,
    /// Sources whose task was stopped (removed, disabled or rescheduled).
    pub stopped: Vec<String>,
    /// Sources whose task had exited on its own and was started again.
    pub restarted: Vec<String>,
    /// Sources skipped because their schedule did not parse.
    pub invalid: Vec<String>,
}

struct SourceTask {
    schedule: String,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SourceTask {
    /// Ask the loop to exit at its next wait. An in-flight run completes first.
    fn stop(self) -> JoinHandle<()> {
        let _ = self.stop.send(true);
        self.handle
    }
}

/// One timer task per active source.
pub struct Scheduler {
    trigger: Arc<dyn SyncTrigger>,
    db: Database,
    default_schedule: String,
    tasks: HashMap<String, SourceTask>,
}

impl Scheduler {
    /// Build a scheduler and start tasks for every active source.
    pub async fn spawn(
        trigger: Arc<dyn SyncTrigger>,
        db: Database,
        default_schedule: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let default_schedule = default_schedule.into();
        ScheduleSpec::parse(&default_schedule).context("invalid default schedule")?;

        let mut scheduler = Self {
            trigger,
            db,
            default_schedule,
            tasks: HashMap::new(),
        };
        let summary = scheduler.reload().await?;
        info!(sources = summary.started.len(), "scheduler started");
        Ok(scheduler)
    }

    /// Re-read the active configs and reconcile the task set.
    ///
    /// Tasks whose effective schedule is unchanged keep running; everything else is stopped
    /// and, if still active, started again.
    pub async fn reload(&mut self) -> anyhow::Result<ReloadSummary> {
        let repo = SqliteSourceRepo::new();
        let active = self
            .db
            .with_conn(move |conn| repo.list_active_configs(conn))
            .await?;

        let mut summary = ReloadSummary::default();
        let mut next: HashMap<String, SourceTask> = HashMap::new();

        for stored in active {
            let name = stored.config.name;
            let schedule = if stored.config.schedule.trim().is_empty() {
                self.default_schedule.clone()
            } else {
                stored.config.schedule.trim().to_string()
            };

            let mut restarting = false;
            if let Some(existing) = self.tasks.remove(&name) {
                if existing.handle.is_finished() {
                    warn!(source = %name, "scheduled task exited, restarting");
                    restarting = true;
                } else if existing.schedule == schedule {
                    summary.kept.push(name.clone());
                    next.insert(name, existing);
                    continue;
                } else {
                    existing.stop();
                    summary.stopped.push(name.clone());
                }
            }

            let spec = match ScheduleSpec::parse(&schedule) {
                Ok(spec) => spec,
                Err(err) => {
                    warn!(source = %name, schedule = %schedule, error = %err, "invalid schedule, source not scheduled");
                    summary.invalid.push(name);
                    continue;
                }
            };

            let (stop, stopped) = watch::channel(false);
            let handle = tokio::spawn(source_loop(
                Arc::clone(&self.trigger),
                self.db.clone(),
                name.clone(),
                spec,
                stopped,
            ));
            info!(source = %name, schedule = %schedule, "source scheduled");
            if restarting {
                summary.restarted.push(name.clone());
            } else {
                summary.started.push(name.clone());
            }
            next.insert(
                name,
                SourceTask {
                    schedule,
                    stop,
                    handle,
                },
            );
        }

        for (name, task) in self.tasks.drain() {
            task.stop();
            info!(source = %name, "source unscheduled");
            summary.stopped.push(name);
        }
        self.tasks = next;
        Ok(summary)
    }

    /// Names of the sources that currently have a task, sorted.
    pub fn scheduled_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop every task and wait for in-flight runs to finish.
    pub async fn shutdown(mut self) {
        let handles: Vec<_> = self
            .tasks
            .drain()
            .map(|(name, task)| (name, task.stop()))
            .collect();
        for (name, handle) in handles {
            if let Err(err) = handle.await {
                error!(source = %name, error = %err, "scheduled task panicked");
            }
        }
        info!("scheduler stopped");
    }
}

async fn source_loop(
    trigger: Arc<dyn SyncTrigger>,
    db: Database,
    name: String,
    spec: ScheduleSpec,
    mut stop: watch::Receiver<bool>,
) {
    while !*stop.borrow() {
        let now = Utc::now();
        let Some(next) = spec.next_after(now) else {
            warn!(source = %name, "schedule has no upcoming fire time");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            // a dropped sender also ends the loop
            _ = stop.changed() => return,
        }

        let result = trigger.trigger(&name).await;
        if !result.success {
            warn!(source = %name, error = ?result.error, "scheduled run failed");
        }

        let logged = db
            .with_conn(move |conn| RunLog::record(conn, &result))
            .await;
        if let Err(err) = logged {
            error!(source = %name, error = %err, "failed to record run");
        }
    }
}
