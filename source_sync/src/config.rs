//! Process-wide sync settings.
//!
//! Settings come from an optional TOML file and are then overridden by environment variables.
//! The result is validated once and handed to the orchestrator as an immutable value; nothing
//! reads the environment at run time.
//!
//! | key                      | env                      | default                 |
//! |--------------------------|--------------------------|-------------------------|
//! | `database_url`           | `DATABASE_URL`           | `source_sync.db`        |
//! | `ingestion_api_url`      | `INGESTION_API_URL`      | `http://localhost:8080` |
//! | `request_timeout_secs`   | `REQUEST_TIMEOUT_SECS`   | 60                      |
//! | `default_limit`          | `DEFAULT_LIMIT`          | 100                     |
//! | `default_lookback_hours` | `DEFAULT_LOOKBACK_HOURS` | 1                       |
//! | `max_retries`            | `MAX_RETRIES`            | 3                       |
//! | `retry_base_delay_ms`    | `RETRY_BASE_DELAY_MS`    | 500                     |
//! | `default_schedule`       | `SOURCE_SCHEDULE`        | `@every 1h`             |
//! | `run_timeout_secs`       | `RUN_TIMEOUT_SECS`       | unset                   |

use std::{path::Path, str::FromStr, time::Duration};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use shared_utils::env::{get_env_opt, parse_opt};
use source_ingestor::providers::ingestion_api::ClientConfig;

/// Immutable settings threaded into the orchestrator and scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// SQLite path or url.
    pub database_url: String,
    /// Base url of the upstream ingestion API.
    pub ingestion_api_url: String,
    /// Per-request HTTP timeout, seconds.
    pub request_timeout_secs: u64,
    /// Item cap used when neither the request nor the source config sets one.
    pub default_limit: u32,
    /// Window used by "recent records" queries when none is given.
    pub default_lookback_hours: u32,
    /// Retries for transient upstream failures.
    pub max_retries: u32,
    /// First retry backoff, milliseconds; doubles per attempt.
    pub retry_base_delay_ms: u64,
    /// Schedule for sources whose config leaves it empty.
    pub default_schedule: String,
    /// Optional deadline for one whole sync cycle, seconds.
    pub run_timeout_secs: Option<u64>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            database_url: "source_sync.db".into(),
            ingestion_api_url: "http://localhost:8080".into(),
            request_timeout_secs: 60,
            default_limit: 100,
            default_lookback_hours: 1,
            max_retries: 3,
            retry_base_delay_ms: 500,
            default_schedule: "@every 1h".into(),
            run_timeout_secs: None,
        }
    }
}

fn override_parsed<T: FromStr>(
    slot: &mut T,
    name: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = parse_opt::<T>(name, lookup(name))? {
        *slot = v;
    }
    Ok(())
}

impl SyncSettings {
    /// Apply overrides from `lookup` (an env-like source). Blank values count as unset.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        let lookup = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("INGESTION_API_URL") {
            self.ingestion_api_url = v;
        }
        if let Some(v) = lookup("SOURCE_SCHEDULE") {
            self.default_schedule = v;
        }
        override_parsed(&mut self.request_timeout_secs, "REQUEST_TIMEOUT_SECS", &lookup)?;
        override_parsed(&mut self.default_limit, "DEFAULT_LIMIT", &lookup)?;
        override_parsed(&mut self.default_lookback_hours, "DEFAULT_LOOKBACK_HOURS", &lookup)?;
        override_parsed(&mut self.max_retries, "MAX_RETRIES", &lookup)?;
        override_parsed(&mut self.retry_base_delay_ms, "RETRY_BASE_DELAY_MS", &lookup)?;
        if let Some(secs) = parse_opt::<u64>("RUN_TIMEOUT_SECS", lookup("RUN_TIMEOUT_SECS"))? {
            self.run_timeout_secs = Some(secs);
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_env_with(get_env_opt)
    }

    /// Reject settings no run could work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            bail!("database_url must not be empty");
        }
        if self.ingestion_api_url.trim().is_empty() {
            bail!("ingestion_api_url must not be empty");
        }
        if self.default_limit == 0 {
            bail!("default_limit must be positive");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be positive");
        }
        if self.run_timeout_secs == Some(0) {
            bail!("run_timeout_secs must be positive when set");
        }
        crate::scheduler::ScheduleSpec::parse(&self.default_schedule)
            .with_context(|| format!("invalid default_schedule {:?}", self.default_schedule))?;
        Ok(())
    }

    /// HTTP timeout per upstream request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// First retry backoff.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Deadline for one sync cycle, if any.
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Default window for recent-record queries.
    pub fn default_lookback(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::hours(i64::from(self.default_lookback_hours))
    }

    /// Upstream client settings derived from these settings.
    pub fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new(self.ingestion_api_url.clone());
        cfg.timeout = self.request_timeout();
        cfg.max_retries = self.max_retries;
        cfg.retry_base_delay = self.retry_base_delay();
        cfg
    }
}

/// Parse settings from a TOML string. Missing keys take their defaults.
pub fn load_settings_str(toml_str: &str) -> anyhow::Result<SyncSettings> {
    toml::from_str(toml_str).context("failed to parse settings TOML")
}

/// Read settings from a TOML file.
pub fn load_settings_path(path: impl AsRef<Path>) -> anyhow::Result<SyncSettings> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read settings file {}", path.as_ref().display()))?;
    load_settings_str(&text)
}

/// File (if any), then environment, then validation.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<SyncSettings> {
    let mut settings = match path {
        Some(p) => load_settings_path(p)?,
        None => SyncSettings::default(),
    };
    settings.apply_env()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let s = SyncSettings::default();
        s.validate().unwrap();
        assert_eq!(s.default_limit, 100);
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.default_schedule, "@every 1h");
        assert_eq!(s.request_timeout(), Duration::from_secs(60));
        assert_eq!(s.run_timeout(), None);
    }

    #[test]
    fn toml_fills_missing_keys_with_defaults() {
        let s = load_settings_str(
            r#"
            database_url = "sqlite:///var/lib/sync.db"
            default_limit = 25
            run_timeout_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(s.database_url, "sqlite:///var/lib/sync.db");
        assert_eq!(s.default_limit, 25);
        assert_eq!(s.run_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(s.max_retries, 3);
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        assert!(load_settings_str("mongo_uri = \"mongodb://x\"").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut s = load_settings_str("default_limit = 25").unwrap();
        s.apply_env_with(env(&[
            ("DEFAULT_LIMIT", "50"),
            ("INGESTION_API_URL", "http://upstream:9000"),
            ("SOURCE_SCHEDULE", "*/15 * * * *"),
            ("MAX_RETRIES", " 5 "),
            ("DATABASE_URL", "   "),
        ]))
        .unwrap();

        assert_eq!(s.default_limit, 50);
        assert_eq!(s.ingestion_api_url, "http://upstream:9000");
        assert_eq!(s.default_schedule, "*/15 * * * *");
        assert_eq!(s.max_retries, 5);
        // blank env is ignored
        assert_eq!(s.database_url, "source_sync.db");
    }

    #[test]
    fn invalid_env_value_is_an_error() {
        let mut s = SyncSettings::default();
        let err = s
            .apply_env_with(env(&[("DEFAULT_LIMIT", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("DEFAULT_LIMIT"));
    }

    #[test]
    fn validation_rejects_unusable_settings() {
        let mut s = SyncSettings::default();
        s.default_limit = 0;
        assert!(s.validate().is_err());

        let mut s = SyncSettings::default();
        s.ingestion_api_url = " ".into();
        assert!(s.validate().is_err());

        let mut s = SyncSettings::default();
        s.default_schedule = "whenever".into();
        assert!(s.validate().is_err());
    }

    #[test]
    fn client_config_carries_retry_policy() {
        let mut s = SyncSettings::default();
        s.max_retries = 7;
        s.retry_base_delay_ms = 20;
        let cfg = s.client_config();
        assert_eq!(cfg.max_retries, 7);
        assert_eq!(cfg.retry_base_delay, Duration::from_millis(20));
        assert_eq!(cfg.base_url, "http://localhost:8080");
    }
}
