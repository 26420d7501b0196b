mod common;
use common::{
    Script, ScriptedFetcher, count, item, orchestrator, orchestrator_with,
    reject_titles_starting_with, setup_db, ts,
};

use std::time::Duration;

use source_ingestor::models::raw_item::RawItem;
use source_sync::{
    config::SyncSettings,
    orchestrator::{RunRequest, SyncError},
    records::{RecordRepo, SqliteRecordRepo},
    sources::{SourceConfig, SourceRepo, SqliteSourceRepo},
    tz,
};

fn req(source: &str) -> RunRequest {
    RunRequest::new(source).unwrap()
}

#[test]
fn run_request_rejects_blank_source_and_ignores_empty_overrides() {
    assert!(matches!(RunRequest::new("  "), Err(SyncError::InvalidRequest(_))));

    let r = RunRequest::new(" golang ")
        .unwrap()
        .with_limit(0)
        .with_since(ts(1970, 1, 1, 0, 0, 0));
    assert_eq!(r.source(), "golang");
    assert_eq!(r.limit(), None);
    assert_eq!(r.since(), None);
}

#[tokio::test]
async fn first_run_is_a_full_sync_and_sets_the_watermark() {
    let (db, mut conn) = setup_db();
    let fetcher = ScriptedFetcher::new();
    let mut foreign = item("ccc333", "Third");
    foreign.source = Some("someone_else".into());
    fetcher.set(
        "golang",
        Script::Items(vec![item("aaa111", "First"), item("bbb222", "Second"), foreign]),
    );
    let orch = orchestrator(&db, fetcher.clone());

    let result = orch.run_sync_cycle(req("golang")).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.items_fetched, 3);
    assert_eq!(result.items_processed, 3);
    assert_eq!(result.items_stored, 3);
    assert!(result.finished_at >= result.started_at);
    assert_eq!(result.watermark, Some(tz::truncate_millis(result.started_at)));

    let calls = fetcher.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].since, 0, "no watermark means a full sync");
    assert_eq!(calls[0].limit, 100);

    // every stored record belongs to the run's source
    let records = SqliteRecordRepo::new();
    assert_eq!(records.count_by_source(&mut conn, Some("golang")).unwrap(), 3);
    assert_eq!(count(&mut conn, "records"), 3);
}

#[tokio::test]
async fn next_run_starts_from_the_stored_watermark() {
    let (db, mut conn) = setup_db();
    let fetcher = ScriptedFetcher::new();
    fetcher.set("golang", Script::Items(vec![item("aaa111", "First")]));
    let orch = orchestrator(&db, fetcher.clone());

    let first = orch.run_sync_cycle(req("golang")).await;
    let second = orch.run_sync_cycle(req("golang")).await;
    assert!(first.success && second.success);

    let calls = fetcher.calls_for("golang");
    assert_eq!(calls[1].since, first.watermark.unwrap().timestamp());

    // same window twice: still one record
    assert_eq!(count(&mut conn, "records"), 1);
    assert!(second.watermark >= first.watermark);
}

#[tokio::test]
async fn empty_fetch_still_advances_the_watermark() {
    let (db, mut conn) = setup_db();
    let fetcher = ScriptedFetcher::new();
    let orch = orchestrator(&db, fetcher);

    let result = orch.run_sync_cycle(req("quiet")).await;
    assert!(result.success);
    assert_eq!(result.items_fetched, 0);

    let wm = SqliteSourceRepo::new().get_watermark(&mut conn, "quiet").unwrap();
    assert_eq!(wm, result.watermark);
    assert!(wm.is_some());
}

#[tokio::test]
async fn failed_fetch_leaves_the_watermark_alone() {
    let (db, mut conn) = setup_db();
    let sources = SqliteSourceRepo::new();
    let before = ts(2024, 1, 1, 0, 0, 0);
    sources.set_watermark(&mut conn, "golang", before).unwrap();

    let fetcher = ScriptedFetcher::new();
    fetcher.set("golang", Script::Status(503));
    let orch = orchestrator(&db, fetcher);

    let result = orch.run_sync_cycle(req("golang")).await;
    assert!(!result.success);
    assert_eq!(result.items_fetched, 0);
    assert_eq!(result.watermark, None);
    assert!(result.error.as_deref().unwrap_or_default().contains("503"));
    assert_eq!(sources.get_watermark(&mut conn, "golang").unwrap(), Some(before));
}

#[tokio::test]
async fn invalid_items_are_dropped_not_failed() {
    let (db, mut conn) = setup_db();
    let fetcher = ScriptedFetcher::new();
    fetcher.set(
        "golang",
        Script::Items(vec![
            item("good01", "Kept"),
            item("ab", "Key too short"),
            item("has space", "Whitespace key"),
            item("notitle", "   "),
            RawItem {
                title: Some("No id".into()),
                ..Default::default()
            },
        ]),
    );
    let orch = orchestrator(&db, fetcher);

    let result = orch.run_sync_cycle(req("golang")).await;
    assert!(result.success);
    assert_eq!(result.items_fetched, 5);
    assert_eq!(result.items_processed, 1);
    assert_eq!(result.items_stored, 1);
    assert_eq!(count(&mut conn, "records"), 1);
}

#[tokio::test]
async fn all_invalid_batch_succeeds_and_advances() {
    let (db, mut conn) = setup_db();
    let fetcher = ScriptedFetcher::new();
    fetcher.set("golang", Script::Items(vec![item("x", "short"), item("", "empty")]));
    let orch = orchestrator(&db, fetcher);

    let result = orch.run_sync_cycle(req("golang")).await;
    assert!(result.success);
    assert_eq!(result.items_processed, 0);
    assert!(result.watermark.is_some());
    assert_eq!(count(&mut conn, "records"), 0);
}

#[tokio::test]
async fn store_rejecting_every_record_fails_the_run() {
    let (db, mut conn) = setup_db();
    reject_titles_starting_with(&mut conn, "BAD");
    let fetcher = ScriptedFetcher::new();
    fetcher.set("golang", Script::Items(vec![item("aaa111", "BAD a"), item("bbb222", "BAD b")]));
    let orch = orchestrator(&db, fetcher);

    let result = orch.run_sync_cycle(req("golang")).await;
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap_or_default().contains("persist"));
    assert_eq!(result.items_fetched, 2, "fetch counts survive a persist failure");
    assert_eq!(result.items_processed, 2);
    assert_eq!(result.items_stored, 0);
    assert_eq!(
        SqliteSourceRepo::new().get_watermark(&mut conn, "golang").unwrap(),
        None
    );
}

#[tokio::test]
async fn limit_resolution_prefers_request_then_config_then_default() {
    let (db, mut conn) = setup_db();
    let mut settings = SyncSettings::default();
    settings.default_limit = 40;

    let mut capped = SourceConfig::new("capped");
    capped.max_items = 25;
    SqliteSourceRepo::new().upsert_config(&mut conn, &capped).unwrap();
    SqliteSourceRepo::new()
        .upsert_config(&mut conn, &SourceConfig::new("uncapped"))
        .unwrap();

    let fetcher = ScriptedFetcher::new();
    let orch = orchestrator_with(&db, fetcher.clone(), settings);

    let since = ts(2024, 3, 1, 0, 0, 0);
    orch.run_sync_cycle(req("capped")).await;
    orch.run_sync_cycle(req("capped").with_limit(7).with_since(since))
        .await;
    orch.run_sync_cycle(req("uncapped")).await;
    orch.run_sync_cycle(req("unconfigured")).await;

    let capped_calls = fetcher.calls_for("capped");
    assert_eq!(capped_calls[0].limit, 25);
    assert_eq!(capped_calls[1].limit, 7);
    assert_eq!(capped_calls[1].since, since.timestamp());
    assert_eq!(fetcher.calls_for("uncapped")[0].limit, 40);
    assert_eq!(fetcher.calls_for("unconfigured")[0].limit, 40);
}

#[tokio::test]
async fn cancellation_fails_the_run_without_moving_the_watermark() {
    let (db, mut conn) = setup_db();
    let fetcher = ScriptedFetcher::new();
    fetcher.set("golang", Script::Hang);
    let orch = orchestrator(&db, fetcher);

    let result = orch
        .run_sync_cycle_until(req("golang"), tokio::time::sleep(Duration::from_millis(50)))
        .await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("run cancelled"));
    assert_eq!(
        SqliteSourceRepo::new().get_watermark(&mut conn, "golang").unwrap(),
        None
    );
}

#[tokio::test]
async fn run_timeout_is_enforced() {
    let (db, _conn) = setup_db();
    let mut settings = SyncSettings::default();
    settings.run_timeout_secs = Some(1);
    let fetcher = ScriptedFetcher::new();
    fetcher.set("golang", Script::Hang);
    let orch = orchestrator_with(&db, fetcher, settings);

    let result = orch.run_sync_cycle(req("golang")).await;
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap_or_default().contains("timed out"));
    assert!(result.duration() >= Duration::from_secs(1));
}

#[tokio::test]
async fn run_all_active_isolates_failures() {
    let (db, mut conn) = setup_db();
    let sources = SqliteSourceRepo::new();
    for (name, priority, enabled) in [
        ("alpha", 3, true),
        ("broken", 2, true),
        ("crashing", 1, true),
        ("disabled", 9, false),
    ] {
        let mut c = SourceConfig::new(name);
        c.priority = priority;
        c.enabled = enabled;
        sources.upsert_config(&mut conn, &c).unwrap();
    }

    let fetcher = ScriptedFetcher::new();
    fetcher.set("alpha", Script::Items(vec![item("alpha1", "A")]));
    fetcher.set("broken", Script::Status(500));
    fetcher.set("crashing", Script::Panic);
    fetcher.set("disabled", Script::Items(vec![item("never1", "N")]));
    let orch = orchestrator(&db, fetcher.clone());

    let results = orch.run_all_active().await.unwrap();
    let summary: Vec<_> = results
        .iter()
        .map(|r| (r.source_name.as_str(), r.success))
        .collect();
    assert_eq!(
        summary,
        vec![("alpha", true), ("broken", false), ("crashing", false)]
    );

    assert!(fetcher.calls_for("disabled").is_empty());
    assert!(sources.get_watermark(&mut conn, "alpha").unwrap().is_some());
    assert!(sources.get_watermark(&mut conn, "broken").unwrap().is_none());
    assert!(sources.get_watermark(&mut conn, "crashing").unwrap().is_none());
    assert_eq!(count(&mut conn, "records"), 1);
}
