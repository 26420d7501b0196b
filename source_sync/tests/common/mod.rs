#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text};
use source_ingestor::{
    models::{raw_item::RawItem, request_params::FetchParams},
    providers::{FetchError, UnavailableError, UpstreamFetcher},
};
use source_sync::{
    config::SyncSettings,
    db::{Database, connection, migrate},
    orchestrator::SyncOrchestrator,
};
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}
#[derive(QueryableByName)]
struct Cnt {
    #[diesel(sql_type = BigInt)]
    c: i64,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

impl TestDb {
    pub fn database(&self) -> Database {
        Database::new(&self.path).expect("database handle")
    }
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_all(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal");

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

pub fn count(conn: &mut SqliteConnection, table: &str) -> i64 {
    let q = format!("SELECT COUNT(*) AS c FROM {table}");
    diesel::sql_query(q).get_result::<Cnt>(conn).unwrap().c
}

/// Make the store refuse any record whose title starts with `prefix`.
pub fn reject_titles_starting_with(conn: &mut SqliteConnection, prefix: &str) {
    use diesel::connection::SimpleConnection;
    conn.batch_execute(&format!(
        "CREATE TRIGGER reject_insert BEFORE INSERT ON records
         WHEN NEW.title LIKE '{prefix}%'
         BEGIN SELECT RAISE(ABORT, 'rejected by test trigger'); END;
         CREATE TRIGGER reject_update BEFORE UPDATE ON records
         WHEN NEW.title LIKE '{prefix}%'
         BEGIN SELECT RAISE(ABORT, 'rejected by test trigger'); END;"
    ))
    .unwrap();
}

pub fn ts(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
}

pub fn item(id: &str, title: &str) -> RawItem {
    RawItem {
        id: Some(id.to_string()),
        title: Some(title.to_string()),
        score: Some(1),
        created_at: Some(ts(2024, 5, 1, 12, 0, 0)),
        ..Default::default()
    }
}

/// What a scripted upstream does for one source.
#[derive(Clone)]
pub enum Script {
    Items(Vec<RawItem>),
    Status(u16),
    Panic,
    Hang,
}

/// In-memory upstream that answers per source and records every request.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<FetchParams>>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, source: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(source.to_string(), script);
    }

    pub fn calls(&self) -> Vec<FetchParams> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, source: &str) -> Vec<FetchParams> {
        self.calls()
            .into_iter()
            .filter(|p| p.source == source)
            .collect()
    }
}

#[async_trait]
impl UpstreamFetcher for ScriptedFetcher {
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<RawItem>, FetchError> {
        self.calls.lock().unwrap().push(params.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&params.source)
            .cloned()
            .unwrap_or(Script::Items(vec![]));

        match script {
            Script::Items(items) => Ok(items),
            Script::Status(status) => Err(FetchError::Status {
                status,
                body: "scripted failure".into(),
            }),
            Script::Panic => panic!("scripted panic for {}", params.source),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(vec![])
            }
        }
    }

    async fn health_check(&self) -> Result<(), UnavailableError> {
        Ok(())
    }
}

pub fn orchestrator(db: &TestDb, fetcher: Arc<ScriptedFetcher>) -> SyncOrchestrator {
    orchestrator_with(db, fetcher, SyncSettings::default())
}

pub fn orchestrator_with(
    db: &TestDb,
    fetcher: Arc<ScriptedFetcher>,
    mut settings: SyncSettings,
) -> SyncOrchestrator {
    settings.database_url = db.path.clone();
    SyncOrchestrator::new(db.database(), fetcher, settings)
}
