use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nav_backup_core::naming::snapshot_filename;
use nav_backup_core::{BackupConfigUpdate, Category, Credentials, Frequency, Site};
use nav_backup_daemon::scheduler::run_scheduled_backup;
use nav_backup_daemon::{
    retention, BackupEngine, EngineError, EngineSettings, ScheduleState, Scheduler, Session,
};
use nav_backup_storage::sqlite_store::SqliteStore;
use nav_backup_storage::SiteStore;
use nav_backup_webdav::{Connector, MemoryRemote, RemoteEntry, RemoteTransport, TransportError};
use tokio::sync::Notify;

const URL: &str = "https://dav.example.com/remote.php/dav/files/alice";

struct Fixture {
    _tmp: tempfile::TempDir,
    store: Arc<dyn SiteStore>,
    remote: MemoryRemote,
    engine: Arc<BackupEngine>,
}

fn fixture() -> Fixture {
    fixture_with(MemoryRemote::new(), EngineSettings::default())
}

fn fixture_with(remote: MemoryRemote, settings: EngineSettings) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let store: Arc<dyn SiteStore> = Arc::new(SqliteStore::new(tmp.path().join("nav.db")).unwrap());
    let engine = Arc::new(BackupEngine::new(
        store.clone(),
        Arc::new(remote.clone()),
        settings,
    ));
    Fixture {
        _tmp: tmp,
        store,
        remote,
        engine,
    }
}

async fn configure(f: &Fixture) {
    f.engine
        .configs()
        .save(&BackupConfigUpdate {
            url: Some(URL.into()),
            username: Some("alice".into()),
            password: Some("secret".into()),
            frequency: None,
        })
        .await
        .unwrap();
}

fn category(id: i64, sort_order: i64) -> Category {
    Category {
        id,
        name: format!("Category {id}"),
        icon: Some("star".into()),
        color: Some("#123456".into()),
        sort_order: Some(sort_order),
    }
}

fn site(id: i64, category_id: i64) -> Site {
    Site {
        id,
        name: format!("Site {id}"),
        url: format!("https://site{id}.example.com"),
        description: Some(format!("site number {id}")),
        logo: None,
        category_id: Some(category_id),
        sort_order: Some(id),
    }
}

async fn seed(f: &Fixture) {
    f.store
        .replace_records(&[category(1, 2), category(2, 1), category(3, 0)], &[site(10, 1)])
        .await
        .unwrap();
    f.store.put_setting("site_title", "My Nav").await.unwrap();
    f.store.put_setting("theme", "dark").await.unwrap();
    f.store.put_setting("admin_password", "admin-secret").await.unwrap();
}

fn today_filename() -> String {
    snapshot_filename(Utc::now().date_naive())
}

fn days_ago_filename(days: i64) -> String {
    snapshot_filename(Utc::now().date_naive() - chrono::Duration::days(days))
}

fn creds() -> Credentials {
    Credentials {
        url: URL.into(),
        username: "alice".into(),
        password: "secret".into(),
    }
}

#[tokio::test]
async fn backup_uploads_todays_snapshot_to_backup_dir() {
    let f = fixture();
    configure(&f).await;
    seed(&f).await;

    let outcome = f.engine.perform_backup().await.unwrap();
    assert_eq!(outcome.filename, today_filename());
    assert!(outcome.filename.starts_with("nav-dashboard-backup-"));
    assert!(outcome.filename.ends_with(".json"));
    assert_eq!(outcome.filename.len(), "nav-dashboard-backup-".len() + 8 + ".json".len());
    assert_eq!(outcome.path, format!("/nav-backup/{}", outcome.filename));
    assert!(f.remote.has_dir("/nav-backup"));

    let raw = f.remote.file(&outcome.path).expect("snapshot uploaded");
    assert_eq!(raw.len() as u64, outcome.size_bytes);
    let doc: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(doc["version"], "1.0");
    assert!(doc["exportTime"].as_str().unwrap().ends_with('Z'));
    let category_ids: Vec<i64> = doc["categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect();
    assert_eq!(category_ids, vec![3, 2, 1]);
    assert_eq!(doc["sites"].as_array().unwrap().len(), 1);
    assert_eq!(doc["settings"]["site_title"], "My Nav");
    assert_eq!(doc["settings"]["webdav_url"], URL);
    assert!(doc["settings"].get("admin_password").is_none());
    assert!(doc["settings"].get("webdav_password").is_none());

    let cfg = f.engine.configs().get().await.unwrap();
    assert_eq!(cfg.last_backup_status.as_deref(), Some("success"));
    assert!(cfg.last_backup_time.is_some());
}

#[tokio::test]
async fn second_backup_same_day_overwrites() {
    let f = fixture();
    configure(&f).await;
    seed(&f).await;

    let first = f.engine.perform_backup().await.unwrap();
    f.store.put_setting("site_title", "Renamed").await.unwrap();
    let second = f.engine.perform_backup().await.unwrap();

    assert_eq!(first.filename, second.filename);
    assert_ne!(first.content_hash, second.content_hash);
    let snapshots: Vec<String> = f
        .remote
        .paths()
        .into_iter()
        .filter(|p| p.contains("nav-dashboard-backup-"))
        .collect();
    assert_eq!(snapshots, vec![second.path.clone()]);
    let doc: serde_json::Value =
        serde_json::from_slice(&f.remote.file(&second.path).unwrap()).unwrap();
    assert_eq!(doc["settings"]["site_title"], "Renamed");
}

#[tokio::test]
async fn backup_falls_back_to_root_when_directory_upload_fails() {
    let f = fixture();
    configure(&f).await;
    f.remote.fail_writes_under("/nav-backup/");

    let outcome = f.engine.perform_backup().await.unwrap();
    assert_eq!(outcome.path, format!("/{}", today_filename()));
    assert!(f.remote.file(&outcome.path).is_some());
    assert_eq!(
        f.engine.configs().get().await.unwrap().last_backup_status.as_deref(),
        Some("success")
    );
}

#[tokio::test]
async fn directory_creation_failure_is_not_fatal() {
    let f = fixture();
    configure(&f).await;
    f.remote.fail_mkdir();

    let outcome = f.engine.perform_backup().await.unwrap();
    assert!(!f.remote.has_dir("/nav-backup"));
    assert_eq!(outcome.path, format!("/{}", today_filename()));
}

#[tokio::test]
async fn backup_fails_when_both_uploads_fail() {
    let f = fixture();
    configure(&f).await;
    f.remote.fail_writes_under("/");

    let err = f.engine.perform_backup().await.unwrap_err();
    assert!(matches!(err, EngineError::UploadFailed(_)));
    assert!(f.remote.paths().is_empty());
    assert_eq!(f.engine.configs().get().await.unwrap().last_backup_status, None);
}

#[tokio::test]
async fn backup_requires_complete_config() {
    let f = fixture();
    f.engine
        .configs()
        .save(&BackupConfigUpdate {
            url: Some(URL.into()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(matches!(
        f.engine.perform_backup().await.unwrap_err(),
        EngineError::ConfigIncomplete
    ));
    assert!(matches!(
        f.engine.list_backups().await.unwrap_err(),
        EngineError::ConfigIncomplete
    ));
    assert!(matches!(
        f.engine.restore("x.json", None).await.unwrap_err(),
        EngineError::ConfigIncomplete
    ));
}

#[tokio::test]
async fn backup_reports_unavailable_transport() {
    let f = fixture();
    configure(&f).await;
    f.remote.refuse_connections();

    assert!(matches!(
        f.engine.perform_backup().await.unwrap_err(),
        EngineError::TransportUnavailable(_)
    ));
}

#[tokio::test]
async fn backup_retires_old_snapshots_after_upload() {
    let f = fixture();
    configure(&f).await;
    let old = days_ago_filename(30);
    f.remote.put_file(&format!("/nav-backup/{old}"), "{}");

    f.engine.perform_backup().await.unwrap();
    assert!(f.remote.file(&format!("/nav-backup/{old}")).is_none());
    assert!(f.remote.file(&format!("/nav-backup/{}", today_filename())).is_some());
}

#[tokio::test]
async fn cleanup_scans_directory_and_root() {
    let remote = MemoryRemote::new();
    let old = days_ago_filename(10);
    let recent = days_ago_filename(3);
    for dir in ["/nav-backup", ""] {
        remote.put_file(&format!("{dir}/{old}"), "{}");
        remote.put_file(&format!("{dir}/{recent}"), "{}");
    }
    remote.put_file("/notes-20000101.json", "{}");

    let session = Session::open(&remote, &creds(), Duration::from_secs(5)).unwrap();
    let removed = retention::cleanup(&session, 7).await;

    assert_eq!(removed, 2);
    let mut left = remote.paths();
    left.sort();
    let mut expected = vec![
        format!("/nav-backup/{recent}"),
        format!("/{recent}"),
        "/notes-20000101.json".to_owned(),
    ];
    expected.sort();
    assert_eq!(left, expected);
}

#[tokio::test]
async fn cleanup_continues_past_failed_deletes() {
    let remote = MemoryRemote::new();
    let first = days_ago_filename(20);
    let second = days_ago_filename(21);
    remote.put_file(&format!("/nav-backup/{first}"), "{}");
    remote.put_file(&format!("/nav-backup/{second}"), "{}");
    remote.fail_delete(&format!("/nav-backup/{second}"));

    let session = Session::open(&remote, &creds(), Duration::from_secs(5)).unwrap();
    assert_eq!(retention::cleanup(&session, 7).await, 1);
    assert!(remote.file(&format!("/nav-backup/{second}")).is_some());
}

#[tokio::test]
async fn cleanup_with_unbounded_window_keeps_everything() {
    let remote = MemoryRemote::new();
    let ancient = days_ago_filename(9000);
    remote.put_file(&format!("/nav-backup/{ancient}"), "{}");

    let session = Session::open(&remote, &creds(), Duration::from_secs(5)).unwrap();
    assert_eq!(retention::cleanup(&session, u32::MAX).await, 0);
    assert!(remote.file(&format!("/nav-backup/{ancient}")).is_some());
}

#[tokio::test]
async fn listing_merges_locations_newest_first() {
    let f = fixture();
    configure(&f).await;
    f.remote.put_file("/nav-backup/nav-dashboard-backup-20240115.json", "{}");
    f.remote.put_file("/nav-backup/nav-dashboard-backup-20240210.json", "{}");
    f.remote.put_file("/nav-dashboard-backup-20240301.json", "{}");
    f.remote.put_file("/nav-dashboard-backup-latest.json", "{}");
    f.remote.put_file("/notes.json", "{}");

    let files = f.engine.list_backups().await.unwrap();
    let paths: Vec<&str> = files.iter().map(|b| b.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "/nav-dashboard-backup-20240301.json",
            "/nav-backup/nav-dashboard-backup-20240210.json",
            "/nav-backup/nav-dashboard-backup-20240115.json",
        ]
    );
    assert_eq!(files[0].filename, "nav-dashboard-backup-20240301.json");
    assert_eq!(files[0].size, 2);
}

#[tokio::test]
async fn listing_skips_unreadable_location() {
    let f = fixture();
    configure(&f).await;
    f.remote.put_file("/nav-backup/nav-dashboard-backup-20240115.json", "{}");
    f.remote.put_file("/nav-dashboard-backup-20240301.json", "{}");
    f.remote.fail_listing("/nav-backup");

    let files = f.engine.list_backups().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "/nav-dashboard-backup-20240301.json");
}

fn restore_document() -> String {
    serde_json::json!({
        "exportTime": "2024-03-01T03:00:00.000Z",
        "version": "1.0",
        "categories": [
            {"id": 7, "name": "Dev", "icon": "code", "color": "#000000", "sort_order": 1},
            {"id": 8, "name": "News"}
        ],
        "sites": [
            {"id": 1, "name": "a", "url": "https://a.example", "category_id": 7, "sort_order": 0},
            {"id": 2, "name": "b", "url": "https://b.example", "category_id": 7, "sort_order": 1},
            {"id": 3, "name": "c", "url": "https://c.example", "category_id": 8, "sort_order": 2},
            {"id": 4, "name": "d", "url": "https://d.example", "category_id": 8, "sort_order": 3},
            {"id": 5, "name": "e", "url": "https://e.example", "category_id": 8}
        ],
        "settings": {
            "site_title": "Restored",
            "admin_password": "from-backup",
            "webdav_password": "from-backup"
        }
    })
    .to_string()
}

#[tokio::test]
async fn restore_replaces_records_and_merges_settings() {
    let f = fixture();
    configure(&f).await;
    seed(&f).await;
    f.remote.put_file(
        "/nav-backup/nav-dashboard-backup-20240301.json",
        restore_document(),
    );

    let outcome = f
        .engine
        .restore("nav-dashboard-backup-20240301.json", None)
        .await
        .unwrap();
    assert_eq!((outcome.categories, outcome.sites), (2, 5));
    assert_eq!(outcome.settings, 1);

    let categories = f.store.list_categories().await.unwrap();
    assert_eq!(categories.len(), 2);
    let news = categories.iter().find(|c| c.id == 8).unwrap();
    assert_eq!(news.color.as_deref(), Some("#ff9a56"));
    assert_eq!(news.sort_order, Some(0));
    assert_eq!(news.icon.as_deref(), Some(""));

    let sites = f.store.list_sites().await.unwrap();
    assert_eq!(sites.len(), 5);
    assert!(sites.iter().all(|s| s.description.as_deref() == Some("")));

    assert_eq!(
        f.store.get_setting("site_title").await.unwrap().as_deref(),
        Some("Restored")
    );
    assert_eq!(f.store.get_setting("theme").await.unwrap().as_deref(), Some("dark"));
    assert_eq!(
        f.store.get_setting("admin_password").await.unwrap().as_deref(),
        Some("admin-secret")
    );
    assert_eq!(
        f.store.get_setting("webdav_password").await.unwrap().as_deref(),
        Some("secret")
    );
}

#[tokio::test]
async fn restore_rejects_document_without_sites() {
    let f = fixture();
    configure(&f).await;
    seed(&f).await;
    f.remote.put_file(
        "/nav-backup/broken.json",
        r#"{"version": "1.0", "categories": [{"id": 1, "name": "x"}], "settings": {"site_title": "nope"}}"#,
    );

    let err = f.engine.restore("broken.json", None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidFormat(_)));
    assert_eq!(f.store.list_categories().await.unwrap().len(), 3);
    assert_eq!(f.store.list_sites().await.unwrap().len(), 1);
    assert_eq!(
        f.store.get_setting("site_title").await.unwrap().as_deref(),
        Some("My Nav")
    );
}

#[tokio::test]
async fn restore_finds_legacy_root_snapshot() {
    let f = fixture();
    configure(&f).await;
    f.remote
        .put_file("/nav-dashboard-backup-20240101.json", restore_document());

    let outcome = f
        .engine
        .restore("nav-dashboard-backup-20240101.json", None)
        .await
        .unwrap();
    assert_eq!(outcome.sites, 5);
}

#[tokio::test]
async fn restore_uses_only_the_explicit_path() {
    let f = fixture();
    configure(&f).await;
    f.remote.put_file("/archive/custom.json", restore_document());
    f.remote.put_file("/nav-backup/custom.json", "not json");

    let outcome = f
        .engine
        .restore("custom.json", Some("/archive/custom.json"))
        .await
        .unwrap();
    assert_eq!(outcome.categories, 2);

    let err = f
        .engine
        .restore("custom.json", Some("/elsewhere/custom.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BackupNotFound(_)));
}

#[tokio::test]
async fn restore_reports_missing_backup() {
    let f = fixture();
    configure(&f).await;
    let err = f
        .engine
        .restore("nav-dashboard-backup-19990101.json", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BackupNotFound(name) if name.contains("19990101")));
}

#[tokio::test]
async fn connection_test_classifies_rejected_credentials() {
    let f = fixture();
    f.remote.require_credentials("alice", "secret");

    let bad = f.engine.test_connection(URL, "alice", "wrong").await;
    assert!(!bad.success);
    assert!(bad.error.unwrap().contains("check username and password"));

    let good = f.engine.test_connection(URL, "alice", "secret").await;
    assert!(good.success);
    assert!(good.error.is_none());
}

#[tokio::test]
async fn connection_test_tolerates_malformed_responses() {
    let f = fixture();
    f.remote.answer_malformed();
    let check = f.engine.test_connection(URL, "alice", "secret").await;
    assert!(check.success);
    assert!(check.warning.is_some());
}

#[tokio::test]
async fn connection_test_reports_refused_connections() {
    let f = fixture();
    f.remote.refuse_connections();
    let check = f.engine.test_connection(URL, "alice", "secret").await;
    assert!(!check.success);
    assert_eq!(
        check.error.as_deref(),
        Some("request failed: connection refused")
    );
}

#[tokio::test]
async fn scheduled_failure_keeps_last_success_time() {
    let f = fixture();
    configure(&f).await;
    let first = f.engine.perform_backup().await.unwrap();

    f.remote.fail_writes_under("/");
    let outcome = run_scheduled_backup(&f.engine, &Frequency::Daily).await;
    assert!(outcome.is_none());

    let cfg = f.engine.configs().get().await.unwrap();
    let status = cfg.last_backup_status.unwrap();
    assert!(status.starts_with("failed: upload failed"), "{status}");
    let kept = cfg.last_backup_time.unwrap();
    assert_eq!(kept.timestamp_millis(), first.time.timestamp_millis());
}

#[tokio::test]
async fn scheduler_follows_stored_frequency() {
    let f = fixture();
    let scheduler = Scheduler::new(f.engine.clone());
    assert_eq!(scheduler.reconfigure().await.unwrap(), ScheduleState::Unscheduled);

    for (frequency, expected) in [
        (Frequency::Daily, ScheduleState::Scheduled(Frequency::Daily)),
        (Frequency::Weekly, ScheduleState::Scheduled(Frequency::Weekly)),
        (Frequency::Unknown("hourly".into()), ScheduleState::Unscheduled),
        (Frequency::Off, ScheduleState::Unscheduled),
    ] {
        f.engine
            .configs()
            .save(&BackupConfigUpdate {
                frequency: Some(frequency),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(scheduler.reconfigure().await.unwrap(), expected);
        assert_eq!(scheduler.state().await, expected);
    }

    f.engine
        .configs()
        .save(&BackupConfigUpdate {
            frequency: Some(Frequency::Daily),
            ..Default::default()
        })
        .await
        .unwrap();
    scheduler.reconfigure().await.unwrap();
    scheduler.shutdown().await;
    assert_eq!(scheduler.state().await, ScheduleState::Unscheduled);
}

/// Remote that accepts sessions but never answers.
struct Hanging;

#[async_trait::async_trait]
impl RemoteTransport for Hanging {
    async fn exists(&self, _path: &str) -> Result<bool, TransportError> {
        std::future::pending().await
    }
    async fn create_directory(&self, _path: &str) -> Result<(), TransportError> {
        std::future::pending().await
    }
    async fn list(&self, _path: &str) -> Result<Vec<RemoteEntry>, TransportError> {
        std::future::pending().await
    }
    async fn write(&self, _path: &str, _content: Vec<u8>, _overwrite: bool) -> Result<(), TransportError> {
        std::future::pending().await
    }
    async fn read_text(&self, _path: &str) -> Result<String, TransportError> {
        std::future::pending().await
    }
    async fn delete(&self, _path: &str) -> Result<(), TransportError> {
        std::future::pending().await
    }
}

struct HangingConnector;

impl Connector for HangingConnector {
    fn connect(&self, _credentials: &Credentials) -> Result<Box<dyn RemoteTransport>, TransportError> {
        Ok(Box::new(Hanging))
    }
}

#[tokio::test]
async fn hung_remote_times_out_instead_of_stalling() {
    let tmp = tempfile::tempdir().unwrap();
    let store: Arc<dyn SiteStore> = Arc::new(SqliteStore::new(tmp.path().join("nav.db")).unwrap());
    let engine = BackupEngine::new(
        store,
        Arc::new(HangingConnector),
        EngineSettings {
            keep_days: 7,
            transport_timeout: Duration::from_millis(50),
        },
    );
    engine
        .configs()
        .save(&BackupConfigUpdate {
            url: Some(URL.into()),
            username: Some("alice".into()),
            password: Some("secret".into()),
            frequency: None,
        })
        .await
        .unwrap();

    let err = engine.perform_backup().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::UploadFailed(TransportError::Timeout { .. })
    ));
    assert!(engine.list_backups().await.unwrap().is_empty());
}

/// Remote whose first upload waits until the test releases it.
#[derive(Clone)]
struct GatedRemote {
    inner: MemoryRemote,
    gated: Arc<AtomicBool>,
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl GatedRemote {
    fn new() -> Self {
        Self {
            inner: MemoryRemote::new(),
            gated: Arc::new(AtomicBool::new(true)),
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }
}

struct GatedSession {
    inner: Box<dyn RemoteTransport>,
    remote: GatedRemote,
}

#[async_trait::async_trait]
impl RemoteTransport for GatedSession {
    async fn exists(&self, path: &str) -> Result<bool, TransportError> {
        self.inner.exists(path).await
    }
    async fn create_directory(&self, path: &str) -> Result<(), TransportError> {
        self.inner.create_directory(path).await
    }
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, TransportError> {
        self.inner.list(path).await
    }
    async fn write(&self, path: &str, content: Vec<u8>, overwrite: bool) -> Result<(), TransportError> {
        if self.remote.gated.swap(false, Ordering::SeqCst) {
            self.remote.started.notify_one();
            self.remote.release.notified().await;
        }
        self.inner.write(path, content, overwrite).await
    }
    async fn read_text(&self, path: &str) -> Result<String, TransportError> {
        self.inner.read_text(path).await
    }
    async fn delete(&self, path: &str) -> Result<(), TransportError> {
        self.inner.delete(path).await
    }
}

impl Connector for GatedRemote {
    fn connect(&self, credentials: &Credentials) -> Result<Box<dyn RemoteTransport>, TransportError> {
        Ok(Box::new(GatedSession {
            inner: self.inner.connect(credentials)?,
            remote: self.clone(),
        }))
    }
}

#[tokio::test(start_paused = true)]
async fn reconfigure_lets_a_running_backup_finish() {
    let tmp = tempfile::tempdir().unwrap();
    let store: Arc<dyn SiteStore> = Arc::new(SqliteStore::new(tmp.path().join("nav.db")).unwrap());
    let remote = GatedRemote::new();
    let engine = Arc::new(BackupEngine::new(
        store,
        Arc::new(remote.clone()),
        EngineSettings::default(),
    ));
    engine
        .configs()
        .save(&BackupConfigUpdate {
            url: Some(URL.into()),
            username: Some("alice".into()),
            password: Some("secret".into()),
            frequency: Some(Frequency::Daily),
        })
        .await
        .unwrap();

    let scheduler = Scheduler::new(engine.clone());
    scheduler.reconfigure().await.unwrap();

    // The paused clock jumps to 03:00 and the upload blocks in flight.
    remote.started.notified().await;
    engine
        .configs()
        .save(&BackupConfigUpdate {
            frequency: Some(Frequency::Off),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(scheduler.reconfigure().await.unwrap(), ScheduleState::Unscheduled);
    remote.release.notify_one();

    let mut status = None;
    for _ in 0..100 {
        status = engine.configs().get().await.unwrap().last_backup_status;
        if status.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status.as_deref(), Some("success"));
    assert_eq!(remote.inner.paths().len(), 1);

    scheduler.shutdown().await;
}
