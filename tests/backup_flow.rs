mod common;

use async_trait::async_trait;
use common::mocks::{MockLastBackup, MockLocalStore};
use common::{memory_change_log, test_registry};
use pagevault::application::ports::{
    BackupBackend, BackupOptions, ChangeLogStore, LastBackupStore, TracingErrorReporter,
};
use pagevault::application::services::BackupProcedure;
use pagevault::domain::entities::{BackupEvent, BackupState, ObjectChange};
use pagevault::domain::value_objects::ChangeOperation;
use pagevault::infrastructure::backends::MemoryBackend;
use pagevault::shared::config::BackupConfig;
use pagevault::{AppError, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::Semaphore;

fn fast_config() -> BackupConfig {
    BackupConfig {
        start_delay_ms: 0,
        cancel_settle_delay_ms: 0,
        ..BackupConfig::default()
    }
}

fn procedure(
    local: Arc<MockLocalStore>,
    change_log: Arc<dyn ChangeLogStore>,
    last_backup: Arc<MockLastBackup>,
    backend: Arc<dyn BackupBackend>,
    config: BackupConfig,
) -> Arc<BackupProcedure> {
    Arc::new(BackupProcedure::new(
        local,
        change_log,
        last_backup,
        backend,
        Arc::new(TracingErrorReporter),
        config,
    ))
}

async fn wait_terminal(events: &mut broadcast::Receiver<BackupEvent>) -> BackupEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await.unwrap() {
                BackupEvent::Info(_) => continue,
                terminal => return terminal,
            }
        }
    })
    .await
    .expect("backup did not finish in time")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn uploaded_changes(change_sets: &std::collections::BTreeMap<String, Value>) -> Vec<Value> {
    change_sets
        .values()
        .flat_map(|payload| {
            payload["changes"]
                .as_array()
                .cloned()
                .unwrap_or_default()
        })
        .collect()
}

/// Upload gate releasing one batch per added permit.
struct GatedUploads {
    inner: MemoryBackend,
    gate: Semaphore,
}

impl GatedUploads {
    fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            gate: Semaphore::new(0),
        }
    }
}

#[async_trait]
impl BackupBackend for GatedUploads {
    async fn is_connected(&self) -> bool {
        true
    }

    async fn is_authenticated(&self) -> bool {
        true
    }

    async fn backup_changes(
        &self,
        changes: &[ObjectChange],
        schema_version: u32,
        options: &BackupOptions,
    ) -> Result<()> {
        self.gate.acquire().await.unwrap().forget();
        self.inner
            .backup_changes(changes, schema_version, options)
            .await
    }

    async fn list_objects(&self, collection: &str) -> Result<Vec<String>> {
        self.inner.list_objects(collection).await
    }

    async fn retrieve_object(&self, collection: &str, id: &str) -> Result<Value> {
        self.inner.retrieve_object(collection, id).await
    }
}

struct FailingBackend;

#[async_trait]
impl BackupBackend for FailingBackend {
    async fn is_connected(&self) -> bool {
        true
    }

    async fn is_authenticated(&self) -> bool {
        true
    }

    async fn backup_changes(
        &self,
        _changes: &[ObjectChange],
        _schema_version: u32,
        _options: &BackupOptions,
    ) -> Result<()> {
        Err(AppError::Backend("upload rejected".to_string()))
    }

    async fn list_objects(&self, _collection: &str) -> Result<Vec<String>> {
        Ok(vec![])
    }

    async fn retrieve_object(&self, collection: &str, id: &str) -> Result<Value> {
        Err(AppError::NotFound(format!("{collection}/{id}")))
    }
}

#[tokio::test]
async fn first_run_seeds_creates_for_every_backed_up_object() {
    let local = Arc::new(MockLocalStore::new(test_registry()));
    local.insert("pages", json!({"url": "a.com", "title": "A"}));
    local.insert("pages", json!({"url": "b.com", "title": "B"}));
    local.insert("eventLog", json!({"id": 1, "kind": "click"}));

    let change_log = Arc::new(memory_change_log().await);
    // A stale pre-seed entry must be wiped before seeding.
    change_log
        .register_change("pages", &json!("stale.com"), ChangeOperation::Delete)
        .await
        .unwrap();

    let last_backup = Arc::new(MockLastBackup::new());
    let backend = Arc::new(MemoryBackend::new());
    let backup = procedure(
        Arc::clone(&local),
        change_log.clone(),
        Arc::clone(&last_backup),
        backend.clone(),
        fast_config(),
    );

    let mut events = backup.subscribe();
    assert!(backup.run());
    assert!(matches!(wait_terminal(&mut events).await, BackupEvent::Success));

    let changes = uploaded_changes(&backend.objects("change-sets").await);
    let mut pks: Vec<&str> = changes
        .iter()
        .map(|c| c["objectPk"].as_str().unwrap())
        .collect();
    pks.sort();
    assert_eq!(pks, vec!["a.com", "b.com"]);
    assert!(changes
        .iter()
        .all(|c| c["collection"] == json!("pages") && c["operation"] == json!("create")));

    assert!(change_log.fetch_changes(10).await.unwrap().is_empty());
    assert!(last_backup.last_backup_time().await.unwrap().is_some());
    assert!(last_backup.last_backup_finish_time().await.unwrap().is_some());
}

#[tokio::test]
async fn incremental_run_hydrates_current_state_and_strips_derived_fields() {
    let local = Arc::new(MockLocalStore::new(test_registry()));
    local.insert(
        "pages",
        json!({
            "url": "a.com",
            "title": "Current title",
            "terms": ["old"],
            "title_terms": ["current"],
            "screenshot": "data:image/png;base64,AQID",
        }),
    );

    let change_log = Arc::new(memory_change_log().await);
    change_log
        .register_change("pages", &json!("a.com"), ChangeOperation::Update)
        .await
        .unwrap();
    change_log
        .register_change("pages", &json!("gone.com"), ChangeOperation::Delete)
        .await
        .unwrap();

    let last_backup = Arc::new(MockLastBackup::with_last_backup(1));
    let backend = Arc::new(MemoryBackend::new());
    let backup = procedure(
        Arc::clone(&local),
        change_log.clone(),
        Arc::clone(&last_backup),
        backend.clone(),
        fast_config(),
    );

    let mut events = backup.subscribe();
    assert!(backup.run());
    assert!(matches!(wait_terminal(&mut events).await, BackupEvent::Success));

    let changes = uploaded_changes(&backend.objects("change-sets").await);
    assert_eq!(changes.len(), 2);

    let update = changes
        .iter()
        .find(|c| c["operation"] == json!("update"))
        .unwrap();
    let object = &update["object"];
    assert_eq!(object["title"], json!("Current title"));
    assert!(object.get("terms").is_none());
    assert!(object.get("title_terms").is_none());
    // Blob travels via the image payload, not the change-set.
    assert!(object.get("screenshot").is_none());
    let images = backend.objects("images").await;
    assert_eq!(images.len(), 1);

    let delete = changes
        .iter()
        .find(|c| c["operation"] == json!("delete"))
        .unwrap();
    assert!(delete.get("object").is_none());
}

#[tokio::test]
async fn run_without_new_changes_uploads_nothing() {
    let local = Arc::new(MockLocalStore::new(test_registry()));
    local.insert("pages", json!({"url": "a.com"}));

    let change_log = Arc::new(memory_change_log().await);
    change_log
        .register_change("pages", &json!("a.com"), ChangeOperation::Create)
        .await
        .unwrap();

    let backend = Arc::new(MemoryBackend::new());
    let backup = procedure(
        local,
        change_log,
        Arc::new(MockLastBackup::with_last_backup(1)),
        backend.clone(),
        fast_config(),
    );

    let mut events = backup.subscribe();
    assert!(backup.run());
    assert!(matches!(wait_terminal(&mut events).await, BackupEvent::Success));
    assert_eq!(backend.objects("change-sets").await.len(), 1);

    // The ledger is drained, so a second run has nothing to stream.
    assert!(backup.run());
    assert!(matches!(wait_terminal(&mut events).await, BackupEvent::Success));
    assert_eq!(backend.objects("change-sets").await.len(), 1);
}

#[tokio::test]
async fn second_run_is_rejected_while_active() {
    let local = Arc::new(MockLocalStore::new(test_registry()));
    let change_log = Arc::new(memory_change_log().await);
    change_log
        .register_change("pages", &json!("a.com"), ChangeOperation::Create)
        .await
        .unwrap();

    let backend = Arc::new(GatedUploads::new());
    let backup = procedure(
        local,
        change_log,
        Arc::new(MockLastBackup::with_last_backup(1)),
        backend.clone(),
        fast_config(),
    );

    let mut events = backup.subscribe();
    assert!(backup.run());
    assert!(!backup.run());

    backend.gate.add_permits(1);
    assert!(matches!(wait_terminal(&mut events).await, BackupEvent::Success));
    assert!(backup.run());
    backend.gate.add_permits(1);
}

#[tokio::test]
async fn pause_holds_the_next_batch_until_resume() {
    let local = Arc::new(MockLocalStore::new(test_registry()));
    local.insert("pages", json!({"url": "a.com"}));
    local.insert("pages", json!({"url": "b.com"}));

    let change_log = Arc::new(memory_change_log().await);
    change_log
        .register_change("pages", &json!("a.com"), ChangeOperation::Create)
        .await
        .unwrap();
    change_log
        .register_change("pages", &json!("b.com"), ChangeOperation::Create)
        .await
        .unwrap();

    let backend = Arc::new(GatedUploads::new());
    let config = BackupConfig {
        batch_size: 1,
        ..fast_config()
    };
    let backup = procedure(
        local,
        change_log,
        Arc::new(MockLastBackup::with_last_backup(1)),
        backend.clone(),
        config,
    );

    let mut events = backup.subscribe();
    assert!(backup.run());

    wait_until(|| backup.progress().state == BackupState::Synching).await;
    backup.pause();
    assert_eq!(backup.progress().state, BackupState::Paused);

    // Let the in-flight batch through; the pause gate must still hold the
    // second one back.
    backend.gate.add_permits(2);
    tokio::time::timeout(Duration::from_secs(5), async {
        while backend.inner.objects("change-sets").await.len() != 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first batch not uploaded in time");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.inner.objects("change-sets").await.len(), 1);

    backup.resume();
    assert!(matches!(wait_terminal(&mut events).await, BackupEvent::Success));
    assert_eq!(backend.inner.objects("change-sets").await.len(), 2);
}

#[tokio::test]
async fn cancel_stops_before_the_next_batch_and_keeps_remaining_entries() {
    let local = Arc::new(MockLocalStore::new(test_registry()));
    for url in ["a.com", "b.com", "c.com"] {
        local.insert("pages", json!({"url": url}));
    }

    let change_log = Arc::new(memory_change_log().await);
    for url in ["a.com", "b.com", "c.com"] {
        change_log
            .register_change("pages", &json!(url), ChangeOperation::Create)
            .await
            .unwrap();
    }

    let backend = Arc::new(GatedUploads::new());
    let config = BackupConfig {
        batch_size: 1,
        ..fast_config()
    };
    let last_backup = Arc::new(MockLastBackup::with_last_backup(1));
    let backup = procedure(
        local,
        change_log.clone(),
        Arc::clone(&last_backup),
        backend.clone(),
        config,
    );

    assert!(backup.run());
    backend.gate.add_permits(1);
    wait_until(|| backup.progress().processed_changes == 1).await;

    // The second batch is blocked in the backend; cancellation lets it
    // finish, then stops before the third.
    let canceller = Arc::clone(&backup);
    let cancelled = tokio::spawn(async move { canceller.cancel().await });
    backend.gate.add_permits(2);
    cancelled.await.unwrap();

    assert!(!backup.running());
    assert_eq!(backend.inner.objects("change-sets").await.len(), 2);
    assert_eq!(change_log.fetch_changes(10).await.unwrap().len(), 1);
    // A cancelled run never advances the recorded backup time.
    assert_eq!(last_backup.last_backup_time().await.unwrap(), Some(1));
}

#[tokio::test]
async fn failed_upload_emits_fail_and_keeps_the_ledger() {
    let local = Arc::new(MockLocalStore::new(test_registry()));
    local.insert("pages", json!({"url": "a.com"}));

    let change_log = Arc::new(memory_change_log().await);
    change_log
        .register_change("pages", &json!("a.com"), ChangeOperation::Create)
        .await
        .unwrap();

    let last_backup = Arc::new(MockLastBackup::with_last_backup(1));
    let backup = procedure(
        local,
        change_log.clone(),
        Arc::clone(&last_backup),
        Arc::new(FailingBackend),
        fast_config(),
    );

    let mut events = backup.subscribe();
    assert!(backup.run());
    match wait_terminal(&mut events).await {
        BackupEvent::Fail(message) => assert!(message.contains("upload rejected")),
        other => panic!("expected failure, got {other:?}"),
    }

    assert_eq!(change_log.fetch_changes(10).await.unwrap().len(), 1);
    assert_eq!(last_backup.last_backup_time().await.unwrap(), Some(1));
}
