use crate::application::ports::{
    BackupBackend, BackupOptions, ChangeLogStore, ChangeStream, ErrorReporter, LastBackupStore,
    LocalStore,
};
use crate::domain::entities::{BackupEvent, BackupProgressInfo, BackupState, ObjectChangeBatch};
use crate::domain::value_objects::ChangeOperation;
use crate::shared::config::BackupConfig;
use crate::shared::error::Result;
use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Running,
    Paused,
    Cancelled,
}

/// Change-log-driven incremental backup run.
///
/// States: idle -> preparing -> synching <-> paused -> cancelled/success/fail.
/// Only one run may be active at a time; running a backup concurrently with
/// a restore is a caller error.
pub struct BackupProcedure {
    local: Arc<dyn LocalStore>,
    change_log: Arc<dyn ChangeLogStore>,
    last_backup: Arc<dyn LastBackupStore>,
    backend: Arc<dyn BackupBackend>,
    reporter: Arc<dyn ErrorReporter>,
    config: BackupConfig,
    running: AtomicBool,
    info: Mutex<BackupProgressInfo>,
    control_tx: watch::Sender<Control>,
    finished_tx: watch::Sender<bool>,
    events_tx: broadcast::Sender<BackupEvent>,
}

impl BackupProcedure {
    pub fn new(
        local: Arc<dyn LocalStore>,
        change_log: Arc<dyn ChangeLogStore>,
        last_backup: Arc<dyn LastBackupStore>,
        backend: Arc<dyn BackupBackend>,
        reporter: Arc<dyn ErrorReporter>,
        config: BackupConfig,
    ) -> Self {
        let (control_tx, _) = watch::channel(Control::Running);
        let (finished_tx, _) = watch::channel(true);
        let (events_tx, _) = broadcast::channel(256);
        Self {
            local,
            change_log,
            last_backup,
            backend,
            reporter,
            config,
            running: AtomicBool::new(false),
            info: Mutex::new(BackupProgressInfo::default()),
            control_tx,
            finished_tx,
            events_tx,
        }
    }

    /// Subscribe before calling [`run`](Self::run); the first progress event
    /// fires only after the configured start delay.
    pub fn subscribe(&self) -> broadcast::Receiver<BackupEvent> {
        self.events_tx.subscribe()
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> BackupProgressInfo {
        self.info_mut().clone()
    }

    pub async fn has_initial_backup(&self) -> Result<bool> {
        Ok(self.last_backup.last_backup_time().await?.is_some())
    }

    /// Start a run. Returns false when one is already active. The guard is
    /// taken synchronously; the body is scheduled after a short delay so
    /// callers can subscribe to events before the first one fires.
    pub fn run(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.info_mut() = BackupProgressInfo::default();
        self.control_tx.send_replace(Control::Running);
        self.finished_tx.send_replace(false);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.config.start_delay()).await;
            let result = this.procedure().await;
            this.running.store(false, Ordering::SeqCst);
            match result {
                Ok(true) => {
                    info!("backup run completed");
                    this.emit(BackupEvent::Success);
                }
                Ok(false) => {
                    info!("backup run cancelled");
                }
                Err(err) => {
                    error!(error = %err, "backup run failed");
                    this.reporter.capture(&err);
                    this.emit(BackupEvent::Fail(err.to_string()));
                }
            }
            this.finished_tx.send_replace(true);
        });
        true
    }

    /// Valid only while synching; otherwise a no-op.
    pub fn pause(&self) {
        {
            let mut info = self.info_mut();
            if info.state != BackupState::Synching {
                return;
            }
            info.state = BackupState::Paused;
        }
        self.control_tx.send_replace(Control::Paused);
        self.emit_info();
    }

    /// Valid only while paused; otherwise a no-op.
    pub fn resume(&self) {
        {
            let mut info = self.info_mut();
            if info.state != BackupState::Paused {
                return;
            }
            info.state = BackupState::Synching;
        }
        self.control_tx.send_replace(Control::Running);
        self.emit_info();
    }

    /// Stop before the next batch; in-flight work finishes. Awaits run
    /// completion plus a fixed settle delay.
    pub async fn cancel(&self) {
        self.info_mut().state = BackupState::Cancelled;
        self.control_tx.send_replace(Control::Cancelled);
        let mut finished = self.finished_tx.subscribe();
        let _ = finished.wait_for(|done| *done).await;
        tokio::time::sleep(self.config.cancel_settle_delay()).await;
    }

    /// Returns Ok(false) when the run stopped on cancellation.
    async fn procedure(&self) -> Result<bool> {
        let last_backup_time = self.last_backup.last_backup_time().await?;
        self.backend.start_backup().await?;

        if last_backup_time.is_none() {
            info!("no previous backup, seeding change log from live storage");
            self.emit_info();
            self.change_log.forget_all_changes().await?;
            self.queue_initial_backup().await?;
        }

        let backup_time = Utc::now().timestamp_millis();
        let completed = self.incremental_backup(backup_time).await?;
        if completed {
            self.backend.commit_backup().await?;
            if self.config.store_backup_time {
                self.last_backup.store_last_backup_time(backup_time).await?;
                self.last_backup
                    .store_last_backup_finish_time(Utc::now().timestamp_millis())
                    .await?;
            }
        }
        Ok(completed)
    }

    /// Synthesize one `create` entry per existing object per non-excluded
    /// collection.
    async fn queue_initial_backup(&self) -> Result<()> {
        let collections: Vec<String> = self
            .local
            .registry()
            .backed_up()
            .map(|def| def.name.clone())
            .collect();
        for collection in collections {
            for pk in self.local.stream_pks(&collection).await? {
                self.change_log
                    .register_change(&collection, &pk, ChangeOperation::Create)
                    .await?;
            }
        }
        Ok(())
    }

    async fn incremental_backup(&self, until: i64) -> Result<bool> {
        let total = self.count_total_changes(until).await?;
        {
            let mut info = self.info_mut();
            info.state = BackupState::Synching;
            info.total_changes = total;
            info.processed_changes = 0;
        }
        self.emit_info();

        let schema_version = self.local.registry().schema_version();
        let options = BackupOptions {
            store_blobs: self.config.store_blobs,
        };
        let mut stream = ChangeStream::new(&*self.change_log, until, self.config.batch_size);
        let mut control = self.control_tx.subscribe();

        loop {
            // Pause gate, awaited before each batch.
            let _ = control.wait_for(|c| *c != Control::Paused).await;
            if *control.borrow() == Control::Cancelled {
                return Ok(false);
            }

            let Some(mut batch) = stream.next().await? else {
                break;
            };
            self.hydrate_batch(&mut batch).await?;
            self.backend
                .backup_changes(&batch.changes, schema_version, &options)
                .await?;
            self.change_log.forget_changes(&batch.entry_pks).await?;
            self.info_mut().processed_changes += batch.changes.len() as u64;
            self.emit_info();
        }
        Ok(true)
    }

    async fn count_total_changes(&self, until: i64) -> Result<u64> {
        let mut total = 0;
        let collections: Vec<String> = self
            .local
            .registry()
            .backed_up()
            .map(|def| def.name.clone())
            .collect();
        for collection in collections {
            total += self
                .change_log
                .count_queued_changes_by_collection(&collection, until)
                .await?;
        }
        Ok(total)
    }

    /// Fetch each change's current live object. Snapshots are taken at
    /// upload time, so every duplicate log entry for a key resolves to the
    /// same final state.
    async fn hydrate_batch(&self, batch: &mut ObjectChangeBatch) -> Result<()> {
        for change in &mut batch.changes {
            if change.operation == ChangeOperation::Delete {
                continue;
            }
            if let Some(object) = self
                .local
                .find_by_pk(&change.collection, &change.object_pk)
                .await?
            {
                change.object = Some(strip_derived_fields(object));
            }
        }
        Ok(())
    }

    fn info_mut(&self) -> MutexGuard<'_, BackupProgressInfo> {
        self.info.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit_info(&self) {
        let snapshot = self.info_mut().clone();
        self.emit(BackupEvent::Info(snapshot));
    }

    fn emit(&self, event: BackupEvent) {
        let _ = self.events_tx.send(event);
    }
}

/// Derived full-text fields are rebuilt by the indexer on restore and never
/// leave the device.
fn strip_derived_fields(object: Value) -> Value {
    match object {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| key != "terms" && !key.contains("_terms"))
                .collect(),
        ),
        other => other,
    }
}
