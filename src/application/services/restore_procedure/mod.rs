pub mod writers;

use crate::application::ports::{BackupBackend, ChangeLogStore, LocalStore};
use crate::application::services::download_queue::DownloadQueue;
use crate::domain::entities::{ImageEntry, ObjectChange, RestoreEvent, RestoreInfo, RestoreStatus};
use crate::domain::value_objects::{BlobData, ChangeOperation};
use crate::shared::error::{AppError, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Success,
    Cancelled,
    Failed,
    AlreadyRunning,
}

#[derive(Clone, Copy)]
enum WriterKind {
    Change,
    Image,
}

/// Symmetric counterpart of the backup run: clears local storage and
/// replays remote change-sets (then images) through a one-ahead download
/// queue.
///
/// States: idle -> preparing -> synching -> success/cancelled/fail.
pub struct RestoreProcedure {
    local: Arc<dyn LocalStore>,
    change_log: Arc<dyn ChangeLogStore>,
    backend: Arc<dyn BackupBackend>,
    running: AtomicBool,
    cancelled: AtomicBool,
    info: Mutex<RestoreInfo>,
    events_tx: broadcast::Sender<RestoreEvent>,
}

impl RestoreProcedure {
    pub fn new(
        local: Arc<dyn LocalStore>,
        change_log: Arc<dyn ChangeLogStore>,
        backend: Arc<dyn BackupBackend>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            local,
            change_log,
            backend,
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            info: Mutex::new(RestoreInfo::default()),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RestoreEvent> {
        self.events_tx.subscribe()
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> RestoreInfo {
        self.info_mut().clone()
    }

    /// Cooperative cancellation: observed between blobs and between inner
    /// entries, never mid-write. A cancelled run rolls the database back to
    /// empty before reporting.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Drive a full restore. Errors surface as a `Fail` event and in the
    /// returned outcome; they are not propagated as `Err`.
    pub async fn run(&self) -> RestoreOutcome {
        if self.running.swap(true, Ordering::SeqCst) {
            return RestoreOutcome::AlreadyRunning;
        }
        self.cancelled.store(false, Ordering::SeqCst);
        *self.info_mut() = RestoreInfo::default();

        let outcome = match self.procedure().await {
            Ok(false) => {
                info!("restore cancelled, database rolled back");
                self.emit(RestoreEvent::Cancelled);
                RestoreOutcome::Cancelled
            }
            Ok(true) => {
                info!("restore completed");
                self.emit(RestoreEvent::Success);
                RestoreOutcome::Success
            }
            Err(err) => {
                error!(error = %err, "restore failed");
                self.emit(RestoreEvent::Fail(err.to_string()));
                RestoreOutcome::Failed
            }
        };

        // State is cleared on every exit path.
        *self.info_mut() = RestoreInfo::default();
        self.running.store(false, Ordering::SeqCst);
        outcome
    }

    /// Returns Ok(false) when the run observed a cancellation.
    async fn procedure(&self) -> Result<bool> {
        self.emit_info();

        self.change_log.set_recording(false);
        self.local.recreate().await?;
        self.local.block_writes().await?;

        let (change_sets, images) = tokio::try_join!(
            self.backend.list_objects("change-sets"),
            self.backend.list_objects("images"),
        )?;

        if change_sets.is_empty() {
            self.local.unblock_writes().await?;
            return Err(AppError::NotFound("Backup file not found".to_string()));
        }

        {
            let mut info = self.info_mut();
            info.status = RestoreStatus::Synching;
            info.total_changes = (change_sets.len() + images.len()) as u64;
        }
        self.emit_info();

        self.restore_collection("change-sets", change_sets, "changes", WriterKind::Change)
            .await?;
        self.restore_collection("images", images, "images", WriterKind::Image)
            .await?;

        self.local.unblock_writes().await?;
        if self.cancelled.load(Ordering::SeqCst) {
            // Full rollback: a partially restored database is worse than an
            // empty one.
            self.local.recreate().await?;
            Ok(false)
        } else {
            self.change_log.set_recording(true);
            Ok(true)
        }
    }

    async fn restore_collection(
        &self,
        collection: &str,
        mut identifiers: Vec<String>,
        entries_key: &str,
        writer: WriterKind,
    ) -> Result<()> {
        // Remote listing order is not guaranteed; ascending replay order is
        // what makes the last write win.
        identifiers.sort();

        let mut queue = DownloadQueue::new(Arc::clone(&self.backend), collection, identifiers);
        while queue.has_next() {
            if self.cancelled.load(Ordering::SeqCst) {
                return Ok(());
            }
            let payload = queue.get_next().await?;
            let entries = payload
                .get(entries_key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for entry in entries {
                if self.cancelled.load(Ordering::SeqCst) {
                    return Ok(());
                }
                match writer {
                    WriterKind::Change => self.write_change(entry).await?,
                    WriterKind::Image => self.write_image(entry).await,
                }
            }
            // One tick per downloaded blob, not per inner entry.
            self.info_mut().processed_changes += 1;
            self.emit_info();
        }
        Ok(())
    }

    async fn write_change(&self, entry: Value) -> Result<()> {
        let mut change: ObjectChange = serde_json::from_value(entry)?;
        writers::deserialize_change_fields(&mut change);
        writers::migrate_object(&mut change);
        let change = writers::filter_bad_change(change);

        match change.operation {
            ChangeOperation::Skip => Ok(()),
            ChangeOperation::Create => {
                let Some(object) = change.object else {
                    return Ok(());
                };
                self.local.create_object(&change.collection, object).await
            }
            ChangeOperation::Update => {
                let Some(Value::Object(updates)) = change.object else {
                    return Ok(());
                };
                let filter =
                    writers::change_where(self.local.registry(), &change.collection, &change.object_pk)?;
                self.local
                    .update_objects(&change.collection, &filter, &updates)
                    .await
            }
            ChangeOperation::Delete => {
                let filter =
                    writers::change_where(self.local.registry(), &change.collection, &change.object_pk)?;
                self.local.delete_objects(&change.collection, &filter).await
            }
        }
    }

    /// A single bad image never aborts the batch; it is logged and skipped.
    async fn write_image(&self, entry: Value) {
        if let Err(err) = self.try_write_image(entry).await {
            warn!(error = %err, "skipping unwritable image entry");
        }
    }

    async fn try_write_image(&self, entry: Value) -> Result<()> {
        let entry: ImageEntry = serde_json::from_value(entry)?;
        let Some(raw) = entry.data.as_str() else {
            return Ok(());
        };
        if raw.is_empty() {
            return Ok(());
        }

        let blob = BlobData::parse(raw).map_err(AppError::InvalidInput)?;
        let filter = writers::change_where(self.local.registry(), &entry.collection, &entry.object_pk)?;
        let mut updates = serde_json::Map::new();
        updates.insert(entry.field, Value::String(blob.to_data_url()));
        self.local
            .update_objects(&entry.collection, &filter, &updates)
            .await
    }

    fn info_mut(&self) -> MutexGuard<'_, RestoreInfo> {
        self.info.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit_info(&self) {
        let snapshot = self.info_mut().clone();
        self.emit(RestoreEvent::Info(snapshot));
    }

    fn emit(&self, event: RestoreEvent) {
        let _ = self.events_tx.send(event);
    }
}
