use crate::domain::entities::{ChangeLogEntry, ObjectChange, ObjectChangeBatch, SchemaRegistry};
use crate::domain::value_objects::ChangeOperation;
use crate::shared::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Append-only ledger of pending local mutations.
#[async_trait]
pub trait ChangeLogStore: Send + Sync {
    /// Append one entry, timestamped now.
    async fn register_change(
        &self,
        collection: &str,
        pk: &Value,
        operation: ChangeOperation,
    ) -> Result<()>;

    /// Oldest `limit` entries, in registration order.
    async fn fetch_changes(&self, limit: u32) -> Result<Vec<ChangeLogEntry>>;

    /// Delete exactly the given entries, identified by their timestamps.
    async fn forget_changes(&self, entry_pks: &[i64]) -> Result<()>;

    /// Wipe the ledger; used only right before reseeding.
    async fn forget_all_changes(&self) -> Result<()>;

    async fn count_queued_changes_by_collection(
        &self,
        collection: &str,
        until: i64,
    ) -> Result<u64>;

    /// Gate for the storage-mutation observer. Restore disables recording
    /// while it replays so its own writes do not re-enter the log.
    fn set_recording(&self, recording: bool);

    fn is_recording(&self) -> bool;

    /// Observer entry point for local storage mutations. Drops the event
    /// while recording is off or the collection is excluded from backup.
    async fn handle_storage_change(
        &self,
        registry: &SchemaRegistry,
        collection: &str,
        pk: &Value,
        operation: ChangeOperation,
    ) -> Result<()> {
        if !self.is_recording() || registry.is_excluded(collection) {
            return Ok(());
        }
        self.register_change(collection, pk, operation).await
    }
}

/// Lazy, finite batch sequence over a change log.
///
/// Each `next()` re-reads the oldest entries, so forward progress relies on
/// the caller forgetting a delivered batch before asking for the next one.
/// An entry past `until` terminates the stream; the partial batch in front
/// of it is still yielded.
pub struct ChangeStream<'a> {
    store: &'a dyn ChangeLogStore,
    until: i64,
    batch_size: u32,
    done: bool,
}

impl<'a> ChangeStream<'a> {
    pub fn new(store: &'a dyn ChangeLogStore, until: i64, batch_size: u32) -> Self {
        Self {
            store,
            until,
            batch_size: batch_size.max(1),
            done: false,
        }
    }

    pub async fn next(&mut self) -> Result<Option<ObjectChangeBatch>> {
        if self.done {
            return Ok(None);
        }

        let entries = self.store.fetch_changes(self.batch_size).await?;
        if entries.is_empty() {
            self.done = true;
            return Ok(None);
        }
        if entries.len() < self.batch_size as usize {
            self.done = true;
        }

        let mut changes = Vec::new();
        let mut entry_pks = Vec::new();
        for entry in entries {
            if entry.timestamp > self.until {
                self.done = true;
                break;
            }
            entry_pks.push(entry.timestamp);
            changes.push(ObjectChange::from(entry));
        }

        if changes.is_empty() {
            self.done = true;
            return Ok(None);
        }
        Ok(Some(ObjectChangeBatch { changes, entry_pks }))
    }
}
