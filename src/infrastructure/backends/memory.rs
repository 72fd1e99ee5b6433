use crate::application::ports::{BackupBackend, BackupOptions};
use crate::domain::entities::{build_backup_payloads, ObjectChange};
use crate::shared::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

/// In-process backend holding uploaded blobs in memory. Used by tests and as
/// the reference for how a change-set-aware backend behaves.
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    clock: AtomicI64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            clock: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    fn next_key(&self) -> String {
        self.clock.fetch_add(1, Ordering::SeqCst).to_string()
    }

    pub async fn objects(&self, collection: &str) -> BTreeMap<String, Value> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn put_object(&self, collection: &str, id: &str, object: Value) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), object);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackupBackend for MemoryBackend {
    async fn is_connected(&self) -> bool {
        true
    }

    async fn is_authenticated(&self) -> bool {
        true
    }

    async fn store_object(&self, collection: &str, pk: &str, object: &Value) -> Result<()> {
        self.put_object(collection, pk, object.clone()).await;
        Ok(())
    }

    async fn delete_object(&self, collection: &str, pk: &str) -> Result<()> {
        if let Some(objects) = self.collections.write().await.get_mut(collection) {
            objects.remove(pk);
        }
        Ok(())
    }

    async fn backup_changes(
        &self,
        changes: &[ObjectChange],
        schema_version: u32,
        options: &BackupOptions,
    ) -> Result<()> {
        let (change_set, images) =
            build_backup_payloads(changes, schema_version, options.store_blobs);
        let key = self.next_key();
        self.put_object("change-sets", &key, serde_json::to_value(&change_set)?)
            .await;
        if let Some(images) = images {
            self.put_object("images", &key, serde_json::to_value(&images)?)
                .await;
        }
        Ok(())
    }

    async fn list_objects(&self, collection: &str) -> Result<Vec<String>> {
        Ok(self.objects(collection).await.keys().cloned().collect())
    }

    async fn retrieve_object(&self, collection: &str, id: &str) -> Result<Value> {
        self.objects(collection)
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("{collection}/{id}")))
    }
}
