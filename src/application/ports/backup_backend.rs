use crate::domain::entities::ObjectChange;
use crate::domain::value_objects::ChangeOperation;
use crate::shared::error::Result;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, Copy)]
pub struct BackupOptions {
    pub store_blobs: bool,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self { store_blobs: true }
    }
}

/// Capability contract for a remote backup target.
///
/// Simple backends only implement `store_object`/`delete_object` and inherit
/// the per-entry `backup_changes` below; richer backends override it to
/// write whole change-sets (and image payloads) as single remote blobs.
#[async_trait]
pub trait BackupBackend: Send + Sync {
    async fn is_connected(&self) -> bool;

    async fn is_authenticated(&self) -> bool;

    /// URL the user visits to authorize the backend, if it needs one.
    fn login_url(&self) -> Option<String> {
        None
    }

    /// Called with the full redirect URL after the user authorized access.
    async fn handle_login_redirect(&self, _redirect_url: &str) -> Result<()> {
        Ok(())
    }

    async fn start_backup(&self) -> Result<()> {
        Ok(())
    }

    async fn commit_backup(&self) -> Result<()> {
        Ok(())
    }

    async fn store_object(&self, _collection: &str, _pk: &str, _object: &Value) -> Result<()> {
        Ok(())
    }

    async fn delete_object(&self, _collection: &str, _pk: &str) -> Result<()> {
        Ok(())
    }

    /// Upload one hydrated batch. The default walks the batch entry by
    /// entry; a change without a live object (deleted since registration)
    /// is skipped.
    async fn backup_changes(
        &self,
        changes: &[ObjectChange],
        _schema_version: u32,
        _options: &BackupOptions,
    ) -> Result<()> {
        for change in changes {
            let pk = pk_to_string(&change.object_pk);
            match change.operation {
                ChangeOperation::Delete => {
                    self.delete_object(&change.collection, &pk).await?;
                }
                _ => {
                    if let Some(object) = &change.object {
                        self.store_object(&change.collection, &pk, object).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Identifiers of every stored blob in a remote collection. Order is
    /// not guaranteed; restore sorts before replay.
    async fn list_objects(&self, collection: &str) -> Result<Vec<String>>;

    /// Fetch and parse one stored blob.
    async fn retrieve_object(&self, collection: &str, id: &str) -> Result<Value>;
}

/// Remote object names are flat strings; composite primary keys serialize
/// to their JSON form.
pub fn pk_to_string(pk: &Value) -> String {
    match pk {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
