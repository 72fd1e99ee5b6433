use crate::application::ports::{BackupBackend, BackupOptions};
use crate::domain::entities::{build_backup_payloads, ObjectChange};
use crate::infrastructure::backends::drive::client::{DriveClient, DriveQuota, APP_DATA_FOLDER};
use crate::infrastructure::backends::drive::token_manager::{
    DriveTokenManager, DEFAULT_AUTH_SCOPE,
};
use crate::infrastructure::backends::percent_encode;
use crate::shared::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Backup target in the Drive application data folder. One subfolder per
/// remote collection, one JSON file per uploaded blob, named by the upload
/// timestamp.
pub struct DriveBackend {
    client: DriveClient,
    tokens: Arc<DriveTokenManager>,
}

impl DriveBackend {
    pub fn new(token_server_url: impl Into<String>) -> Self {
        let tokens = Arc::new(DriveTokenManager::new(token_server_url));
        Self {
            client: DriveClient::new(Arc::clone(&tokens)),
            tokens,
        }
    }

    async fn collection_folder(&self, collection: &str) -> Result<String> {
        self.client.ensure_folder(APP_DATA_FOLDER, collection).await
    }

    pub async fn storage_quota(&self) -> Result<DriveQuota> {
        self.client.storage_quota().await
    }
}

#[async_trait]
impl BackupBackend for DriveBackend {
    async fn is_connected(&self) -> bool {
        self.tokens.is_connected().await
    }

    async fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated().await
    }

    fn login_url(&self) -> Option<String> {
        Some(format!(
            "{}/auth/google?scope={}",
            self.tokens.token_server_url(),
            percent_encode(DEFAULT_AUTH_SCOPE)
        ))
    }

    async fn handle_login_redirect(&self, redirect_url: &str) -> Result<()> {
        self.tokens.handle_login_redirect(redirect_url).await
    }

    async fn backup_changes(
        &self,
        changes: &[ObjectChange],
        schema_version: u32,
        options: &BackupOptions,
    ) -> Result<()> {
        let (change_set, images) =
            build_backup_payloads(changes, schema_version, options.store_blobs);
        let name = Utc::now().timestamp_millis().to_string();

        let folder = self.collection_folder("change-sets").await?;
        debug!(name, count = changes.len(), "uploading change-set to drive");
        self.client
            .upload_json(&folder, &name, &serde_json::to_value(&change_set)?)
            .await?;

        if let Some(images) = images {
            let folder = self.collection_folder("images").await?;
            self.client
                .upload_json(&folder, &name, &serde_json::to_value(&images)?)
                .await?;
        }
        Ok(())
    }

    async fn list_objects(&self, collection: &str) -> Result<Vec<String>> {
        let folder = self.collection_folder(collection).await?;
        self.client.list_file_names(&folder).await
    }

    async fn retrieve_object(&self, collection: &str, id: &str) -> Result<Value> {
        let folder = self.collection_folder(collection).await?;
        self.client.download_json(&folder, id).await
    }
}
