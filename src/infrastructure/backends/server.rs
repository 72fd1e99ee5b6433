use crate::application::ports::{BackupBackend, BackupOptions};
use crate::domain::entities::{build_backup_payloads, ObjectChange};
use crate::infrastructure::backends::percent_encode;
use crate::shared::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

/// Self-hosted HTTP backup server.
///
/// The server exposes one flat namespace per collection: `PUT` and `GET` on
/// `/{collection}/{name}`, a collection listing on `/{collection}` returning
/// comma-joined names, and a `/status` probe.
pub struct ServerBackend {
    http: reqwest::Client,
    base_url: String,
}

impl ServerBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Object names may themselves contain percent escapes (URLs as primary
    /// keys), so they are encoded twice to survive server-side decoding.
    fn object_url(&self, collection: &str, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            percent_encode(collection),
            percent_encode(&percent_encode(name))
        )
    }

    async fn put_json(&self, url: &str, body: &Value) -> Result<()> {
        let response = self.http.put(url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Backend(format!(
                "backup server returned {} for PUT {url}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BackupBackend for ServerBackend {
    async fn is_connected(&self) -> bool {
        let url = format!("{}/status", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    // The server trusts its local network; there is no login step.
    async fn is_authenticated(&self) -> bool {
        true
    }

    async fn store_object(&self, collection: &str, pk: &str, object: &Value) -> Result<()> {
        self.put_json(&self.object_url(collection, pk), object).await
    }

    async fn delete_object(&self, collection: &str, pk: &str) -> Result<()> {
        let url = self.object_url(collection, pk);
        let response = self.http.delete(&url).send().await?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(AppError::Backend(format!(
                "backup server returned {} for DELETE {url}",
                response.status()
            )));
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
        let timestamp = Utc::now().timestamp_millis();

        debug!(timestamp, count = changes.len(), "uploading change-set");
        self.put_json(
            &self.object_url("change-sets", &timestamp.to_string()),
            &serde_json::to_value(&change_set)?,
        )
        .await?;

        if let Some(images) = images {
            self.put_json(
                &self.object_url("images", &timestamp.to_string()),
                &serde_json::to_value(&images)?,
            )
            .await?;
        }
        Ok(())
    }

    async fn list_objects(&self, collection: &str) -> Result<Vec<String>> {
        let url = format!("{}/{}", self.base_url, percent_encode(collection));
        let response = self.http.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(vec![]);
        }
        if !response.status().is_success() {
            return Err(AppError::Backend(format!(
                "backup server returned {} for GET {url}",
                response.status()
            )));
        }

        let body = response.text().await?;
        Ok(body
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn retrieve_object(&self, collection: &str, id: &str) -> Result<Value> {
        let url = self.object_url(collection, id);
        let response = self.http.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("{collection}/{id}")));
        }
        if !response.status().is_success() {
            return Err(AppError::Backend(format!(
                "backup server returned {} for GET {url}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}
