use crate::infrastructure::backends::drive::token_manager::DriveTokenManager;
use crate::shared::error::{AppError, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const ABOUT_URL: &str = "https://www.googleapis.com/drive/v3/about";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

pub const APP_DATA_FOLDER: &str = "appDataFolder";

/// Cached identity of a child entry. A file being created has no server id
/// yet; callers treat it as present so a concurrent lookup does not race a
/// duplicate creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileId {
    Known(String),
    PendingCreation,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<FileEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DriveQuota {
    pub limit: Option<u64>,
    pub usage: u64,
}

/// Thin Drive REST client scoped to the application data folder, with a
/// per-parent cache of child name to file id.
pub struct DriveClient {
    http: reqwest::Client,
    tokens: Arc<DriveTokenManager>,
    id_cache: RwLock<HashMap<String, HashMap<String, FileId>>>,
}

impl DriveClient {
    pub fn new(tokens: Arc<DriveTokenManager>) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            id_cache: RwLock::new(HashMap::new()),
        }
    }

    async fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.tokens.access_token().await?))
    }

    /// One page-token walk over a parent's children, replacing that parent's
    /// cache entry wholesale.
    async fn cache_folder_children(&self, parent: &str) -> Result<()> {
        let auth = self.bearer().await?;
        let mut children = HashMap::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("q".to_string(), format!("'{parent}' in parents")),
                ("spaces".to_string(), APP_DATA_FOLDER.to_string()),
                ("fields".to_string(), "nextPageToken, files(id, name)".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken".to_string(), token.clone()));
            }

            let page: FileList = self
                .http
                .get(FILES_URL)
                .header("Authorization", auth.as_str())
                .query(&query)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            for file in page.files {
                children.insert(file.name, FileId::Known(file.id));
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(parent, count = children.len(), "cached drive folder listing");
        self.id_cache
            .write()
            .await
            .insert(parent.to_string(), children);
        Ok(())
    }

    async fn cached_id(&self, parent: &str, name: &str) -> Option<FileId> {
        self.id_cache
            .read()
            .await
            .get(parent)
            .and_then(|children| children.get(name))
            .cloned()
    }

    async fn cache_put(&self, parent: &str, name: &str, id: FileId) {
        self.id_cache
            .write()
            .await
            .entry(parent.to_string())
            .or_default()
            .insert(name.to_string(), id);
    }

    /// Child file id, refreshing the parent listing on a cache miss.
    /// `PendingCreation` resolves to None.
    pub async fn file_id(&self, parent: &str, name: &str) -> Result<Option<String>> {
        if self.cached_id(parent, name).await.is_none() {
            self.cache_folder_children(parent).await?;
        }
        Ok(match self.cached_id(parent, name).await {
            Some(FileId::Known(id)) => Some(id),
            Some(FileId::PendingCreation) | None => None,
        })
    }

    /// Id of the named child folder, creating it when missing.
    pub async fn ensure_folder(&self, parent: &str, name: &str) -> Result<String> {
        if let Some(id) = self.file_id(parent, name).await? {
            return Ok(id);
        }

        self.cache_put(parent, name, FileId::PendingCreation).await;
        let metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent],
        });
        let created: FileRef = self
            .http
            .post(FILES_URL)
            .header("Authorization", self.bearer().await?)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        self.cache_put(parent, name, FileId::Known(created.id.clone()))
            .await;
        Ok(created.id)
    }

    /// Resumable upload of a JSON document: metadata request first, then the
    /// body against the returned upload location. Existing files are patched
    /// in place, new ones created under `parent`.
    pub async fn upload_json(&self, parent: &str, name: &str, body: &Value) -> Result<()> {
        let auth = self.bearer().await?;
        let existing = self.file_id(parent, name).await?;

        let session = match &existing {
            Some(id) => self
                .http
                .patch(format!("{UPLOAD_URL}/{id}"))
                .query(&[("uploadType", "resumable")])
                .json(&json!({ "name": name })),
            None => {
                self.cache_put(parent, name, FileId::PendingCreation).await;
                self.http
                    .post(UPLOAD_URL)
                    .query(&[("uploadType", "resumable")])
                    .json(&json!({ "name": name, "parents": [parent] }))
            }
        };
        let response = session
            .header("Authorization", auth.as_str())
            .send()
            .await?
            .error_for_status()?;
        let location = response
            .headers()
            .get("location")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AppError::Backend("upload session has no location".to_string()))?;

        let upload = match &existing {
            Some(_) => self.http.patch(&location),
            None => self.http.put(&location),
        };
        let uploaded: FileRef = upload
            .header("Authorization", auth.as_str())
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        self.cache_put(parent, name, FileId::Known(uploaded.id)).await;
        Ok(())
    }

    pub async fn list_file_names(&self, parent: &str) -> Result<Vec<String>> {
        self.cache_folder_children(parent).await?;
        Ok(self
            .id_cache
            .read()
            .await
            .get(parent)
            .map(|children| children.keys().cloned().collect())
            .unwrap_or_default())
    }

    pub async fn download_json(&self, parent: &str, name: &str) -> Result<Value> {
        let id = self
            .file_id(parent, name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("drive file {name}")))?;
        let value = self
            .http
            .get(format!("{FILES_URL}/{id}"))
            .header("Authorization", self.bearer().await?)
            .query(&[("alt", "media")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(value)
    }

    pub async fn storage_quota(&self) -> Result<DriveQuota> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Quota {
            #[serde(default)]
            limit: Option<String>,
            #[serde(default)]
            usage: Option<String>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct About {
            storage_quota: Quota,
        }

        let about: About = self
            .http
            .get(ABOUT_URL)
            .header("Authorization", self.bearer().await?)
            .query(&[("fields", "storageQuota")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // The API reports quota figures as decimal strings; an absent limit
        // means unlimited storage.
        Ok(DriveQuota {
            limit: about
                .storage_quota
                .limit
                .and_then(|raw| raw.parse().ok()),
            usage: about
                .storage_quota
                .usage
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(0),
        })
    }
}
