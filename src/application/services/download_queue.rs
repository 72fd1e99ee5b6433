use crate::application::ports::BackupBackend;
use crate::shared::error::{AppError, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One-item-lookahead prefetcher over a backend collection.
///
/// Construction immediately starts fetching the first identifier. Popping a
/// result kicks off the next prefetch, so at most one fetch is in flight and
/// at most one unconsumed result is buffered; one item's download latency
/// overlaps the caller's processing of the previous item.
pub struct DownloadQueue {
    backend: Arc<dyn BackupBackend>,
    collection: String,
    pending: VecDeque<String>,
    in_flight: Option<JoinHandle<Result<Value>>>,
}

impl DownloadQueue {
    pub fn new(
        backend: Arc<dyn BackupBackend>,
        collection: impl Into<String>,
        identifiers: Vec<String>,
    ) -> Self {
        let mut queue = Self {
            backend,
            collection: collection.into(),
            pending: identifiers.into(),
            in_flight: None,
        };
        queue.prefetch();
        queue
    }

    fn prefetch(&mut self) {
        if let Some(id) = self.pending.pop_front() {
            let backend = Arc::clone(&self.backend);
            let collection = self.collection.clone();
            self.in_flight = Some(tokio::spawn(async move {
                backend.retrieve_object(&collection, &id).await
            }));
        }
    }

    pub fn has_next(&self) -> bool {
        self.in_flight.is_some()
    }

    pub async fn get_next(&mut self) -> Result<Value> {
        let handle = self
            .in_flight
            .take()
            .ok_or_else(|| AppError::Internal("download queue exhausted".to_string()))?;
        let result = handle
            .await
            .map_err(|err| AppError::Internal(format!("download task failed: {err}")))?;
        self.prefetch();
        result
    }
}
