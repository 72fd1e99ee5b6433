use crate::domain::entities::SchemaRegistry;
use crate::shared::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Query surface of the primary local storage consumed by the engine.
///
/// The ORM itself is an external collaborator; the engine only reads live
/// objects for hydration, streams primary keys for the initial seed, and
/// writes objects back during restore.
#[async_trait]
pub trait LocalStore: Send + Sync {
    fn registry(&self) -> &SchemaRegistry;

    async fn find_by_pk(&self, collection: &str, pk: &Value) -> Result<Option<Value>>;

    /// Primary keys of every object in a collection, in iteration order.
    async fn stream_pks(&self, collection: &str) -> Result<Vec<Value>>;

    /// Every object in a collection; used by the size estimator.
    async fn stream_objects(&self, collection: &str) -> Result<Vec<Value>>;

    async fn create_object(&self, collection: &str, object: Value) -> Result<()>;

    async fn update_objects(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        updates: &Map<String, Value>,
    ) -> Result<()>;

    async fn delete_objects(&self, collection: &str, filter: &Map<String, Value>) -> Result<()>;

    /// Drop and recreate the whole database schema. Restore calls this
    /// before replay and again when rolling back a cancelled run.
    async fn recreate(&self) -> Result<()>;

    /// Hook points around the restore replay; no-ops by default.
    async fn block_writes(&self) -> Result<()> {
        Ok(())
    }

    async fn unblock_writes(&self) -> Result<()> {
        Ok(())
    }
}
