use async_trait::async_trait;
use pagevault::application::ports::LocalStore;
use pagevault::domain::entities::{PkIndex, SchemaRegistry};
use pagevault::{AppError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory local storage keyed by collection, with primary keys resolved
/// through the schema registry.
pub struct MockLocalStore {
    registry: SchemaRegistry,
    objects: Arc<RwLock<HashMap<String, Vec<Value>>>>,
    recreate_count: AtomicUsize,
}

impl MockLocalStore {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            registry,
            objects: Arc::new(RwLock::new(HashMap::new())),
            recreate_count: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, collection: &str, object: Value) {
        self.objects
            .write()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(object);
    }

    pub fn all_objects(&self, collection: &str) -> Vec<Value> {
        self.objects
            .read()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn recreate_count(&self) -> usize {
        self.recreate_count.load(Ordering::SeqCst)
    }

    fn pk_of(&self, collection: &str, object: &Value) -> Option<Value> {
        match &self.registry.get(collection)?.pk {
            PkIndex::Single(field) => object.get(field).cloned(),
            PkIndex::Composite(fields) => {
                let parts: Option<Vec<Value>> =
                    fields.iter().map(|f| object.get(f).cloned()).collect();
                parts.map(Value::Array)
            }
        }
    }

    fn matches(object: &Value, filter: &Map<String, Value>) -> bool {
        filter
            .iter()
            .all(|(key, value)| object.get(key) == Some(value))
    }
}

#[async_trait]
impl LocalStore for MockLocalStore {
    fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    async fn find_by_pk(&self, collection: &str, pk: &Value) -> Result<Option<Value>> {
        let objects = self.objects.read().unwrap();
        Ok(objects.get(collection).and_then(|objects| {
            objects
                .iter()
                .find(|object| self.pk_of(collection, object).as_ref() == Some(pk))
                .cloned()
        }))
    }

    async fn stream_pks(&self, collection: &str) -> Result<Vec<Value>> {
        let objects = self.objects.read().unwrap();
        Ok(objects
            .get(collection)
            .map(|objects| {
                objects
                    .iter()
                    .filter_map(|object| self.pk_of(collection, object))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn stream_objects(&self, collection: &str) -> Result<Vec<Value>> {
        Ok(self.all_objects(collection))
    }

    async fn create_object(&self, collection: &str, object: Value) -> Result<()> {
        self.insert(collection, object);
        Ok(())
    }

    async fn update_objects(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        updates: &Map<String, Value>,
    ) -> Result<()> {
        let mut objects = self.objects.write().unwrap();
        let Some(objects) = objects.get_mut(collection) else {
            return Ok(());
        };
        for object in objects.iter_mut().filter(|o| Self::matches(o, filter)) {
            let map = object
                .as_object_mut()
                .ok_or_else(|| AppError::Internal("stored object is not a map".to_string()))?;
            for (key, value) in updates {
                map.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn delete_objects(&self, collection: &str, filter: &Map<String, Value>) -> Result<()> {
        let mut objects = self.objects.write().unwrap();
        if let Some(objects) = objects.get_mut(collection) {
            objects.retain(|object| !Self::matches(object, filter));
        }
        Ok(())
    }

    async fn recreate(&self) -> Result<()> {
        self.objects.write().unwrap().clear();
        self.recreate_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
