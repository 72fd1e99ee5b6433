/// Primary key layout of a collection, as declared by the local storage
/// schema. Composite keys replay against an array-valued change identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PkIndex {
    Single(String),
    Composite(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct CollectionDefinition {
    pub name: String,
    /// Schema version the collection was registered under.
    pub version: u32,
    /// Collections flagged `backup: false` never enter the change log.
    pub backup: bool,
    pub pk: PkIndex,
}

/// Read-only view of the local storage schema consumed by the engine.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    collections: Vec<CollectionDefinition>,
}

impl SchemaRegistry {
    pub fn new(collections: Vec<CollectionDefinition>) -> Self {
        Self { collections }
    }

    pub fn collections(&self) -> &[CollectionDefinition] {
        &self.collections
    }

    pub fn get(&self, name: &str) -> Option<&CollectionDefinition> {
        self.collections.iter().find(|def| def.name == name)
    }

    pub fn backed_up(&self) -> impl Iterator<Item = &CollectionDefinition> {
        self.collections.iter().filter(|def| def.backup)
    }

    /// Unknown collections are treated as excluded.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.get(name).map(|def| !def.backup).unwrap_or(true)
    }

    /// Highest registered collection version; sent with every upload so
    /// consumers can apply forward migrations.
    pub fn schema_version(&self) -> u32 {
        self.collections
            .iter()
            .map(|def| def.version)
            .max()
            .unwrap_or(0)
    }
}
