#![allow(dead_code)]

pub mod mocks;

use pagevault::domain::entities::{CollectionDefinition, PkIndex, SchemaRegistry};
use pagevault::infrastructure::database::SqliteChangeLog;
use sqlx::sqlite::SqlitePoolOptions;

/// Schema mirroring the browsing-data collections the engine targets.
pub fn test_registry() -> SchemaRegistry {
    SchemaRegistry::new(vec![
        CollectionDefinition {
            name: "pages".to_string(),
            version: 1,
            backup: true,
            pk: PkIndex::Single("url".to_string()),
        },
        CollectionDefinition {
            name: "favIcons".to_string(),
            version: 1,
            backup: true,
            pk: PkIndex::Single("hostname".to_string()),
        },
        CollectionDefinition {
            name: "annotations".to_string(),
            version: 2,
            backup: true,
            pk: PkIndex::Single("url".to_string()),
        },
        CollectionDefinition {
            name: "customLists".to_string(),
            version: 2,
            backup: true,
            pk: PkIndex::Single("id".to_string()),
        },
        CollectionDefinition {
            name: "visits".to_string(),
            version: 1,
            backup: true,
            pk: PkIndex::Composite(vec!["url".to_string(), "time".to_string()]),
        },
        CollectionDefinition {
            name: "eventLog".to_string(),
            version: 1,
            backup: false,
            pk: PkIndex::Single("id".to_string()),
        },
    ])
}

pub async fn memory_change_log() -> SqliteChangeLog {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    SqliteChangeLog::new(pool)
}
