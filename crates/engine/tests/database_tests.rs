//! Database-level behavior: configuration, cross-collection operations,
//! key-prefix isolation and commit metrics

use std::sync::Arc;

use stratadex_concurrency::Substrate;
use stratadex_core::{Error, ListOptions, Value};
use stratadex_engine::{
    CollectionOptions, Database, DatabaseConfig, QueryOptions, SetOptions,
    UpdateStrategy,
};
use stratadex_storage::MemorySubstrate;

async fn seeded(db: &Database) {
    let users = db.collection("users", CollectionOptions::new().history(true)).unwrap();
    let posts = db.collection("posts", CollectionOptions::new()).unwrap();
    for i in 0..3i64 {
        users.write(format!("u{i}"), i).await.unwrap();
    }
    for i in 0..2i64 {
        posts.write(format!("p{i}"), i).await.unwrap();
    }
}

// ========== Configuration ==========

#[test]
fn test_default_toml_parses_to_defaults() {
    let parsed = DatabaseConfig::from_toml_str(DatabaseConfig::default_toml()).unwrap();
    assert_eq!(parsed, DatabaseConfig::default());
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let db = Database::builder()
        .toml("key_prefix = \"tenant-a\"\nhistory_by_default = true\n")
        .unwrap()
        .open()
        .unwrap();
    assert_eq!(db.config().key_prefix, "tenant-a");
    assert!(db.config().history_by_default);
    assert_eq!(db.config().default_batch_size, DatabaseConfig::default().default_batch_size);

    let c = db.collection("c", CollectionOptions::new()).unwrap();
    assert!(c.has_history());
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = Database::builder().toml("max_value_bytes = 0").unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert!(Database::builder().toml("key_prefix = [").is_err());
    assert!(Database::builder().key_prefix("").open().is_err());
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = DatabaseConfig {
        key_prefix: "p".into(),
        max_value_bytes: 1024,
        default_batch_size: 10,
        history_by_default: true,
    };
    let text = config.to_toml_string().unwrap();
    assert_eq!(DatabaseConfig::from_toml_str(&text).unwrap(), config);
}

// ========== Registry ==========

#[tokio::test]
async fn test_collections_are_registered_once() {
    let db = Database::in_memory();
    db.collection("a", CollectionOptions::new()).unwrap();
    db.collection("b", CollectionOptions::new()).unwrap();
    assert!(db.collection("a", CollectionOptions::new()).is_err());

    let names: Vec<_> = db.collections().iter().map(|c| c.name().to_string()).collect();
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    assert!(db.get_collection("a").is_some());
    assert!(db.get_collection("missing").is_none());
}

// ========== Whole-database operations ==========

#[tokio::test]
async fn test_count_all_and_delete_all() {
    let db = Database::in_memory();
    seeded(&db).await;
    assert_eq!(db.count_all().await.unwrap(), 5);

    db.delete_all().await.unwrap();
    assert_eq!(db.count_all().await.unwrap(), 0);

    // delete_all keeps history
    let users = db.get_collection("users").unwrap();
    let history = users.find_history("u0", QueryOptions::new()).await.unwrap();
    assert_eq!(history.result.len(), 2);
}

#[tokio::test]
async fn test_wipe_removes_documents_and_history() {
    let db = Database::in_memory();
    seeded(&db).await;

    db.wipe().await.unwrap();

    assert_eq!(db.count_all().await.unwrap(), 0);
    let users = db.get_collection("users").unwrap();
    assert!(users
        .find_history("u1", QueryOptions::new())
        .await
        .unwrap()
        .result
        .is_empty());
    let everything = stratadex_engine::KeySpace::root(&db.config().key_prefix).everything();
    let left = db.substrate().list(&everything, ListOptions::default()).await.unwrap();
    assert!(left.is_empty());

    // collections stay defined after a wipe
    users.write("fresh", 1i64).await.unwrap();
    assert_eq!(db.count_all().await.unwrap(), 1);
}

#[tokio::test]
async fn test_key_prefixes_isolate_databases() {
    let substrate: Arc<dyn Substrate> = Arc::new(MemorySubstrate::new());
    let a = Database::builder()
        .shared_substrate(Arc::clone(&substrate))
        .key_prefix("a")
        .open()
        .unwrap();
    let b = Database::builder()
        .shared_substrate(Arc::clone(&substrate))
        .key_prefix("b")
        .open()
        .unwrap();

    let in_a = a.collection("items", CollectionOptions::new()).unwrap();
    let in_b = b.collection("items", CollectionOptions::new()).unwrap();
    in_a.write("x", "from a").await.unwrap();
    in_b.write("x", "from b").await.unwrap();

    assert_eq!(in_a.find("x").await.unwrap().unwrap().value, Value::from("from a"));
    assert_eq!(in_b.find("x").await.unwrap().unwrap().value, Value::from("from b"));

    b.wipe().await.unwrap();
    assert!(in_b.find("x").await.unwrap().is_none());
    assert!(in_a.find("x").await.unwrap().is_some());
}

// ========== Metrics ==========

#[tokio::test]
async fn test_metrics_count_commits_and_conflicts() {
    let db = Database::in_memory();
    let c = db.collection("c", CollectionOptions::new()).unwrap();
    assert_eq!(db.metrics().total(), 0);
    assert_eq!(db.metrics().conflict_rate(), 0.0);

    assert!(c.set("k", 1i64, SetOptions::default()).await.unwrap().is_ok());
    assert!(!c.set("k", 2i64, SetOptions::default()).await.unwrap().is_ok());
    assert!(c.update("k", 3i64, UpdateStrategy::Replace).await.unwrap().is_ok());

    let metrics = db.metrics();
    assert_eq!(metrics.conflicted, 1);
    assert!(metrics.committed >= 2);
    assert!(metrics.conflict_rate() > 0.0);
}

#[tokio::test]
async fn test_debug_lists_collections() {
    let db = Database::in_memory();
    db.collection("visible", CollectionOptions::new()).unwrap();
    assert!(format!("{db:?}").contains("visible"));
}
