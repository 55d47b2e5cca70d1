use std::sync::Arc;

use practice_core::model::SetId;
use storage::keys;
use storage::repository::{InMemoryRepository, KeyValueStore, ProblemSetRepository, Storage};
use storage::sqlite::SqliteRepository;

#[tokio::test]
async fn sqlite_kv_round_trips_and_overwrites() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let key = keys::answers(&SetId::new("loops"));
    assert_eq!(repo.get(&key).await.unwrap(), None);

    repo.set(&key, r#"{"q1":"42"}"#).await.unwrap();
    repo.set(&key, r#"{"q1":"43"}"#).await.unwrap();
    assert_eq!(repo.get(&key).await.unwrap().as_deref(), Some(r#"{"q1":"43"}"#));

    repo.remove(&key).await.unwrap();
    assert_eq!(repo.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("first migrate");
    repo.migrate().await.expect("second migrate");

    repo.set("stepcode:practiceMode", "\"class\"").await.unwrap();
    assert!(repo.get("stepcode:practiceMode").await.unwrap().is_some());
}

#[tokio::test]
async fn storage_sqlite_wires_values_and_sets() {
    let sets = Arc::new(InMemoryRepository::new());
    let storage = Storage::sqlite("sqlite:file:memdb_kv_storage?mode=memory&cache=shared", sets)
        .await
        .expect("storage");

    storage.values.set("k", "1").await.unwrap();
    assert_eq!(storage.values.get("k").await.unwrap().as_deref(), Some("1"));
    assert!(storage.sets.list_sets().await.unwrap().is_empty());
}
