//! Behavioral properties of collections
//!
//! Uniqueness, merge strategies, ordering, segmentation, pagination,
//! watch aggregation and atomicity, each checked end to end over a
//! `MemorySubstrate`.

use std::collections::BTreeSet;
use std::sync::{Arc, Once};
use std::time::Duration;

use parking_lot::Mutex;
use stratadex_core::{DocumentId, Entry, Error, Key, KeyPart, ListOptions, ListSelector, Value};
use stratadex_engine::keyspace::{PRIMARY_INDEX, SECONDARY_INDEX};
use stratadex_engine::{
    AtomicOutcome, CollectionOptions, Compression, Database, Document, FnModel, KeySpace,
    QueryOptions, SetOptions, UpdateStrategy,
};

fn object(pairs: Vec<(&str, Value)>) -> Value {
    Value::Object(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

fn ids(docs: &[Document]) -> Vec<DocumentId> {
    docs.iter().map(|d| d.id.clone()).collect()
}

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

// ========== Uniqueness ==========

#[tokio::test]
async fn test_primary_index_rejects_second_owner() {
    let db = Database::in_memory();
    let users = db
        .collection("users", CollectionOptions::new().primary_index("email"))
        .unwrap();

    let first = users
        .add(object(vec![("email", "a@x".into()), ("name", "Ann".into())]))
        .await
        .unwrap();
    let second = users
        .add(object(vec![("email", "a@x".into()), ("name", "Bob".into())]))
        .await
        .unwrap();

    assert!(first.is_ok());
    assert!(!second.is_ok());
    assert_eq!(users.count(QueryOptions::new()).await.unwrap(), 1);
    let owner = users.find_by_primary_index("email", "a@x").await.unwrap().unwrap();
    assert_eq!(&owner.id, first.id());
}

#[tokio::test]
async fn test_absent_indexed_field_is_optional() {
    let db = Database::in_memory();
    let users = db
        .collection("users", CollectionOptions::new().primary_index("email"))
        .unwrap();
    assert!(users.add(object(vec![("name", "a".into())])).await.unwrap().is_ok());
    assert!(users.add(object(vec![("name", "b".into())])).await.unwrap().is_ok());
    assert_eq!(users.count(QueryOptions::new()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_equal_floats_share_one_primary_value() {
    let db = Database::in_memory();
    let c = db
        .collection("points", CollectionOptions::new().primary_index("k"))
        .unwrap();
    assert_eq!(Value::Float(0.0), Value::Float(-0.0));

    assert!(c.add(object(vec![("k", Value::Float(0.0))])).await.unwrap().is_ok());
    assert!(!c.add(object(vec![("k", Value::Float(-0.0))])).await.unwrap().is_ok());
    assert_eq!(c.count(QueryOptions::new()).await.unwrap(), 1);
    assert!(c.find_by_primary_index("k", -0.0f64).await.unwrap().is_some());

    let nan = c.add(object(vec![("k", Value::Float(f64::NAN))])).await.unwrap_err();
    assert!(nan.is_validation());
}

#[tokio::test]
async fn test_dates_and_ints_are_distinct_primary_values() {
    let db = Database::in_memory();
    let c = db
        .collection("events", CollectionOptions::new().primary_index("k"))
        .unwrap();
    assert_ne!(Value::Int(5), Value::Date(5));

    let int_owner = c.add(object(vec![("k", Value::Int(5))])).await.unwrap();
    let date_owner = c.add(object(vec![("k", Value::Date(5))])).await.unwrap();
    let big_owner = c.add(object(vec![("k", Value::BigInt(5))])).await.unwrap();
    assert!(int_owner.is_ok() && date_owner.is_ok() && big_owner.is_ok());

    let by_int = c.find_by_primary_index("k", 5i64).await.unwrap().unwrap();
    assert_eq!(&by_int.id, int_owner.id());
    let by_date = c.find_by_primary_index("k", KeyPart::Date(5)).await.unwrap().unwrap();
    assert_eq!(&by_date.id, date_owner.id());
    let by_big = c.find_by_primary_index("k", KeyPart::BigInt(5)).await.unwrap().unwrap();
    assert_eq!(&by_big.id, big_owner.id());
}

async fn index_entries(db: &Database, collection: &str) -> Vec<Entry> {
    let base = KeySpace::new(&db.config().key_prefix, collection).base().clone();
    let mut entries = Vec::new();
    for role in [PRIMARY_INDEX, SECONDARY_INDEX] {
        let selector = ListSelector::prefix(&base.child(role));
        entries.extend(db.substrate().list(&selector, ListOptions::default()).await.unwrap());
    }
    entries
}

fn account(email: &str, city: &str) -> Value {
    object(vec![("email", email.into()), ("city", city.into())])
}

#[tokio::test]
async fn test_index_entries_track_current_values_exactly() {
    let db = Database::in_memory();
    let c = db
        .collection(
            "accounts",
            CollectionOptions::new().primary_index("email").secondary_index("city"),
        )
        .unwrap();
    c.write("u1", account("a@x", "oslo")).await.unwrap();
    c.write("u2", account("b@x", "rome")).await.unwrap();
    let before = index_entries(&db, "accounts").await;
    assert_eq!(before.len(), 4);

    // Taking a value owned by u1 changes nothing, old entries included.
    let stolen = c
        .update("u2", account("a@x", "paris"), UpdateStrategy::Merge)
        .await
        .unwrap();
    assert!(!stolen.is_ok());
    assert!(!c.write("u2", account("a@x", "paris")).await.unwrap().is_ok());
    assert_eq!(index_entries(&db, "accounts").await, before);
    assert_eq!(c.find("u2").await.unwrap().unwrap().value, account("b@x", "rome"));

    c.update("u2", account("c@x", "paris"), UpdateStrategy::Merge)
        .await
        .unwrap();
    c.delete("u1").await.unwrap();
    assert!(c.write("u3", account("a@x", "oslo")).await.unwrap().is_ok());

    let keys = KeySpace::new(&db.config().key_prefix, "accounts");
    let u2 = c.find("u2").await.unwrap().unwrap();
    let u3 = c.find("u3").await.unwrap().unwrap();
    let mut expected: Vec<(Key, _)> = vec![
        (keys.primary_index_key("email", &"c@x".into()), u2.versionstamp),
        (keys.secondary_index_key("city", &"paris".into(), &u2.id), u2.versionstamp),
        (keys.primary_index_key("email", &"a@x".into()), u3.versionstamp),
        (keys.secondary_index_key("city", &"oslo".into(), &u3.id), u3.versionstamp),
    ];
    expected.sort_by_key(|(k, _)| k.pack());
    let mut actual: Vec<_> = index_entries(&db, "accounts")
        .await
        .into_iter()
        .map(|e| (e.key, e.versionstamp))
        .collect();
    actual.sort_by_key(|(k, _)| k.pack());
    assert_eq!(actual, expected);
}

// ========== Merge strategies ==========

fn profile() -> Value {
    object(vec![
        ("name", "Ann".into()),
        (
            "address",
            object(vec![("city", "Oslo".into()), ("zip", "0150".into())]),
        ),
    ])
}

fn city_patch() -> Value {
    object(vec![("address", object(vec![("city", "Rome".into())]))])
}

#[tokio::test]
async fn test_merge_shallow_replaces_nested_objects() {
    let db = Database::in_memory();
    let c = db.collection("people", CollectionOptions::new()).unwrap();
    c.write("p", profile()).await.unwrap();
    c.update("p", city_patch(), UpdateStrategy::MergeShallow)
        .await
        .unwrap();

    let doc = c.find("p").await.unwrap().unwrap();
    assert_eq!(doc.get("name"), Some(&Value::from("Ann")));
    let address = doc.get("address").unwrap();
    assert_eq!(address.get("city"), Some(&Value::from("Rome")));
    assert!(address.get("zip").is_none());
}

#[tokio::test]
async fn test_merge_deep_keeps_nested_siblings() {
    let db = Database::in_memory();
    let c = db.collection("people", CollectionOptions::new()).unwrap();
    c.write("p", profile()).await.unwrap();
    c.update("p", city_patch(), UpdateStrategy::Merge).await.unwrap();

    let doc = c.find("p").await.unwrap().unwrap();
    let address = doc.get("address").unwrap();
    assert_eq!(address.get("city"), Some(&Value::from("Rome")));
    assert_eq!(address.get("zip"), Some(&Value::from("0150")));
}

#[tokio::test]
async fn test_update_many_reports_per_document() {
    let db = Database::in_memory();
    let c = db
        .collection("users", CollectionOptions::new().primary_index("email"))
        .unwrap();
    c.write("a", object(vec![("email", "a@x".into())])).await.unwrap();
    c.write("b", object(vec![("email", "b@x".into())])).await.unwrap();

    // Both try to take the same unique value: only the first can.
    let outcomes = c
        .update_many(
            object(vec![("email", "same@x".into())]),
            UpdateStrategy::Merge,
            QueryOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].as_ref().unwrap().is_ok());
    assert!(!outcomes[1].as_ref().unwrap().is_ok());
    let b = c.find("b").await.unwrap().unwrap();
    assert_eq!(b.get("email"), Some(&Value::from("b@x")));
}

fn guarded_collection(db: &Database) -> stratadex_engine::Collection {
    db.collection(
        "guarded",
        CollectionOptions::new()
            .primary_index("email")
            .model(FnModel::new(|v: Value| {
                if v.get("locked").is_some() && v.get("y").is_some() {
                    Err(Error::validation("locked documents cannot take y"))
                } else {
                    Ok(v)
                }
            })),
    )
    .unwrap()
}

#[tokio::test]
async fn test_bulk_writes_continue_past_rejected_document() {
    let db = Database::in_memory();
    let c = guarded_collection(&db);
    c.write("a", object(vec![("x", 1i64.into())])).await.unwrap();
    c.write("b", object(vec![("x", 1i64.into()), ("locked", Value::Bool(true))]))
        .await
        .unwrap();
    c.write("c", object(vec![("x", 1i64.into())])).await.unwrap();

    let outcomes = c
        .update_many(object(vec![("y", 1i64.into())]), UpdateStrategy::Merge, QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].as_ref().unwrap().is_ok());
    assert!(outcomes[1].as_ref().unwrap_err().is_validation());
    assert!(outcomes[2].as_ref().unwrap().is_ok());
    assert_eq!(c.find("c").await.unwrap().unwrap().get("y"), Some(&Value::Int(1)));
    assert!(c.find("b").await.unwrap().unwrap().get("y").is_none());

    let added = c
        .add_many(vec![
            object(vec![("x", 2i64.into())]),
            object(vec![("locked", Value::Bool(true)), ("y", 1i64.into())]),
            object(vec![("x", 3i64.into())]),
        ])
        .await;
    assert_eq!(added.len(), 3);
    assert!(added[0].as_ref().unwrap().is_ok());
    assert!(added[1].is_err());
    assert!(added[2].as_ref().unwrap().is_ok());
    assert_eq!(c.count(QueryOptions::new()).await.unwrap(), 5);
}

#[tokio::test]
async fn test_upsert_of_existing_document_ignores_set_value() {
    let db = Database::in_memory();
    let c = guarded_collection(&db);
    let rejected = object(vec![("locked", Value::Bool(true)), ("y", 1i64.into())]);
    c.write("u", object(vec![("email", "u@x".into()), ("x", 1i64.into())]))
        .await
        .unwrap();

    let by_id = c
        .upsert("u", rejected.clone(), object(vec![("x", 2i64.into())]), UpdateStrategy::Merge)
        .await
        .unwrap();
    assert!(by_id.is_ok());
    let by_email = c
        .upsert_by_primary_index(
            "email",
            "u@x",
            rejected.clone(),
            object(vec![("x", 3i64.into())]),
            UpdateStrategy::Merge,
        )
        .await
        .unwrap();
    assert!(by_email.is_ok());
    assert_eq!(c.find("u").await.unwrap().unwrap().get("x"), Some(&Value::Int(3)));

    let missing = c
        .upsert("v", rejected, object(vec![("x", 1i64.into())]), UpdateStrategy::Merge)
        .await
        .unwrap_err();
    assert!(missing.is_validation());
}

// ========== Ordering and pagination ==========

async fn numbered(db: &Database, n: i64) -> stratadex_engine::Collection {
    let c = db
        .collection("items", CollectionOptions::new().secondary_index("group"))
        .unwrap();
    for i in 0..n {
        c.write(i, object(vec![("group", (i % 3).into())])).await.unwrap();
    }
    c
}

#[tokio::test]
async fn test_reverse_is_exact_mirror() {
    let db = Database::builder().default_batch_size(4).open().unwrap();
    let c = numbered(&db, 11).await;

    let forward = c.get_many(QueryOptions::new()).await.unwrap();
    let mut backward = c.get_many(QueryOptions::new().reverse()).await.unwrap().result;
    backward.reverse();
    assert_eq!(ids(&forward.result), ids(&backward));

    let by_group = c
        .get_many_by_secondary_order("group", QueryOptions::new())
        .await
        .unwrap();
    let mut by_group_rev = c
        .get_many_by_secondary_order("group", QueryOptions::new().reverse())
        .await
        .unwrap()
        .result;
    by_group_rev.reverse();
    assert_eq!(ids(&by_group.result), ids(&by_group_rev));
}

#[tokio::test]
async fn test_cursor_pages_partition_the_range() {
    let db = Database::builder().default_batch_size(2).open().unwrap();
    let c = numbered(&db, 13).await;
    let everything = ids(&c.get_many(QueryOptions::new()).await.unwrap().result);

    for reverse in [false, true] {
        let mut seen = Vec::new();
        let mut cursor = None;
        let mut pages = 0;
        loop {
            let mut options = QueryOptions::new().limit(4).maybe_cursor(cursor.take());
            if reverse {
                options = options.reverse();
            }
            let page = c.get_many(options).await.unwrap();
            seen.extend(ids(&page.result));
            pages += 1;
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        if reverse {
            seen.reverse();
        }
        assert_eq!(seen, everything);
        assert!(pages >= 4);
    }
}

#[tokio::test]
async fn test_cursor_from_another_range_is_rejected() {
    let db = Database::in_memory();
    let c = numbered(&db, 5).await;
    let page = c
        .get_many_by_secondary_order("group", QueryOptions::new().limit(1))
        .await
        .unwrap();
    let cursor = page.cursor.unwrap();
    let err = c
        .get_many(QueryOptions::new().cursor(cursor))
        .await
        .unwrap_err();
    assert!(matches!(err, stratadex_core::Error::InvalidKey(_)));
}

#[tokio::test]
async fn test_limit_bounds_consumption_not_matches() {
    let db = Database::in_memory();
    let c = numbered(&db, 9).await;
    let only_zero = |d: &Document| d.get("group") == Some(&Value::Int(0));

    let limited = c
        .get_many(QueryOptions::new().limit(4).filter(only_zero))
        .await
        .unwrap();
    assert_eq!(ids(&limited.result), vec![DocumentId::Int(0), DocumentId::Int(3)]);

    let taken = c
        .get_many(QueryOptions::new().take(3).filter(only_zero))
        .await
        .unwrap();
    assert_eq!(
        ids(&taken.result),
        vec![DocumentId::Int(0), DocumentId::Int(3), DocumentId::Int(6)]
    );

    let offset = c.get_many(QueryOptions::new().offset(7)).await.unwrap();
    assert_eq!(ids(&offset.result), vec![DocumentId::Int(7), DocumentId::Int(8)]);
    assert!(offset.cursor.is_none());
}

// ========== Segmentation ==========

fn large_value(len: usize) -> Value {
    let text: String = (0..len).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    object(vec![("body", text.into()), ("bytes", Value::Bytes(vec![9; len / 2]))])
}

async fn chunk_count(db: &Database, collection: &str, id: &str) -> usize {
    let prefix = KeySpace::new(&db.config().key_prefix, collection).segment_prefix(&id.into());
    db.substrate()
        .list(&ListSelector::prefix(&prefix), ListOptions::default())
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn test_segmented_round_trip() {
    init_tracing();
    let db = Database::builder().max_value_bytes(128).open().unwrap();
    for compression in [Compression::None, Compression::zstd()] {
        let name = format!("blobs_{}", matches!(compression, Compression::None));
        let c = db
            .collection(&name, CollectionOptions::new().segmented(true).compression(compression))
            .unwrap();
        for value in [Value::object(), large_value(10), large_value(5_000)] {
            let outcome = c.write("doc", value.clone()).await.unwrap();
            let found = c.find(outcome.id().clone()).await.unwrap().unwrap();
            assert_eq!(found.value, value);
        }
    }
}

#[tokio::test]
async fn test_shrinking_value_drops_trailing_chunks() {
    init_tracing();
    let db = Database::builder().max_value_bytes(64).open().unwrap();
    let c = db
        .collection("blobs", CollectionOptions::new().segmented(true))
        .unwrap();

    c.write("doc", large_value(2_000)).await.unwrap();
    let before = chunk_count(&db, "blobs", "doc").await;
    c.write("doc", large_value(100)).await.unwrap();
    let after = chunk_count(&db, "blobs", "doc").await;
    assert!(after < before);
    assert_eq!(c.find("doc").await.unwrap().unwrap().value, large_value(100));

    c.delete("doc").await.unwrap();
    assert_eq!(chunk_count(&db, "blobs", "doc").await, 0);
}

// ========== Watch aggregation ==========

#[tokio::test]
async fn test_watch_many_fires_once_per_change() {
    init_tracing();
    let db = Database::in_memory();
    let c = db.collection("w", CollectionOptions::new()).unwrap();
    c.write("c", object(vec![("v", 1i64.into())])).await.unwrap();

    let calls: Arc<Mutex<Vec<Vec<Option<Document>>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let handle = c
        .watch_many(["a", "b", "c"], move |docs| sink.lock().push(docs))
        .await
        .unwrap();

    c.write("a", object(vec![("v", 1i64.into())])).await.unwrap();
    c.delete("a").await.unwrap();
    c.write("b", object(vec![("v", 2i64.into())])).await.unwrap();
    c.update("c", object(vec![("v", 3i64.into())]), UpdateStrategy::Merge)
        .await
        .unwrap();

    wait_for(|| calls.lock().len() >= 4).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel().await;

    let calls = calls.lock();
    assert_eq!(calls.len(), 4);
    let last = &calls[3];
    assert!(last[0].is_none());
    assert_eq!(last[1].as_ref().unwrap().get("v"), Some(&Value::Int(2)));
    assert_eq!(last[2].as_ref().unwrap().get("v"), Some(&Value::Int(3)));
}

#[tokio::test]
async fn test_watch_reports_initial_then_changes() {
    let db = Database::in_memory();
    let c = db.collection("w", CollectionOptions::new()).unwrap();
    let seen: Arc<Mutex<Vec<Option<Value>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handle = c
        .watch("x", move |doc| sink.lock().push(doc.map(|d| d.value)))
        .await
        .unwrap();

    c.write("x", 1i64).await.unwrap();
    c.delete("x").await.unwrap();
    wait_for(|| seen.lock().len() >= 3).await;
    handle.cancel().await;

    assert_eq!(*seen.lock(), vec![None, Some(Value::Int(1)), None]);
}

#[tokio::test]
async fn test_deleting_absent_document_is_not_a_change() {
    let db = Database::in_memory();
    let c = db.collection("w", CollectionOptions::new()).unwrap();
    let calls: Arc<Mutex<Vec<Vec<Option<Document>>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let handle = c
        .watch_many(["a", "b"], move |docs| sink.lock().push(docs))
        .await
        .unwrap();

    assert!(c.delete("a").await.unwrap().is_ok());
    c.write("b", 1i64).await.unwrap();

    wait_for(|| !calls.lock().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel().await;

    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    assert!(calls[0][0].is_none());
    assert_eq!(calls[0][1].as_ref().unwrap().value, Value::Int(1));
}

// ========== Atomicity ==========

#[tokio::test]
async fn test_batched_set_and_delete_of_one_id_fails_whole() {
    init_tracing();
    let db = Database::in_memory();
    let users = db
        .collection("users", CollectionOptions::new().primary_index("email"))
        .unwrap();
    let original = object(vec![("email", "a@x".into())]);
    users.write("u", original.clone()).await.unwrap();

    let outcome = users
        .atomic()
        .set("u", object(vec![("email", "b@x".into())]), SetOptions::default())
        .unwrap()
        .delete("u")
        .unwrap()
        .commit()
        .await
        .unwrap();

    assert_eq!(outcome, AtomicOutcome::Conflict);
    assert_eq!(users.find("u").await.unwrap().unwrap().value, original);
    assert!(users.find_by_primary_index("email", "a@x").await.unwrap().is_some());
    assert!(users.find_by_primary_index("email", "b@x").await.unwrap().is_none());
}

#[tokio::test]
async fn test_stale_versionstamp_loses_race() {
    let db = Database::in_memory();
    let c = db
        .collection("c", CollectionOptions::new().secondary_index("n"))
        .unwrap();
    c.write("a", object(vec![("n", 1i64.into())])).await.unwrap();
    let seen = c.find("a").await.unwrap().unwrap();

    c.update("a", object(vec![("n", 2i64.into())]), UpdateStrategy::Merge)
        .await
        .unwrap();

    let outcome = c
        .atomic()
        .check("a", Some(seen.versionstamp))
        .unwrap()
        .delete("a")
        .unwrap()
        .commit()
        .await
        .unwrap();
    assert!(!outcome.is_ok());

    let groups: BTreeSet<_> = c
        .get_many_by_secondary_order("n", QueryOptions::new())
        .await
        .unwrap()
        .result
        .into_iter()
        .filter_map(|d| d.get("n").and_then(Value::as_int))
        .collect();
    assert_eq!(groups, BTreeSet::from([2]));
}
