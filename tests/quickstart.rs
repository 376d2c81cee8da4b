//! End-to-end use of the public facade

use std::collections::BTreeMap;

use stratadex::{
    AtomicOutcome, CollectionOptions, Database, QueryOptions, SetOptions, UpdateStrategy, Value,
};

fn user(email: &str, age: i64) -> Value {
    let mut fields = BTreeMap::new();
    fields.insert("email".to_string(), Value::from(email));
    fields.insert("age".to_string(), Value::Int(age));
    Value::Object(fields)
}

#[tokio::test]
async fn test_quickstart_flow() {
    let db = Database::in_memory();
    let users = db
        .collection(
            "users",
            CollectionOptions::new().primary_index("email").secondary_index("age"),
        )
        .unwrap();
    let counters = db.collection("counters", CollectionOptions::new()).unwrap();

    let ann = users.add(user("ann@x", 30)).await.unwrap();
    assert!(ann.is_ok());
    users.set("bob", user("bob@x", 30), SetOptions::default()).await.unwrap();
    users.set("cid", user("cid@x", 41), SetOptions::default()).await.unwrap();

    let thirty = users
        .find_by_secondary_index("age", 30i64, QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(thirty.result.len(), 2);

    let outcome = db
        .atomic()
        .select(&users)
        .delete("cid")
        .unwrap()
        .select(&counters)
        .sum("users_removed", 1)
        .unwrap()
        .commit()
        .await
        .unwrap();
    assert!(matches!(outcome, AtomicOutcome::Committed { .. }));
    assert_eq!(users.count(QueryOptions::new()).await.unwrap(), 2);

    users
        .update("bob", user("bob@y", 31), UpdateStrategy::MergeShallow)
        .await
        .unwrap();
    let bob = users.find_by_primary_index("email", "bob@y").await.unwrap().unwrap();
    assert_eq!(bob.id.as_str(), Some("bob"));
    assert!(users.find_by_primary_index("email", "bob@x").await.unwrap().is_none());
}
