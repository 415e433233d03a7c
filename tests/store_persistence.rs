use std::time::Duration;

use chrono::Utc;

use aegis_security::store::{RestorationRecord, Store};

/// Wait until the writer task has flushed a parseable document that
/// satisfies `pred`, or give up after a couple of seconds.
async fn wait_for_file(
    path: &std::path::Path,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    for _ in 0..200 {
        if let Ok(bytes) = tokio::fs::read(path).await {
            if let Ok(doc) = serde_json::from_slice::<serde_json::Value>(&bytes) {
                if pred(&doc) {
                    return doc;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("document never reached the expected state at {}", path.display());
}

#[tokio::test]
async fn document_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("security_data.json");

    {
        let store = Store::open(&path).await.unwrap();
        store.set_option(1, "role_delete_punishment", "ban").await.unwrap();
        store.whitelist_add(1, 42).await;
        store.push_log(1, "title", "description").await;
        store
            .put_restoration(
                55,
                RestorationRecord {
                    guild_id: 1,
                    roles: vec![10, 20],
                    reason: "deleted channel #general".into(),
                    removed_at: Utc::now(),
                },
            )
            .await;

        wait_for_file(&path, |doc| doc["restorations"].get("55").is_some()).await;
    }

    // fresh process: load the document back
    let store = Store::open(&path).await.unwrap();
    let cfg = store.guild_config(1).await;
    assert_eq!(cfg.option_value("role_delete_punishment").unwrap(), "ban");
    assert!(cfg.whitelist.contains(&42));

    let logs = store.recent_logs(1, 10).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].title, "title");

    let record = store.peek_restoration(55).await.unwrap();
    assert_eq!(record.roles, vec![10, 20]);
    assert_eq!(record.reason, "deleted channel #general");
}

#[tokio::test]
async fn missing_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does_not_exist_yet.json");

    let store = Store::open(&path).await.unwrap();
    assert!(store.recent_logs(1, 10).await.is_empty());
    assert!(store.peek_restoration(1).await.is_none());

    // first mutation creates the file
    store.push_log(1, "t", "d").await;
    wait_for_file(&path, |doc| {
        doc["logs"]["1"].as_array().map(|a| a.len()) == Some(1)
    })
    .await;
}

#[tokio::test]
async fn status_counts_reflect_the_document() {
    let store = Store::in_memory();
    store.push_log(1, "a", "b").await;
    store.push_log(1, "c", "d").await;
    store
        .put_restoration(
            9,
            RestorationRecord {
                guild_id: 1,
                roles: vec![1],
                reason: "r".into(),
                removed_at: Utc::now(),
            },
        )
        .await;
    store
        .put_restoration(
            10,
            RestorationRecord {
                guild_id: 2, // other guild: not counted for guild 1
                roles: vec![1],
                reason: "r".into(),
                removed_at: Utc::now(),
            },
        )
        .await;

    let status = store.status(1).await;
    assert_eq!(status.log_count, 2);
    assert_eq!(status.pending_restorations, 1);
    assert_eq!(status.warned_users, 0);
    assert!(status.config.protection_enabled);

    let protections = status.config.active_protections();
    assert!(protections.contains(&"deletion protection"));
    // new-account screening is off by default
    assert!(!protections.contains(&"new-account screening"));
}
