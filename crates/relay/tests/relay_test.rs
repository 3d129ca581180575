mod common;

use std::sync::Arc;
use std::time::Duration;

use alert_relay::{
    alert::{STATUS_FIRING, STATUS_RESOLVED},
    fingerprint::message_id,
    notifier::{REACTION_FIRING, REACTION_RESOLVED},
    processor::Delivery,
    store::{create_store, DatabaseConfig, DatabaseType, LeaseStore, MemoryStore, LOCK_TTL},
    Error,
};
use common::{alert, processor, BrokenStore, Reaction, RecordingChat, CHANNEL, TOPIC};
use tokio_util::sync::CancellationToken;

fn sqlite_config(dir: &tempfile::TempDir) -> DatabaseConfig {
    DatabaseConfig {
        db_type: DatabaseType::Sqlite,
        sqlite_path: Some(dir.path().join("relay.db")),
        ..DatabaseConfig::default()
    }
}

#[tokio::test]
async fn test_redelivered_alert_is_published_once() {
    let chat = Arc::new(RecordingChat::default());
    let relay = processor(Arc::new(MemoryStore::new()), chat.clone());
    let firing = alert("DiskFull", STATUS_FIRING);

    let first = relay
        .process_alert(TOPIC, &firing, &CancellationToken::new())
        .await
        .unwrap();
    let second = relay
        .process_alert(TOPIC, &firing, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(first, Delivery::Published { .. }));
    assert!(matches!(second, Delivery::AlreadyDelivered { .. }));
    assert_eq!(chat.posts().len(), 1);
}

#[tokio::test]
async fn test_resolution_threads_under_first_post() {
    let chat = Arc::new(RecordingChat::default());
    let relay = processor(Arc::new(MemoryStore::new()), chat.clone());

    let Delivery::Published { message_ts: root, .. } = relay
        .process_alert(TOPIC, &alert("DiskFull", STATUS_FIRING), &CancellationToken::new())
        .await
        .unwrap()
    else {
        panic!("firing alert was not published");
    };
    relay
        .process_alert(TOPIC, &alert("DiskFull", STATUS_RESOLVED), &CancellationToken::new())
        .await
        .unwrap();

    let posts = chat.posts();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].thread_ts, None);
    assert_eq!(posts[0].attachment.title, "FIRING: DiskFull");
    assert_eq!(posts[1].thread_ts.as_deref(), Some(root.as_str()));
    assert_eq!(posts[1].attachment.title, "RESOLVED: DiskFull");
    assert!(posts[1].attachment.footer.is_some());

    // every reaction lands on the root post
    let reactions = chat.reactions();
    assert_eq!(reactions.len(), 4);
    let emojis: Vec<_> = reactions
        .iter()
        .map(|r| match r {
            Reaction::Added(item, emoji) => {
                assert_eq!(item.timestamp, root);
                format!("+{emoji}")
            }
            Reaction::Removed(item, emoji) => {
                assert_eq!(item.timestamp, root);
                format!("-{emoji}")
            }
        })
        .collect();
    assert_eq!(
        emojis,
        vec![
            format!("+{REACTION_FIRING}"),
            format!("-{REACTION_RESOLVED}"),
            format!("+{REACTION_RESOLVED}"),
            format!("-{REACTION_FIRING}"),
        ]
    );
}

#[tokio::test]
async fn test_distinct_alerts_open_distinct_threads() {
    let chat = Arc::new(RecordingChat::default());
    let relay = processor(Arc::new(MemoryStore::new()), chat.clone());

    for name in ["DiskFull", "HighLatency"] {
        relay
            .process_alert(TOPIC, &alert(name, STATUS_FIRING), &CancellationToken::new())
            .await
            .unwrap();
    }

    assert!(chat.posts().iter().all(|post| post.thread_ts.is_none()));
}

#[tokio::test]
async fn test_lock_contention_posts_one_emergency_message() {
    let kv = Arc::new(MemoryStore::new());
    let chat = Arc::new(RecordingChat::default());
    let firing = alert("DiskFull", STATUS_FIRING);

    let other_sender = LeaseStore::new(kv.clone());
    assert!(other_sender
        .try_acquire(TOPIC, &message_id(CHANNEL, &firing), LOCK_TTL)
        .await
        .unwrap());

    let err = processor(kv, chat.clone())
        .process_alert(TOPIC, &firing, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_contention());
    let posts = chat.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].thread_ts, None);
    assert!(chat.reactions().is_empty());
}

#[tokio::test]
async fn test_lock_expires_for_the_next_sender() {
    let kv = Arc::new(MemoryStore::new());
    let store = LeaseStore::new(kv);

    assert!(store.try_acquire(TOPIC, "message/x", LOCK_TTL).await.unwrap());
    assert!(!store.try_acquire(TOPIC, "message/x", LOCK_TTL).await.unwrap());

    tokio::time::sleep(LOCK_TTL + Duration::from_millis(100)).await;
    assert!(store.try_acquire(TOPIC, "message/x", LOCK_TTL).await.unwrap());
}

#[tokio::test]
async fn test_unavailable_store_still_delivers() {
    let chat = Arc::new(RecordingChat::default());

    let err = processor(Arc::new(BrokenStore), chat.clone())
        .process_alert(TOPIC, &alert("DiskFull", STATUS_FIRING), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Store(_)));
    let posts = chat.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].thread_ts, None);
}

#[tokio::test]
async fn test_chat_outage_reports_both_attempts() {
    let chat = Arc::new(RecordingChat::default());
    chat.fail_posts(true);

    let err = processor(Arc::new(MemoryStore::new()), chat.clone())
        .process_alert(TOPIC, &alert("DiskFull", STATUS_FIRING), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::Multiple(errors) => assert_eq!(errors.len(), 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_dedup_survives_restart_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let chat = Arc::new(RecordingChat::default());
    let firing = alert("DiskFull", STATUS_FIRING);

    {
        let kv = create_store(&sqlite_config(&dir)).await.unwrap();
        processor(kv, chat.clone())
            .process_alert(TOPIC, &firing, &CancellationToken::new())
            .await
            .unwrap();
    }

    let kv = create_store(&sqlite_config(&dir)).await.unwrap();
    let again = processor(kv, chat.clone())
        .process_alert(TOPIC, &firing, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(again, Delivery::AlreadyDelivered { .. }));
    assert_eq!(chat.posts().len(), 1);
}

#[tokio::test]
async fn test_concurrent_senders_get_one_lock_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = LeaseStore::new(create_store(&sqlite_config(&dir)).await.unwrap());

    let attempts = (0..8).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { store.try_acquire(TOPIC, "message/x", LOCK_TTL).await })
    });
    let results = futures::future::join_all(attempts).await;

    let acquired = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(acquired, 1);
}

#[tokio::test]
async fn test_topics_do_not_share_dedup_state() {
    let chat = Arc::new(RecordingChat::default());
    let relay = processor(Arc::new(MemoryStore::new()), chat.clone());
    let firing = alert("DiskFull", STATUS_FIRING);

    for topic in ["arn:topic:a", "arn:topic:b"] {
        relay
            .process_alert(topic, &firing, &CancellationToken::new())
            .await
            .unwrap();
    }

    assert_eq!(chat.posts().len(), 2);
}
