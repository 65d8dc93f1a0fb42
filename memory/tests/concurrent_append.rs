use memory::InMemoryConversationStore;
use orch_core::{ConversationStore, Role};
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_get_distinct_ordered_sequences() {
    let store = Arc::new(InMemoryConversationStore::new(0));
    let writers = 64;

    let handles: Vec<_> = (0..writers)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .append("shared", Role::User, &format!("message {i}"), None)
                    .await
                    .unwrap()
                    .unwrap()
            })
        })
        .collect();

    let appended = futures_util::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect::<Vec<_>>();

    let sequences: HashSet<u64> = appended.iter().map(|t| t.sequence).collect();
    assert_eq!(sequences.len(), writers);

    let stored = store.turns("shared").await.unwrap();
    assert_eq!(stored.len(), writers);
    assert!(stored.windows(2).all(|w| w[0].sequence < w[1].sequence));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_respect_retention_window() {
    let store = Arc::new(InMemoryConversationStore::new(10));

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .append("bounded", Role::Assistant, &i.to_string(), None)
                    .await
                    .unwrap();
            })
        })
        .collect();
    futures_util::future::join_all(handles).await;

    let stored = store.turns("bounded").await.unwrap();
    assert_eq!(stored.len(), 10);
    let max = stored.iter().map(|t| t.sequence).max().unwrap();
    assert_eq!(stored.last().unwrap().sequence, max);
}
