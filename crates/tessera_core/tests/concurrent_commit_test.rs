//! Integration test for optimistic concurrency on the in-memory store.

use std::sync::Arc;

use tessera_core::{
    BackingStore, Change, ChangeOutcome, Components, Delta, Entity, EntityId, Health, MemoryStore,
};

async fn seeded() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let entity = Entity::new(EntityId::new(1), Components::default().with(Health::full(100)));
    store.apply(vec![Change::Create { entity }]).await.unwrap();
    store
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commits_from_same_version() {
    let store = seeded().await;
    let base = store.get(EntityId::new(1)).await.unwrap().unwrap();

    let mut tasks = Vec::new();
    for hit in 1..=8u32 {
        let store = Arc::clone(&store);
        let base = base.clone();
        tasks.push(tokio::spawn(async move {
            let mut fork = Delta::fork(&base);
            fork.mutable::<Health>().damage(hit);
            let change = fork.into_change().unwrap();
            store.apply(vec![change]).await.unwrap()[0]
        }));
    }

    let mut applied = 0;
    for task in tasks {
        match task.await.unwrap() {
            ChangeOutcome::Applied(v) => {
                assert_eq!(v, 2);
                applied += 1;
            }
            ChangeOutcome::Conflict { expected, actual } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            ChangeOutcome::Aborted => panic!("single-change commit cannot abort"),
        }
    }
    assert_eq!(applied, 1);
}

#[tokio::test]
async fn test_retry_from_new_version_succeeds() {
    let store = seeded().await;
    let stale = store.get(EntityId::new(1)).await.unwrap().unwrap();

    let mut first = Delta::fork(&stale);
    first.mutable::<Health>().damage(10);
    store.apply(first.into_change().into_iter().collect()).await.unwrap();

    let mut second = Delta::fork(&stale);
    second.mutable::<Health>().damage(20);
    let out = store.apply(second.into_change().into_iter().collect()).await.unwrap();
    assert!(!out[0].is_applied());

    let fresh = store.get(EntityId::new(1)).await.unwrap().unwrap();
    let mut retry = Delta::fork(&fresh);
    retry.mutable::<Health>().damage(20);
    let out = store.apply(retry.into_change().into_iter().collect()).await.unwrap();
    assert_eq!(out, vec![ChangeOutcome::Applied(3)]);

    let done = store.get(EntityId::new(1)).await.unwrap().unwrap();
    assert_eq!(done.entity.components.get::<Health>().map(|h| h.current), Some(70));
}
