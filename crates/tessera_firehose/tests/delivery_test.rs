//! Integration test for firehose delivery semantics.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tessera_core::{CancelToken, EntityId};
use tessera_firehose::{
    Fact, FactPayload, FileTransport, Firehose, FirehoseConfig, FirehoseError, LogTransport,
    MemoryTransport,
};

fn label(n: u64) -> Fact {
    Fact::new(FactPayload::LabelChanged {
        entity: EntityId::new(n),
        label: format!("label-{n}"),
    })
}

fn memory_firehose() -> Firehose {
    let config = FirehoseConfig {
        poll_interval_ms: 5,
        ..FirehoseConfig::default()
    };
    Firehose::new(Arc::new(MemoryTransport::new()), config)
}

const SHORT_TTL: Duration = Duration::from_millis(50);

#[tokio::test]
async fn test_unacked_batch_is_redelivered() {
    let firehose = memory_firehose();
    let fact = label(1);
    firehose.publish(vec![fact.clone()]).await.unwrap();

    let mut sub = firehose.subscribe("quests", SHORT_TTL, CancelToken::new());
    let first = sub.next().await.unwrap().unwrap();
    assert_eq!(first.attempt, 1);
    assert_eq!(first.facts[0].id, fact.id);
    drop(first);

    let again = tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("redelivered within timeout")
        .unwrap()
        .unwrap();
    assert_eq!(again.offset, 0);
    assert_eq!(again.attempt, 2);
    assert_eq!(again.facts[0].id, fact.id);
    assert!(again.ack().await.unwrap());
    assert_eq!(firehose.stats().redeliveries.load(std::sync::atomic::Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_acked_batch_is_never_redelivered() {
    let firehose = memory_firehose();
    firehose.publish(vec![label(1)]).await.unwrap();

    let cancel = CancelToken::new();
    let mut sub = firehose.subscribe("chat", SHORT_TTL, cancel.clone());
    let delivery = sub.next().await.unwrap().unwrap();
    assert!(delivery.ack().await.unwrap());
    assert!(!delivery.ack().await.unwrap());

    let waited = tokio::time::timeout(SHORT_TTL * 4, sub.next()).await;
    assert!(waited.is_err(), "acked batch must not come back");
    assert_eq!(firehose.pending("chat"), 0);

    cancel.cancel();
    assert!(sub.next().await.is_none());
}

#[tokio::test]
async fn test_groups_each_see_every_batch() {
    let firehose = memory_firehose();
    for n in 0..3 {
        firehose.publish(vec![label(n)]).await.unwrap();
    }

    for group in ["chat", "quests"] {
        let mut sub = firehose.subscribe(group, Duration::from_secs(30), CancelToken::new());
        let mut offsets = Vec::new();
        for _ in 0..3 {
            let d = sub.next().await.unwrap().unwrap();
            d.ack().await.unwrap();
            offsets.push(d.offset);
        }
        assert_eq!(offsets, vec![0, 1, 2]);
    }
}

#[tokio::test]
async fn test_members_of_a_group_compete() {
    let firehose = memory_firehose();
    for n in 0..6 {
        firehose.publish(vec![label(n)]).await.unwrap();
    }

    let ttl = Duration::from_secs(30);
    let mut a = firehose.subscribe("clients", ttl, CancelToken::new());
    let mut b = firehose.subscribe("clients", ttl, CancelToken::new());
    let mut seen = HashSet::new();
    for _ in 0..3 {
        let da = a.next().await.unwrap().unwrap();
        let db = b.next().await.unwrap().unwrap();
        assert!(seen.insert(da.offset));
        assert!(seen.insert(db.offset));
        da.ack().await.unwrap();
        db.ack().await.unwrap();
    }
    assert_eq!(seen.len(), 6);
}

#[tokio::test]
async fn test_subscriber_wakes_on_publish() {
    let firehose = memory_firehose();
    let cancel = CancelToken::new();
    let stream = firehose
        .subscribe("terrain", Duration::from_secs(30), cancel.clone())
        .into_stream();

    let consumer = tokio::spawn(async move {
        let mut stream = Box::pin(stream);
        let mut received = Vec::new();
        while let Some(delivery) = stream.next().await {
            let delivery = delivery.unwrap();
            delivery.ack().await.unwrap();
            received.extend(delivery.facts.into_iter().map(|f| f.id));
        }
        received
    });

    let facts = vec![label(1), label(2)];
    let ids: Vec<_> = facts.iter().map(|f| f.id).collect();
    firehose.publish(facts).await.unwrap();
    while firehose.stats().acks.load(std::sync::atomic::Ordering::Relaxed) < 1 {
        tokio::task::yield_now().await;
    }
    cancel.cancel();

    assert_eq!(consumer.await.unwrap(), ids);
}

#[tokio::test]
async fn test_publish_writes_one_record() {
    let config = FirehoseConfig {
        max_batch_facts: 4,
        ..FirehoseConfig::default()
    };
    let transport = Arc::new(MemoryTransport::new());
    let firehose = Firehose::new(transport.clone(), config);

    let facts: Vec<Fact> = (0..4).map(label).collect();
    assert_eq!(firehose.publish(facts.clone()).await.unwrap(), Some(0));
    assert_eq!(transport.head().await.unwrap(), 1);

    let oversized = firehose.publish((0..5).map(label).collect()).await;
    assert!(matches!(
        oversized,
        Err(FirehoseError::BatchTooLarge { facts: 5, limit: 4 })
    ));
    assert_eq!(transport.head().await.unwrap(), 1);
    assert_eq!(firehose.publish(Vec::new()).await.unwrap(), None);

    let mut sub = firehose.subscribe("chat", Duration::from_secs(30), CancelToken::new());
    let delivery = sub.next().await.unwrap().unwrap();
    let ids: Vec<_> = delivery.facts.iter().map(|f| f.id).collect();
    assert_eq!(ids, facts.iter().map(|f| f.id).collect::<Vec<_>>());
}

fn temp_log_path(tag: &str) -> std::path::PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("test_firehose_{tag}_{id}.log"))
}

fn file_firehose(path: &std::path::Path) -> Firehose {
    let config = FirehoseConfig {
        poll_interval_ms: 5,
        ..FirehoseConfig::default()
    };
    Firehose::new(Arc::new(FileTransport::open(path).unwrap()), config)
}

#[tokio::test]
async fn test_acked_batch_stays_acked_after_restart() {
    let path = temp_log_path("restart");
    let (acked, unacked) = (label(7), label(8));

    {
        let firehose = file_firehose(&path);
        firehose.publish(vec![acked.clone()]).await.unwrap();
        firehose.publish(vec![unacked.clone()]).await.unwrap();
        let mut sub = firehose.subscribe("chat", Duration::from_secs(30), CancelToken::new());
        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.facts[0].id, acked.id);
        assert!(first.ack().await.unwrap());
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.facts[0].id, unacked.id);
    }

    let firehose = file_firehose(&path);
    let mut sub = firehose.subscribe("chat", Duration::from_secs(30), CancelToken::new());
    let replayed = sub.next().await.unwrap().unwrap();
    assert_eq!(replayed.offset, 1);
    assert_eq!(replayed.facts[0].id, unacked.id);
    assert!(replayed.ack().await.unwrap());

    let waited = tokio::time::timeout(Duration::from_millis(100), sub.next()).await;
    assert!(waited.is_err(), "acked batches must not come back after a restart");

    let mut other = firehose.subscribe("quests", Duration::from_secs(30), CancelToken::new());
    assert_eq!(other.next().await.unwrap().unwrap().offset, 0);

    let acks_path = {
        let mut name = path.clone().into_os_string();
        name.push(".acks");
        name
    };
    drop((sub, other, firehose));
    std::fs::remove_file(&path).ok();
    std::fs::remove_file(acks_path).ok();
}
