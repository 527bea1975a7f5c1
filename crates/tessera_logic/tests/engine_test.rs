//! Integration test for the transaction engine against the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tessera_core::{
    BackingStore, Bounds, CancelToken, Change, ChangeOutcome, ComponentMask, Components, CreatedBy,
    Entity, EntityId, Health, Inventory, ItemDrop, ItemStack, Label, MemoryStore, Position,
    SequentialIds, StoreResult, Terrain, Vec3, VersionedEntity, MAX_WATER_LEVEL,
};
use tessera_firehose::{FactPayload, Firehose, FirehoseConfig, MemoryTransport};
use tessera_logic::{
    Engine, EngineConfig, EngineError, Event, EventKind, HandlerError, Outcome,
};
use tessera_replica::{ReplicaConfig, ReplicaTable};

const TERRAIN: u64 = 5;
const ALICE: u64 = 1;
const BOB: u64 = 2;

struct World {
    store: Arc<MemoryStore>,
    firehose: Firehose,
    engine: Engine,
}

async fn world(config: EngineConfig, entities: Vec<Entity>) -> World {
    let store = Arc::new(MemoryStore::new());
    for entity in entities {
        store.apply(vec![Change::Create { entity }]).await.unwrap();
    }
    let replica = Arc::new(ReplicaTable::new(ComponentMask::EMPTY, &ReplicaConfig::default()));
    replica.bootstrap(store.snapshot());

    let firehose = Firehose::new(Arc::new(MemoryTransport::new()), FirehoseConfig::default());
    let engine = Engine::new(
        Arc::clone(&store) as Arc<dyn BackingStore>,
        Arc::new(SequentialIds::starting_at(1000)),
        firehose.clone(),
        config,
    )
    .with_replica(replica);
    World {
        store,
        firehose,
        engine,
    }
}

fn terrain_shard() -> Entity {
    let terrain = Terrain::new(0, 0, 16);
    let bounds = Bounds(terrain.bounds(0.0, 256.0));
    Entity::new(
        EntityId::new(TERRAIN),
        Components::default().with(terrain).with(bounds),
    )
}

fn player(raw: u64, x: f32, items: &[ItemStack]) -> Entity {
    let mut inventory = Inventory::default();
    for stack in items {
        inventory.add(*stack);
    }
    Entity::new(
        EntityId::new(raw),
        Components::default()
            .with(Position::new(x, 0.0, 0.0))
            .with(Health::full(20))
            .with(inventory),
    )
}

async fn read(store: &MemoryStore, raw: u64) -> Option<VersionedEntity> {
    store.get(EntityId::new(raw)).await.unwrap()
}

async fn published(firehose: &Firehose) -> Vec<FactPayload> {
    let mut sub = firehose.subscribe("test", Duration::from_secs(30), CancelToken::new());
    let mut payloads = Vec::new();
    let head = firehose.stats().batches_published.load(Ordering::Relaxed);
    for _ in 0..head {
        let delivery = sub.next().await.unwrap().unwrap();
        delivery.ack().await.unwrap();
        payloads.extend(delivery.facts.into_iter().map(|f| f.payload));
    }
    payloads
}

#[tokio::test]
async fn test_dump_water_fills_terrain_cell() {
    let w = world(EngineConfig::default(), vec![terrain_shard(), player(ALICE, 10.0, &[])]).await;
    let position = Vec3::new(10.0, 5.0, 10.0);

    let outcome = w
        .engine
        .process(Event::DumpWater {
            actor: EntityId::new(ALICE),
            position,
        })
        .await;

    assert!(matches!(outcome, Outcome::Committed { facts: 0 }));
    let shard = read(&w.store, TERRAIN).await.unwrap();
    assert_eq!(shard.version, 2);
    let terrain = shard.entity.components.get::<Terrain>().unwrap();
    assert_eq!(terrain.water_at(position), Some(MAX_WATER_LEVEL));
    assert_eq!(w.firehose.stats().batches_published.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_dump_water_outside_any_terrain_is_rejected() {
    let w = world(EngineConfig::default(), vec![terrain_shard()]).await;
    let outcome = w
        .engine
        .process(Event::DumpWater {
            actor: EntityId::new(ALICE),
            position: Vec3::new(100.0, 5.0, 100.0),
        })
        .await;
    assert!(matches!(
        outcome,
        Outcome::Rejected(EngineError::Handler(HandlerError::MissingEntity("terrain")))
    ));
}

#[tokio::test]
async fn test_same_merge_key_applies_once() {
    let w = world(EngineConfig::default(), vec![player(ALICE, 0.0, &[])]).await;
    let events = vec![
        Event::Label {
            actor: EntityId::new(ALICE),
            text: "first".into(),
        },
        Event::Label {
            actor: EntityId::new(ALICE),
            text: "second".into(),
        },
    ];

    let report = w.engine.process_batch(events, &CancelToken::new()).await;

    assert_eq!(report.len(), 1);
    assert_eq!(report.entries[0].merged, 2);
    assert_eq!(report.committed(), 1);
    let alice = read(&w.store, ALICE).await.unwrap();
    assert_eq!(alice.version, 2);
    assert_eq!(alice.entity.components.get::<Label>(), Some(&Label("second".into())));
    assert_eq!(
        published(&w.firehose).await,
        vec![FactPayload::LabelChanged {
            entity: EntityId::new(ALICE),
            label: "second".into()
        }]
    );
}

#[tokio::test]
async fn test_groups_are_reported_in_arrival_order() {
    let w = world(
        EngineConfig::default(),
        vec![player(ALICE, 0.0, &[ItemStack::new(1, 5)]), player(BOB, 50.0, &[])],
    )
    .await;
    let events = vec![
        Event::Give {
            actor: EntityId::new(ALICE),
            target: EntityId::new(BOB),
            stack: ItemStack::new(1, 1),
        },
        Event::Label {
            actor: EntityId::new(BOB),
            text: "far away".into(),
        },
    ];

    let report = w.engine.process_batch(events, &CancelToken::new()).await;

    assert_eq!(report.entries[0].kind, EventKind::Give);
    assert!(matches!(
        report.entries[0].outcome,
        Outcome::Rejected(EngineError::Handler(HandlerError::OutOfRange { .. }))
    ));
    assert_eq!(report.entries[1].kind, EventKind::Label);
    assert!(report.entries[1].outcome.is_committed());
    assert_eq!(read(&w.store, ALICE).await.unwrap().version, 1);
}

#[tokio::test]
async fn test_drop_then_collect() {
    let w = world(
        EngineConfig::default(),
        vec![player(ALICE, 0.0, &[ItemStack::new(9, 4)]), player(BOB, 2.0, &[])],
    )
    .await;

    let dropped = w
        .engine
        .process(Event::DropItem {
            actor: EntityId::new(ALICE),
            stack: ItemStack::new(9, 3),
        })
        .await;
    assert!(matches!(dropped, Outcome::Committed { facts: 1 }));

    let drop = read(&w.store, 1000).await.unwrap();
    let components = &drop.entity.components;
    assert_eq!(components.get::<ItemDrop>(), Some(&ItemDrop(ItemStack::new(9, 3))));
    assert_eq!(components.get::<CreatedBy>(), Some(&CreatedBy(EntityId::new(ALICE))));
    assert_eq!(components.get::<Position>(), Some(&Position::new(0.0, 0.0, 0.0)));

    let collected = w
        .engine
        .process(Event::Collect {
            actor: EntityId::new(BOB),
            drop: EntityId::new(1000),
        })
        .await;
    assert!(collected.is_committed());
    assert!(read(&w.store, 1000).await.is_none());

    let bob = read(&w.store, BOB).await.unwrap();
    assert_eq!(bob.entity.components.get::<Inventory>().unwrap().count(9), 3);
    let alice = read(&w.store, ALICE).await.unwrap();
    assert_eq!(alice.entity.components.get::<Inventory>().unwrap().count(9), 1);

    let facts = published(&w.firehose).await;
    assert!(matches!(facts[0], FactPayload::ItemDropped { .. }));
    assert!(matches!(facts[1], FactPayload::ItemCollected { .. }));
}

#[tokio::test]
async fn test_lethal_damage_deletes_target_and_reports_both_facts() {
    let mut frail = player(BOB, 3.0, &[]);
    frail.components.set(Health::full(5));
    let w = world(EngineConfig::default(), vec![player(ALICE, 0.0, &[]), frail]).await;

    let outcome = w
        .engine
        .process(Event::Damage {
            attacker: EntityId::new(ALICE),
            target: EntityId::new(BOB),
            amount: 8,
        })
        .await;

    assert!(matches!(outcome, Outcome::Committed { facts: 2 }));
    assert!(read(&w.store, BOB).await.is_none());
    assert_eq!(w.firehose.stats().batches_published.load(Ordering::Relaxed), 1);
    let facts = published(&w.firehose).await;
    assert_eq!(
        facts,
        vec![
            FactPayload::EntityDamaged {
                attacker: EntityId::new(ALICE),
                target: EntityId::new(BOB),
                amount: 5,
                remaining: 0
            },
            FactPayload::EntityDied {
                target: EntityId::new(BOB),
                killer: EntityId::new(ALICE)
            },
        ]
    );
}

#[tokio::test]
async fn test_move_is_refused_by_generic_engine() {
    let w = world(EngineConfig::default(), vec![player(ALICE, 0.0, &[])]).await;
    let outcome = w
        .engine
        .process(Event::Move {
            actor: EntityId::new(ALICE),
            to: Vec3::new(1.0, 0.0, 0.0),
        })
        .await;
    assert!(matches!(
        outcome,
        Outcome::Rejected(EngineError::UnsupportedKind(EventKind::Move))
    ));
    assert_eq!(read(&w.store, ALICE).await.unwrap().version, 1);

    let moved = w
        .engine
        .movement()
        .apply(&Event::Move {
            actor: EntityId::new(ALICE),
            to: Vec3::new(1.0, 0.0, 0.0),
        })
        .await;
    assert!(moved.is_committed());
}

#[tokio::test]
async fn test_cancelled_batch_starts_nothing() {
    let w = world(EngineConfig::default(), vec![player(ALICE, 0.0, &[])]).await;
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = w
        .engine
        .process_batch(
            vec![Event::Label {
                actor: EntityId::new(ALICE),
                text: "late".into(),
            }],
            &cancel,
        )
        .await;

    assert!(matches!(report.entries[0].outcome, Outcome::Cancelled));
    assert_eq!(read(&w.store, ALICE).await.unwrap().version, 1);
}

/// Store whose every write loses to a competing writer.
struct AlwaysContended {
    inner: MemoryStore,
}

#[async_trait]
impl BackingStore for AlwaysContended {
    async fn get(&self, id: EntityId) -> StoreResult<Option<VersionedEntity>> {
        self.inner.get(id).await
    }

    async fn get_with_version(&self, ids: &[EntityId]) -> StoreResult<Vec<Option<VersionedEntity>>> {
        self.inner.get_with_version(ids).await
    }

    async fn apply(&self, changes: Vec<Change>) -> StoreResult<Vec<ChangeOutcome>> {
        Ok(changes
            .iter()
            .map(|c| ChangeOutcome::Conflict {
                expected: c.expected(),
                actual: c.expected() + 1,
            })
            .collect())
    }
}

#[tokio::test]
async fn test_exhausted_retries_dead_letter() {
    let inner = MemoryStore::new();
    inner
        .apply(vec![Change::Create {
            entity: player(ALICE, 0.0, &[]),
        }])
        .await
        .unwrap();
    let firehose = Firehose::new(Arc::new(MemoryTransport::new()), FirehoseConfig::default());
    let config = EngineConfig {
        max_attempts: 3,
        ..EngineConfig::default()
    };
    let engine = Engine::new(
        Arc::new(AlwaysContended { inner }),
        Arc::new(SequentialIds::default()),
        firehose.clone(),
        config,
    );
    let event = Event::Label {
        actor: EntityId::new(ALICE),
        text: "never".into(),
    };

    let outcome = engine.process(event.clone()).await;

    assert!(matches!(outcome, Outcome::DeadLettered));
    let stats = engine.stats();
    assert_eq!(stats.conflicts.load(Ordering::Relaxed), 3);
    assert_eq!(stats.dead_lettered.load(Ordering::Relaxed), 1);
    let letter = engine.dead_letters().try_pop().unwrap();
    assert_eq!(letter.event, event);
    assert_eq!(letter.attempts, 3);
    assert_eq!(firehose.stats().facts_published.load(Ordering::Relaxed), 0);
}

/// Store that counts single and batched reads.
struct CountingStore {
    inner: MemoryStore,
    single_reads: AtomicUsize,
    batched_reads: AtomicUsize,
}

#[async_trait]
impl BackingStore for CountingStore {
    async fn get(&self, id: EntityId) -> StoreResult<Option<VersionedEntity>> {
        self.single_reads.fetch_add(1, Ordering::Relaxed);
        self.inner.get(id).await
    }

    async fn get_with_version(&self, ids: &[EntityId]) -> StoreResult<Vec<Option<VersionedEntity>>> {
        self.batched_reads.fetch_add(1, Ordering::Relaxed);
        self.inner.get_with_version(ids).await
    }

    async fn apply(&self, changes: Vec<Change>) -> StoreResult<Vec<ChangeOutcome>> {
        self.inner.apply(changes).await
    }
}

#[tokio::test]
async fn test_fresh_roles_are_read_in_one_call() {
    let inner = MemoryStore::new();
    for entity in [player(ALICE, 0.0, &[ItemStack::new(1, 5)]), player(BOB, 3.0, &[])] {
        inner.apply(vec![Change::Create { entity }]).await.unwrap();
    }
    let store = Arc::new(CountingStore {
        inner,
        single_reads: AtomicUsize::new(0),
        batched_reads: AtomicUsize::new(0),
    });
    let firehose = Firehose::new(Arc::new(MemoryTransport::new()), FirehoseConfig::default());
    let engine = Engine::new(
        Arc::clone(&store) as Arc<dyn BackingStore>,
        Arc::new(SequentialIds::default()),
        firehose,
        EngineConfig::default(),
    );

    let outcome = engine
        .process(Event::Give {
            actor: EntityId::new(ALICE),
            target: EntityId::new(BOB),
            stack: ItemStack::new(1, 2),
        })
        .await;

    assert!(outcome.is_committed());
    assert_eq!(store.batched_reads.load(Ordering::Relaxed), 1);
    assert_eq!(store.single_reads.load(Ordering::Relaxed), 0);
    let bob = store.inner.get(EntityId::new(BOB)).await.unwrap().unwrap();
    assert_eq!(bob.entity.components.get::<Inventory>().unwrap().count(1), 2);
}

#[tokio::test]
async fn test_fact_set_over_the_record_limit_is_not_committed() {
    let mut frail = player(BOB, 3.0, &[]);
    frail.components.set(Health::full(5));
    let store = Arc::new(MemoryStore::new());
    for entity in [player(ALICE, 0.0, &[]), frail] {
        store.apply(vec![Change::Create { entity }]).await.unwrap();
    }
    let config = FirehoseConfig {
        max_batch_facts: 1,
        ..FirehoseConfig::default()
    };
    let firehose = Firehose::new(Arc::new(MemoryTransport::new()), config);
    let engine = Engine::new(
        Arc::clone(&store) as Arc<dyn BackingStore>,
        Arc::new(SequentialIds::default()),
        firehose.clone(),
        EngineConfig::default(),
    );

    let outcome = engine
        .process(Event::Damage {
            attacker: EntityId::new(ALICE),
            target: EntityId::new(BOB),
            amount: 8,
        })
        .await;

    assert!(matches!(
        outcome,
        Outcome::Rejected(EngineError::Handler(HandlerError::InvalidEvent(_)))
    ));
    assert_eq!(read(&store, BOB).await.unwrap().version, 1);
    assert_eq!(firehose.stats().batches_published.load(Ordering::Relaxed), 0);
}
