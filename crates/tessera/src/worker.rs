//! # Worker
//!
//! One shard worker: a replica following the store's change feed, the
//! transaction engine reading from that replica, and a shard manager
//! deciding which incoming events this worker handles.

use std::sync::Arc;

use parking_lot::Mutex;
use tessera_core::{
    BackingStore, CancelToken, ChangeFeed, ChangeReceiver, ComponentMask, IdAllocator,
    VersionedEntity,
};
use tessera_firehose::{Firehose, LogTransport};
use tessera_logic::{BatchReport, Engine, Event, EventKind, MovementPath, Outcome};
use tessera_replica::{ReplicaError, ReplicaTable};
use tessera_shard::{Assignments, ShardError, ShardManager};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{ConfigError, TesseraConfig};

/// Worker failures.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Shard assignment failure.
    #[error(transparent)]
    Shard(#[from] ShardError),

    /// The replica stopped following the change feed.
    #[error(transparent)]
    Replica(#[from] ReplicaError),

    /// [`Worker::run`] was called a second time.
    #[error("worker is already running")]
    AlreadyRunning,
}

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// What happened to a submitted batch.
#[derive(Debug, Default)]
pub struct SubmitReport {
    /// Events whose actor belongs to another worker.
    pub dropped: usize,
    /// Outcome of each owned move, in submission order.
    pub moves: Vec<Outcome>,
    /// Report for the remaining owned events.
    pub batch: BatchReport,
}

/// A running shard worker.
pub struct Worker {
    config: TesseraConfig,
    replica: Arc<ReplicaTable>,
    engine: Engine,
    movement: MovementPath,
    shards: Arc<ShardManager>,
    firehose: Firehose,
    feed: Mutex<Option<ChangeReceiver>>,
}

impl Worker {
    /// Wires a worker over `store`.
    ///
    /// The change feed is subscribed here, so commits made before
    /// [`Worker::run`] starts still reach the replica. Seed the replica
    /// with [`Worker::bootstrap`].
    pub fn new<S>(
        config: TesseraConfig,
        store: Arc<S>,
        ids: Arc<dyn IdAllocator>,
        transport: Arc<dyn LogTransport>,
    ) -> WorkerResult<Self>
    where
        S: BackingStore + ChangeFeed + 'static,
    {
        config.validate()?;
        let feed = store.subscribe();

        let replica = Arc::new(ReplicaTable::new(ComponentMask::EMPTY, &config.replica));
        let firehose = Firehose::new(transport, config.firehose.clone());
        let engine = Engine::new(
            Arc::clone(&store) as Arc<dyn BackingStore>,
            ids,
            firehose.clone(),
            config.engine.clone(),
        )
        .with_replica(Arc::clone(&replica));
        let movement = engine.movement();
        let shards = Arc::new(ShardManager::new(config.shard.assignment()?)?);

        info!(
            worker_id = %config.worker_id,
            buckets = config.shard.total_buckets,
            "worker created"
        );
        Ok(Self {
            config,
            replica,
            engine,
            movement,
            shards,
            firehose,
            feed: Mutex::new(Some(feed)),
        })
    }

    /// Seeds the replica, typically from a store snapshot taken right after
    /// construction. Returns the number of entities held.
    pub fn bootstrap(&self, snapshot: impl IntoIterator<Item = VersionedEntity>) -> usize {
        self.replica.bootstrap(snapshot)
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &TesseraConfig {
        &self.config
    }

    /// Local replica.
    #[must_use]
    pub fn replica(&self) -> &Arc<ReplicaTable> {
        &self.replica
    }

    /// Transaction engine.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Shard ownership.
    #[must_use]
    pub fn shards(&self) -> &Arc<ShardManager> {
        &self.shards
    }

    /// Fact log the engine publishes to.
    #[must_use]
    pub fn firehose(&self) -> &Firehose {
        &self.firehose
    }

    /// Processes the events whose actor this worker owns and drops the rest.
    ///
    /// Moves take the single-entity fast path; everything else goes through
    /// one engine batch.
    pub async fn submit(&self, events: Vec<Event>, cancel: &CancelToken) -> SubmitReport {
        let mut report = SubmitReport::default();
        let mut generic = Vec::with_capacity(events.len());
        let mut moves = Vec::new();

        for event in events {
            if !self.shards.owns_entity(event.actor()) {
                debug!(actor = %event.actor(), kind = %event.kind(), "event not owned, dropping");
                report.dropped += 1;
                continue;
            }
            if event.kind() == EventKind::Move {
                moves.push(event);
            } else {
                generic.push(event);
            }
        }

        for event in &moves {
            if cancel.is_cancelled() {
                report.moves.push(Outcome::Cancelled);
                continue;
            }
            report.moves.push(self.movement.apply(event).await);
        }
        if !generic.is_empty() {
            report.batch = self.engine.process_batch(generic, cancel).await;
        }
        report
    }

    /// Follows the change feed and, when given, the assignment board until
    /// `cancel` fires.
    ///
    /// Without a board the configured assignment stays fixed.
    pub async fn run(
        &self,
        board: Option<watch::Receiver<Assignments>>,
        cancel: CancelToken,
    ) -> WorkerResult<()> {
        let feed = self.feed.lock().take().ok_or(WorkerError::AlreadyRunning)?;
        info!(worker_id = %self.config.worker_id, "worker running");

        let replica = self.replica.follow(feed, cancel.clone());
        let shards = async {
            match board {
                Some(board) => {
                    self.shards
                        .follow(&self.config.worker_id, board, cancel.clone())
                        .await
                }
                None => Ok(()),
            }
        };
        let (replica, shards) = tokio::join!(replica, shards);
        replica?;
        shards?;
        info!(worker_id = %self.config.worker_id, "worker stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("worker_id", &self.config.worker_id)
            .field("replica_len", &self.replica.len())
            .field("assignment", &self.shards.assignment())
            .finish_non_exhaustive()
    }
}
