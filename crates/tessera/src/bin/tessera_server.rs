//! # TESSERA Server
//!
//! Headless single-process worker. Reads events from stdin, one JSON value
//! per line (an event object or an array of them), and logs the facts the
//! engine publishes.
//!
//! ```bash
//! # Defaults: every bucket, in-memory store and log
//! ./tessera_server
//!
//! # With a config file
//! RUST_LOG=tessera=debug ./tessera_server tessera.toml < events.jsonl
//! ```
//!
//! The store starts empty unless the config names a `seed_path`, whose
//! entities are created before the worker bootstraps its replica.
//!
//! Stops on Ctrl-C or end of input.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use tessera::core::{CancelToken, MemoryStore, SequentialIds};
use tessera::firehose::{FileTransport, Firehose, LogTransport, MemoryTransport};
use tessera::logic::Event;
use tessera::shard::{AssignmentBoard, LocalElection, Rebalancer};
use tessera::{apply_seed, load_seed, TesseraConfig, Worker};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const FACT_GROUP: &str = "tessera-server";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => TesseraConfig::load(Path::new(&path))
            .with_context(|| format!("loading config from {path}"))?,
        None => TesseraConfig::default(),
    };
    info!(worker_id = %config.worker_id, "starting tessera server");

    let transport: Arc<dyn LogTransport> = match &config.firehose.log_path {
        Some(path) => Arc::new(FileTransport::open(path).context("opening fact log")?),
        None => Arc::new(MemoryTransport::new()),
    };
    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &config.seed_path {
        let entities =
            load_seed(Path::new(path)).with_context(|| format!("loading seed from {path}"))?;
        apply_seed(store.as_ref(), entities)
            .await
            .context("seeding the store")?;
    } else {
        warn!("no seed_path configured, starting with an empty world");
    }
    let worker = Arc::new(Worker::new(
        config.clone(),
        Arc::clone(&store),
        Arc::new(SequentialIds::default()),
        transport,
    )?);
    worker.bootstrap(store.snapshot());

    let cancel = CancelToken::new();

    // A configured held set is static; otherwise this process elects itself
    // and rebalances over its single member.
    let (_members_tx, members_rx) = watch::channel(vec![config.worker_id.clone()]);
    let board = if config.shard.held.is_none() {
        let board = Arc::new(AssignmentBoard::new());
        let rebalancer = Rebalancer::new(
            Arc::new(LocalElection::new()),
            Arc::clone(&board),
            config.shard.total_buckets,
        );
        let worker_id = config.worker_id.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = rebalancer.run(&worker_id, members_rx, cancel).await {
                warn!(error = %e, "rebalancer stopped");
            }
        });
        Some(board.subscribe())
    } else {
        None
    };

    let running = {
        let worker = Arc::clone(&worker);
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(board, cancel).await })
    };
    let facts = tokio::spawn(log_facts(worker.firehose().clone(), cancel.clone()));

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line.context("reading stdin")?,
        };
        let Some(line) = line else {
            info!("end of input");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let events = match parse_events(&line) {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "skipping malformed event line");
                continue;
            }
        };
        let report = worker.submit(events, &cancel).await;
        info!(
            dropped = report.dropped,
            moves = report.moves.len(),
            groups = report.batch.len(),
            committed = report.batch.committed(),
            "batch processed"
        );
        for entry in &report.batch.entries {
            debug!(kind = %entry.kind, merged = entry.merged, outcome = ?entry.outcome, "event outcome");
        }
    }

    cancel.cancel();
    running.await.context("worker task panicked")??;
    facts.await.context("fact logger panicked")?;

    let stats = worker.engine().stats();
    info!(
        commits = stats.commits.load(Ordering::Relaxed),
        dead_lettered = stats.dead_lettered.load(Ordering::Relaxed),
        "tessera server stopped"
    );
    Ok(())
}

fn parse_events(line: &str) -> serde_json::Result<Vec<Event>> {
    if line.trim_start().starts_with('[') {
        serde_json::from_str(line)
    } else {
        serde_json::from_str(line).map(|event| vec![event])
    }
}

async fn log_facts(firehose: Firehose, cancel: CancelToken) {
    let ttl = firehose.config().ack_ttl();
    let mut subscription = firehose.subscribe(FACT_GROUP, ttl, cancel);
    while let Some(delivery) = subscription.next().await {
        match delivery {
            Ok(delivery) => {
                for fact in &delivery.facts {
                    info!(offset = delivery.offset, fact = ?fact.payload, "fact");
                }
                if let Err(e) = delivery.ack().await {
                    warn!(offset = delivery.offset, error = %e, "fact batch left unacknowledged");
                }
            }
            Err(e) => {
                error!(error = %e, "fact subscription failed");
                return;
            }
        }
    }
}
