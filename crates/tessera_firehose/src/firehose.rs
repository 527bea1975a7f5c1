//! # Firehose
//!
//! Reliable fan-out of facts. Each publish appends one record (a delivery
//! batch) to the log. Consumers subscribe under a group name:
//!
//! ```text
//!              ┌──────────────┐
//! publish ───▶ │  log record  │ ──▶ group "chat"   ──▶ sub A ┐ compete
//!              │  0 1 2 3 ... │                    ──▶ sub B ┘
//!              └──────────────┘ ──▶ group "quests" ──▶ sub C   (every batch)
//! ```
//!
//! Delivery is at-least-once: a batch that is not acknowledged within the
//! subscription's ack TTL is handed out again. An acknowledged batch is
//! never redelivered. Producers never wait on consumers.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;
use tessera_core::CancelToken;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::FirehoseConfig;
use crate::error::{FirehoseError, FirehoseResult};
use crate::fact::Fact;
use crate::transport::{LogTransport, Offset};

/// Counters for a firehose.
#[derive(Debug, Default)]
pub struct FirehoseStats {
    /// Records appended.
    pub batches_published: AtomicU64,
    /// Facts appended.
    pub facts_published: AtomicU64,
    /// First-time deliveries.
    pub deliveries: AtomicU64,
    /// Deliveries of a batch whose ack TTL expired.
    pub redeliveries: AtomicU64,
    /// Successful acknowledgements.
    pub acks: AtomicU64,
}

/// Delivery bookkeeping for one consumer group.
#[derive(Debug, Default)]
struct GroupState {
    /// Acks persisted by the transport have been folded in.
    restored: bool,
    /// Every offset below this is acknowledged.
    floor: Offset,
    /// Acknowledged offsets at or above `floor`.
    acked: BTreeSet<Offset>,
    /// Lowest offset never handed out.
    next: Offset,
    /// Handed out, not yet acknowledged, with redelivery deadline and attempt count.
    in_flight: HashMap<Offset, (Instant, u32)>,
}

impl GroupState {
    /// Folds in acks persisted by an earlier run. Offsets handed out but
    /// never acknowledged before then are handed out again.
    fn restore(&mut self, acked: impl IntoIterator<Item = Offset>) {
        for offset in acked {
            self.mark_acked(offset);
        }
        self.next = self.next.max(self.floor);
        self.restored = true;
    }

    /// Records an ack. Returns true if the batch was in flight.
    fn mark_acked(&mut self, offset: Offset) -> bool {
        let was_in_flight = self.in_flight.remove(&offset).is_some();
        if offset >= self.floor {
            self.acked.insert(offset);
            while self.acked.remove(&self.floor) {
                self.floor += 1;
            }
        }
        was_in_flight
    }

    fn is_acked(&self, offset: Offset) -> bool {
        offset < self.floor || self.acked.contains(&offset)
    }

    /// Picks the next batch to hand out: an expired in-flight batch first,
    /// otherwise the next fresh, unacknowledged one below `head`.
    fn claim(&mut self, head: Offset, ttl: Duration, now: Instant) -> Option<(Offset, u32)> {
        let expired = self
            .in_flight
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(offset, _)| *offset)
            .min();
        if let Some(offset) = expired {
            let entry = self.in_flight.entry(offset).or_insert((now, 0));
            entry.0 = now + ttl;
            entry.1 += 1;
            return Some((offset, entry.1));
        }
        while self.next < head {
            let offset = self.next;
            self.next += 1;
            if self.is_acked(offset) {
                continue;
            }
            self.in_flight.insert(offset, (now + ttl, 1));
            return Some((offset, 1));
        }
        None
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        self.in_flight.values().map(|(deadline, _)| *deadline).min()
    }
}

struct Inner {
    transport: Arc<dyn LogTransport>,
    groups: Mutex<HashMap<String, Arc<Mutex<GroupState>>>>,
    published: Notify,
    config: FirehoseConfig,
    stats: FirehoseStats,
}

/// Handle to a firehose. Clones share the same log and groups.
#[derive(Clone)]
pub struct Firehose {
    inner: Arc<Inner>,
}

impl Firehose {
    /// Creates a firehose over a transport.
    #[must_use]
    pub fn new(transport: Arc<dyn LogTransport>, config: FirehoseConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                groups: Mutex::new(HashMap::new()),
                published: Notify::new(),
                config,
                stats: FirehoseStats::default(),
            }),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &FirehoseConfig {
        &self.inner.config
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> &FirehoseStats {
        &self.inner.stats
    }

    /// Appends facts as one delivery batch in a single log record.
    ///
    /// Returns the record's offset; publishing nothing writes nothing. A
    /// batch over `max_batch_facts` is refused whole.
    pub async fn publish(&self, facts: Vec<Fact>) -> FirehoseResult<Option<Offset>> {
        if facts.is_empty() {
            return Ok(None);
        }
        let limit = self.inner.config.max_batch_facts;
        if limit > 0 && facts.len() > limit {
            warn!(facts = facts.len(), limit, "refusing oversized fact batch");
            return Err(FirehoseError::BatchTooLarge {
                facts: facts.len(),
                limit,
            });
        }
        let record = serde_json::to_vec(&facts)?;
        let offset = self.inner.transport.append(record).await.map_err(|e| {
            error!(error = %e, "firehose append failed");
            e
        })?;
        self.inner.stats.batches_published.fetch_add(1, Ordering::Relaxed);
        self.inner
            .stats
            .facts_published
            .fetch_add(facts.len() as u64, Ordering::Relaxed);
        debug!(offset, facts = facts.len(), "firehose batch published");
        self.inner.published.notify_waiters();
        Ok(Some(offset))
    }

    /// Subscribes to the log as a member of `group`.
    ///
    /// Members of a group compete for batches; each group sees every batch
    /// it has not acknowledged, starting from the beginning of the log.
    pub fn subscribe(&self, group: &str, ack_ttl: Duration, cancel: CancelToken) -> Subscription {
        let state = Arc::clone(
            self.inner
                .groups
                .lock()
                .entry(group.to_string())
                .or_default(),
        );
        info!(group, ttl_ms = ack_ttl.as_millis(), "firehose subscription opened");
        Subscription {
            firehose: self.clone(),
            group: group.to_string(),
            state,
            ack_ttl,
            cancel,
        }
    }

    /// Number of batches handed out to `group` but not yet acknowledged.
    #[must_use]
    pub fn pending(&self, group: &str) -> usize {
        self.inner
            .groups
            .lock()
            .get(group)
            .map_or(0, |g| g.lock().in_flight.len())
    }
}

/// A consumer-group member's view of the log.
pub struct Subscription {
    firehose: Firehose,
    group: String,
    state: Arc<Mutex<GroupState>>,
    ack_ttl: Duration,
    cancel: CancelToken,
}

impl Subscription {
    /// Group this subscription belongs to.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Waits for the next unacknowledged batch.
    ///
    /// Returns `None` once the cancel token fires. Batches already handed
    /// out stay subject to redelivery after their TTL.
    pub async fn next(&mut self) -> Option<FirehoseResult<Delivery>> {
        let inner = &self.firehose.inner;
        let restored = self.state.lock().restored;
        if !restored {
            match inner.transport.acked(&self.group).await {
                Ok(acked) => {
                    let mut state = self.state.lock();
                    if !state.restored {
                        debug!(group = %self.group, acked = acked.len(), "restoring group acks");
                        state.restore(acked);
                    }
                }
                Err(e) => {
                    error!(group = %self.group, error = %e, "loading group acks failed");
                    return Some(Err(e));
                }
            }
        }
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            // Registered before checking the log so a concurrent publish is not missed.
            let published = inner.published.notified();

            let head = match inner.transport.head().await {
                Ok(head) => head,
                Err(e) => return Some(Err(e)),
            };
            let now = Instant::now();
            let (claimed, deadline) = {
                let mut state = self.state.lock();
                let claimed = state.claim(head, self.ack_ttl, now);
                (claimed, state.earliest_deadline())
            };

            if let Some((offset, attempt)) = claimed {
                return Some(self.fetch(offset, attempt).await);
            }

            let wake = deadline.unwrap_or_else(|| now + inner.config.poll_interval());
            tokio::select! {
                () = self.cancel.cancelled() => return None,
                () = published => {}
                () = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    async fn fetch(&self, offset: Offset, attempt: u32) -> FirehoseResult<Delivery> {
        let inner = &self.firehose.inner;
        let record = inner
            .transport
            .read(offset, 1)
            .await?
            .into_iter()
            .next()
            .map(|(_, bytes)| bytes)
            .ok_or_else(|| FirehoseError::Corrupt {
                offset,
                reason: "record missing below head".into(),
            })?;
        let facts: Vec<Fact> = serde_json::from_slice(&record)?;

        if attempt > 1 {
            inner.stats.redeliveries.fetch_add(1, Ordering::Relaxed);
            warn!(group = %self.group, offset, attempt, "redelivering unacknowledged batch");
        } else {
            inner.stats.deliveries.fetch_add(1, Ordering::Relaxed);
        }

        Ok(Delivery {
            offset,
            attempt,
            facts,
            ack: AckHandle {
                firehose: self.firehose.clone(),
                group: self.group.clone(),
                state: Arc::clone(&self.state),
                offset,
            },
        })
    }

    /// Turns the subscription into a stream of deliveries that ends on cancel.
    pub fn into_stream(self) -> impl Stream<Item = FirehoseResult<Delivery>> {
        futures::stream::unfold(self, |mut sub| async move {
            let item = sub.next().await?;
            Some((item, sub))
        })
    }
}

/// Acknowledges one batch for one group.
#[derive(Clone)]
pub struct AckHandle {
    firehose: Firehose,
    group: String,
    state: Arc<Mutex<GroupState>>,
    offset: Offset,
}

impl AckHandle {
    /// Marks the batch done, durably for the transport. Returns false if it
    /// was already acknowledged.
    ///
    /// If recording the ack fails the batch stays in flight and will be
    /// redelivered.
    pub async fn ack(&self) -> FirehoseResult<bool> {
        let in_flight = self.state.lock().in_flight.contains_key(&self.offset);
        if !in_flight {
            return Ok(false);
        }
        let inner = &self.firehose.inner;
        inner
            .transport
            .record_ack(&self.group, self.offset)
            .await
            .map_err(|e| {
                error!(group = %self.group, offset = self.offset, error = %e, "recording ack failed");
                e
            })?;
        let acked = self.state.lock().mark_acked(self.offset);
        if acked {
            inner.stats.acks.fetch_add(1, Ordering::Relaxed);
        }
        Ok(acked)
    }
}

/// One delivered batch.
pub struct Delivery {
    /// Log offset of the batch.
    pub offset: Offset,
    /// 1 on first delivery, higher on redelivery.
    pub attempt: u32,
    /// The facts, in publish order.
    pub facts: Vec<Fact>,
    ack: AckHandle,
}

impl Delivery {
    /// Acknowledges this batch. Returns false if it was already acknowledged.
    pub async fn ack(&self) -> FirehoseResult<bool> {
        self.ack.ack().await
    }

    /// Detachable ack handle, for acknowledging after the facts are moved out.
    #[must_use]
    pub fn ack_handle(&self) -> AckHandle {
        self.ack.clone()
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("offset", &self.offset)
            .field("attempt", &self.attempt)
            .field("facts", &self.facts.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_prefers_expired_batches() {
        let mut group = GroupState::default();
        let ttl = Duration::from_secs(10);
        let t0 = Instant::now();

        assert_eq!(group.claim(2, ttl, t0), Some((0, 1)));
        assert_eq!(group.claim(2, ttl, t0), Some((1, 1)));
        assert_eq!(group.claim(2, ttl, t0), None);

        let later = t0 + ttl;
        assert_eq!(group.claim(2, ttl, later), Some((0, 2)));
        assert_eq!(group.claim(2, ttl, later), Some((1, 2)));
        assert_eq!(group.claim(3, ttl, later), Some((2, 1)));
    }

    #[test]
    fn test_acked_batch_is_not_reclaimed() {
        let mut group = GroupState::default();
        let ttl = Duration::from_millis(1);
        let t0 = Instant::now();
        assert_eq!(group.claim(1, ttl, t0), Some((0, 1)));
        assert!(group.mark_acked(0));
        assert!(!group.mark_acked(0));
        assert_eq!(group.claim(1, ttl, t0 + Duration::from_secs(60)), None);
        assert_eq!(group.floor, 1);
    }

    #[test]
    fn test_restored_acks_are_skipped() {
        let mut group = GroupState::default();
        group.restore([0, 1, 3, 5]);
        assert_eq!(group.floor, 2);
        assert_eq!(group.acked.iter().copied().collect::<Vec<_>>(), vec![3, 5]);

        let ttl = Duration::from_secs(10);
        let t0 = Instant::now();
        assert_eq!(group.claim(7, ttl, t0), Some((2, 1)));
        assert_eq!(group.claim(7, ttl, t0), Some((4, 1)));
        assert_eq!(group.claim(7, ttl, t0), Some((6, 1)));
        assert_eq!(group.claim(7, ttl, t0), None);

        group.mark_acked(2);
        group.mark_acked(4);
        assert_eq!(group.floor, 6);
        assert!(group.acked.is_empty());
    }
}
