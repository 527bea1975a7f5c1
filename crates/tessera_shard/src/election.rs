//! # Leader Election
//!
//! Exactly one candidate at a time runs leader-only work (the rebalancer).
//! The election backend is an external collaborator; [`LocalElection`]
//! grants leadership within one process.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tessera_core::CancelToken;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::error::{ShardError, ShardResult};

/// Leader-only work. Receives a token that fires when leadership ends.
pub type LeaderTask = Box<dyn FnOnce(CancelToken) -> BoxFuture<'static, ()> + Send>;

/// Campaign-and-run contract.
#[async_trait]
pub trait LeaderElection: Send + Sync {
    /// Waits to be elected as `candidate`, then runs `task` for as long as
    /// leadership lasts.
    ///
    /// Returns `Ok` when the task finishes or `cancel` fires (cancelling
    /// before election returns without running the task), and
    /// [`ShardError::ElectionLost`] if leadership was taken away first.
    async fn run_while_elected(
        &self,
        candidate: String,
        task: LeaderTask,
        cancel: CancelToken,
    ) -> ShardResult<()>;
}

#[async_trait]
impl<E: LeaderElection + ?Sized> LeaderElection for Arc<E> {
    async fn run_while_elected(
        &self,
        candidate: String,
        task: LeaderTask,
        cancel: CancelToken,
    ) -> ShardResult<()> {
        (**self).run_while_elected(candidate, task, cancel).await
    }
}

struct Term {
    leader: String,
    token: CancelToken,
}

/// In-process election: one holder at a time, granted in arrival order of
/// wake-ups.
#[derive(Default)]
pub struct LocalElection {
    term: Mutex<Option<Term>>,
    released: Notify,
}

impl LocalElection {
    /// Creates an election with no leader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current leader, if any.
    #[must_use]
    pub fn leader(&self) -> Option<String> {
        self.term.lock().as_ref().map(|t| t.leader.clone())
    }

    /// Ends the current term, as a lost lease would.
    pub fn revoke(&self) {
        if let Some(term) = self.term.lock().as_ref() {
            warn!(leader = %term.leader, "leadership revoked");
            term.token.cancel();
        }
    }

    fn try_acquire(&self, candidate: &str) -> Option<CancelToken> {
        let mut term = self.term.lock();
        if term.is_some() {
            return None;
        }
        let token = CancelToken::new();
        *term = Some(Term {
            leader: candidate.to_string(),
            token: token.clone(),
        });
        Some(token)
    }

    fn release(&self) {
        *self.term.lock() = None;
        self.released.notify_waiters();
    }
}

#[async_trait]
impl LeaderElection for LocalElection {
    async fn run_while_elected(
        &self,
        candidate: String,
        task: LeaderTask,
        cancel: CancelToken,
    ) -> ShardResult<()> {
        let term = loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let released = self.released.notified();
            if let Some(token) = self.try_acquire(&candidate) {
                break token;
            }
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = released => {}
            }
        };
        info!(leader = %candidate, "elected");

        let work = task(term.clone());
        tokio::pin!(work);
        let cancelled = tokio::select! {
            () = &mut work => false,
            () = cancel.cancelled() => true,
        };
        if cancelled {
            term.cancel();
            work.await;
        }

        let lost = term.is_cancelled() && !cancelled && !cancel.is_cancelled();
        self.release();
        info!(leader = %candidate, "stepped down");
        if lost {
            return Err(ShardError::ElectionLost(candidate));
        }
        Ok(())
    }
}
