//! # Dead-Letter Queue
//!
//! Events that kept conflicting past the retry bound end up here for
//! inspection or replay. Bounded: when full, new letters are dropped
//! (and counted) rather than blocking the engine.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::event::Event;

/// An event the engine gave up on.
#[derive(Clone, Debug, PartialEq)]
pub struct DeadLetter {
    /// The (merged) event.
    pub event: Event,
    /// Commit attempts made.
    pub attempts: u32,
    /// Last failure seen.
    pub reason: String,
}

/// Bounded multi-producer queue of dead letters. Clones share the queue.
#[derive(Clone, Debug)]
pub struct DeadLetterQueue {
    sender: Sender<DeadLetter>,
    receiver: Receiver<DeadLetter>,
}

impl DeadLetterQueue {
    /// Creates a queue holding at most `capacity` letters.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Enqueues without blocking. Returns false if the queue is full.
    #[inline]
    pub fn push(&self, letter: DeadLetter) -> bool {
        match self.sender.try_send(letter) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }

    /// Takes the oldest letter, if any.
    #[must_use]
    pub fn try_pop(&self) -> Option<DeadLetter> {
        self.receiver.try_recv().ok()
    }

    /// Takes every queued letter.
    #[must_use]
    pub fn drain(&self) -> Vec<DeadLetter> {
        self.receiver.try_iter().collect()
    }

    /// Letters waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
