//! # Event Handler Framework
//!
//! A handler is a declarative descriptor:
//!
//! ```text
//! merge_key(event) ─▶ dedupe within a batch
//! involves(event)  ─▶ named queries, resolved fresh or stale
//! apply(involved, event, ctx) ─▶ staged fork edits + queued facts
//! ```
//!
//! `apply` is pure: it sees only resolved inputs, never suspends and never
//! performs I/O. Committing and publishing are the engine's job.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::HandlerResult;
use crate::event::{Event, EventKind, MergeKey};
use crate::handlers::{
    CollectHandler, DamageHandler, DropItemHandler, DumpWaterHandler, GiveHandler, LabelHandler,
    MoveHandler,
};
use crate::involved::{Involved, InvolvedQueries};

/// Which pipeline processes a kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerMode {
    /// Resolve, apply, commit, retry.
    Generic,
    /// Applied by a dedicated fast path; the generic engine refuses it.
    ShortCircuited,
}

/// Declarative description of how one event kind mutates the world.
pub trait EventHandler: Send + Sync {
    /// Kind served.
    fn kind(&self) -> EventKind;

    /// Pipeline this kind goes through.
    fn mode(&self) -> HandlerMode {
        HandlerMode::Generic
    }

    /// Events of this kind with equal keys are merged within a batch.
    fn merge_key(&self, event: &Event) -> MergeKey;

    /// Entities and resources the event reads.
    fn involves(&self, event: &Event) -> InvolvedQueries;

    /// Number of fresh entity ids `apply` may create.
    fn creates(&self, _event: &Event) -> usize {
        0
    }

    /// Combines two events with the same merge key. The most recent wins
    /// unless a handler says otherwise.
    fn merge(&self, _existing: Event, incoming: Event) -> Event {
        incoming
    }

    /// Stages the event's effect on the fresh forks and queues its facts.
    fn apply(&self, involved: &mut Involved, event: &Event, ctx: &mut Context) -> HandlerResult<()>;
}

/// Handlers by kind.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in handler, tuned by `config`.
    #[must_use]
    pub fn builtin(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MoveHandler));
        registry.register(Arc::new(DumpWaterHandler));
        registry.register(Arc::new(LabelHandler));
        registry.register(Arc::new(GiveHandler::new(config.interaction_range)));
        registry.register(Arc::new(CollectHandler::new(config.interaction_range)));
        registry.register(Arc::new(DropItemHandler));
        registry.register(Arc::new(DamageHandler::new(config.interaction_range)));
        registry
    }

    /// Registers a handler, replacing any previous one for its kind.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    /// Handler for a kind.
    #[must_use]
    pub fn get(&self, kind: EventKind) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(&kind)
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort();
        f.debug_struct("HandlerRegistry").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_every_kind() {
        let registry = HandlerRegistry::builtin(&EngineConfig::default());
        assert_eq!(registry.len(), 7);
        for kind in [
            EventKind::Move,
            EventKind::DumpWater,
            EventKind::Label,
            EventKind::Give,
            EventKind::Collect,
            EventKind::DropItem,
            EventKind::Damage,
        ] {
            let handler = registry.get(kind).unwrap();
            assert_eq!(handler.kind(), kind);
        }
        assert_eq!(
            registry.get(EventKind::Move).unwrap().mode(),
            HandlerMode::ShortCircuited
        );
        assert_eq!(
            registry.get(EventKind::Label).unwrap().mode(),
            HandlerMode::Generic
        );
    }
}
