//! # Apply Context
//!
//! The only side channel `apply` has. Fact payloads queued here are stamped
//! with an id and time and published by the engine after the commit
//! succeeds; entities created here are inserted by that same commit.
//!
//! Nothing here reads a clock or a random source, so a retried `apply`
//! stages exactly what the first attempt did.

use std::collections::VecDeque;

use tessera_core::{Components, Delta, EntityId};
use tessera_firehose::FactPayload;

use crate::error::{HandlerError, HandlerResult};

/// Per-attempt staging area for facts and new entities.
#[derive(Debug, Default)]
pub struct Context {
    reserved: VecDeque<EntityId>,
    created: Vec<Delta>,
    facts: Vec<FactPayload>,
}

impl Context {
    /// Creates a context holding ids pre-allocated for this event.
    #[must_use]
    pub fn new(reserved: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            reserved: reserved.into_iter().collect(),
            created: Vec::new(),
            facts: Vec::new(),
        }
    }

    /// Queues a fact for publication after commit.
    pub fn publish(&mut self, payload: FactPayload) {
        self.facts.push(payload);
    }

    /// Stages a new entity with the next reserved id and returns that id.
    pub fn create(&mut self, components: Components) -> HandlerResult<EntityId> {
        let id = self.reserved.pop_front().ok_or(HandlerError::NoReservedId)?;
        self.created.push(Delta::create(id, components));
        Ok(id)
    }

    /// Fact payloads queued so far.
    #[must_use]
    pub fn facts(&self) -> &[FactPayload] {
        &self.facts
    }

    /// Entities staged for creation.
    #[must_use]
    pub fn created(&self) -> &[Delta] {
        &self.created
    }

    pub(crate) fn into_parts(self) -> (Vec<Delta>, Vec<FactPayload>) {
        (self.created, self.facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Label;

    #[test]
    fn test_create_consumes_reserved_ids() {
        let mut ctx = Context::new([EntityId::new(40), EntityId::new(41)]);
        let a = ctx.create(Components::default().with(Label("a".into()))).unwrap();
        let b = ctx.create(Components::default()).unwrap();
        assert_eq!((a, b), (EntityId::new(40), EntityId::new(41)));
        assert_eq!(ctx.create(Components::default()), Err(HandlerError::NoReservedId));
        assert!(ctx.created().iter().all(Delta::is_new));
    }

    #[test]
    fn test_publish_queues_facts() {
        let mut ctx = Context::default();
        ctx.publish(FactPayload::LabelChanged {
            entity: EntityId::new(1),
            label: "x".into(),
        });
        assert_eq!(ctx.facts().len(), 1);
        let (created, facts) = ctx.into_parts();
        assert!(created.is_empty());
        assert_eq!(facts.len(), 1);
    }

    #[test]
    fn test_retried_apply_stages_identical_facts() {
        let stage = || {
            let mut ctx = Context::new([EntityId::new(7)]);
            ctx.create(Components::default()).unwrap();
            ctx.publish(FactPayload::ItemDropped {
                dropper: EntityId::new(1),
                drop: EntityId::new(7),
                stack: tessera_core::ItemStack::new(3, 2),
            });
            ctx.into_parts()
        };
        let (first_created, first_facts) = stage();
        let (second_created, second_facts) = stage();
        assert_eq!(first_facts, second_facts);
        assert_eq!(first_created.len(), second_created.len());
    }
}
