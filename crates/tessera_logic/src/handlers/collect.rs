//! Picking up item drops.

use tessera_core::{Inventory, ItemDrop, Position};
use tessera_firehose::FactPayload;

use super::{check_range, wrong_kind};
use crate::context::Context;
use crate::error::{HandlerError, HandlerResult};
use crate::event::{Event, EventKind, MergeKey};
use crate::handler::EventHandler;
use crate::involved::{Involved, InvolvedQueries, Query};

const ACTOR: &str = "actor";
const DROP: &str = "drop";

/// Moves a drop's items into the collector's inventory and deletes the drop.
///
/// Keyed by the drop, so competing collectors in one batch merge into a
/// single attempt.
#[derive(Clone, Copy, Debug)]
pub struct CollectHandler {
    range: f32,
}

impl CollectHandler {
    /// Creates the handler with an interaction range.
    #[must_use]
    pub fn new(range: f32) -> Self {
        Self { range }
    }
}

impl EventHandler for CollectHandler {
    fn kind(&self) -> EventKind {
        EventKind::Collect
    }

    fn merge_key(&self, event: &Event) -> MergeKey {
        match event {
            Event::Collect { drop, .. } => MergeKey::Entity(*drop),
            other => MergeKey::Entity(other.actor()),
        }
    }

    fn involves(&self, event: &Event) -> InvolvedQueries {
        match event {
            Event::Collect { actor, drop } => InvolvedQueries::new()
                .fresh(ACTOR, Query::Entity(*actor))
                .fresh(DROP, Query::Entity(*drop)),
            _ => InvolvedQueries::new(),
        }
    }

    fn apply(&self, involved: &mut Involved, event: &Event, ctx: &mut Context) -> HandlerResult<()> {
        let Event::Collect { actor, drop } = event else {
            return Err(wrong_kind(EventKind::Collect, event));
        };
        if actor == drop {
            return Err(HandlerError::InvalidEvent("an entity cannot collect itself".into()));
        }

        let stack = involved.component::<ItemDrop>(DROP)?.0;
        let at = involved.component::<Position>(ACTOR)?.0;
        let lying = involved.component::<Position>(DROP)?.0;
        check_range(at, lying, self.range)?;

        involved.fork(ACTOR)?.mutable::<Inventory>().add(stack);
        involved.fork(DROP)?.delete();

        ctx.publish(FactPayload::ItemCollected {
            collector: *actor,
            drop: *drop,
            stack,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::entity;
    use tessera_core::{Components, EntityId, ItemStack};

    #[test]
    fn test_collect_deletes_drop() {
        let collector = entity(1, Components::default().with(Position::new(0.0, 0.0, 0.0)));
        let drop = entity(
            9,
            Components::default()
                .with(Position::new(1.0, 0.0, 0.0))
                .with(ItemDrop(ItemStack::new(3, 4))),
        );
        let mut involved = Involved::new()
            .with_fresh(ACTOR, &collector)
            .with_fresh(DROP, &drop);
        let mut ctx = Context::default();
        let event = Event::Collect {
            actor: EntityId::new(1),
            drop: EntityId::new(9),
        };

        CollectHandler::new(8.0).apply(&mut involved, &event, &mut ctx).unwrap();

        assert_eq!(involved.component::<Inventory>(ACTOR).unwrap().count(3), 4);
        assert!(involved.read(DROP).unwrap().is_deleted());
        assert_eq!(ctx.facts().len(), 1);
    }

    #[test]
    fn test_non_drop_is_rejected() {
        let collector = entity(1, Components::default().with(Position::default()));
        let rock = entity(2, Components::default().with(Position::default()));
        let mut involved = Involved::new()
            .with_fresh(ACTOR, &collector)
            .with_fresh(DROP, &rock);
        let event = Event::Collect {
            actor: EntityId::new(1),
            drop: EntityId::new(2),
        };
        let err = CollectHandler::new(8.0)
            .apply(&mut involved, &event, &mut Context::default())
            .unwrap_err();
        assert!(matches!(err, HandlerError::MissingComponent { role: DROP, .. }));
    }
}
