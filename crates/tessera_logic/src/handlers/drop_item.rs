//! Dropping items into the world.

use tessera_core::{Components, CreatedBy, Inventory, ItemDrop, Position};
use tessera_firehose::FactPayload;

use super::wrong_kind;
use crate::context::Context;
use crate::error::{HandlerError, HandlerResult};
use crate::event::{Event, EventKind, MergeKey};
use crate::handler::EventHandler;
use crate::involved::{Involved, InvolvedQueries, Query};

const ACTOR: &str = "actor";

/// Removes a stack from the actor and creates an item drop at its position.
#[derive(Clone, Copy, Debug, Default)]
pub struct DropItemHandler;

impl EventHandler for DropItemHandler {
    fn kind(&self) -> EventKind {
        EventKind::DropItem
    }

    fn merge_key(&self, event: &Event) -> MergeKey {
        MergeKey::Entity(event.actor())
    }

    fn involves(&self, event: &Event) -> InvolvedQueries {
        InvolvedQueries::new().fresh(ACTOR, Query::Entity(event.actor()))
    }

    fn creates(&self, _event: &Event) -> usize {
        1
    }

    fn apply(&self, involved: &mut Involved, event: &Event, ctx: &mut Context) -> HandlerResult<()> {
        let Event::DropItem { actor, stack } = event else {
            return Err(wrong_kind(EventKind::DropItem, event));
        };
        if stack.count == 0 {
            return Err(HandlerError::InvalidEvent("empty stack".into()));
        }

        let position = *involved.component::<Position>(ACTOR)?;
        let have = involved.component::<Inventory>(ACTOR)?.count(stack.item_id);
        if !involved
            .fork(ACTOR)?
            .mutable::<Inventory>()
            .take(stack.item_id, stack.count)
        {
            return Err(HandlerError::InsufficientItems {
                entity: *actor,
                item_id: stack.item_id,
                have,
                need: stack.count,
            });
        }

        let drop = ctx.create(
            Components::default()
                .with(position)
                .with(ItemDrop(*stack))
                .with(CreatedBy(*actor)),
        )?;
        ctx.publish(FactPayload::ItemDropped {
            dropper: *actor,
            drop,
            stack: *stack,
        });
        Ok(())
    }
}
