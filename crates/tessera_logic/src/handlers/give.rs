//! Handing items to another entity.

use tessera_core::{Inventory, Position};
use tessera_firehose::FactPayload;

use super::{check_range, wrong_kind};
use crate::context::Context;
use crate::error::{HandlerError, HandlerResult};
use crate::event::{Event, EventKind, MergeKey};
use crate::handler::EventHandler;
use crate::involved::{Involved, InvolvedQueries, Query};

const ACTOR: &str = "actor";
const TARGET: &str = "target";

/// Moves a stack from the actor's inventory to the target's when both are
/// within interaction range.
#[derive(Clone, Copy, Debug)]
pub struct GiveHandler {
    range: f32,
}

impl GiveHandler {
    /// Creates the handler with an interaction range.
    #[must_use]
    pub fn new(range: f32) -> Self {
        Self { range }
    }
}

impl EventHandler for GiveHandler {
    fn kind(&self) -> EventKind {
        EventKind::Give
    }

    fn merge_key(&self, event: &Event) -> MergeKey {
        match event {
            Event::Give { actor, target, .. } => MergeKey::Pair(*actor, *target),
            other => MergeKey::Entity(other.actor()),
        }
    }

    fn involves(&self, event: &Event) -> InvolvedQueries {
        match event {
            Event::Give { actor, target, .. } => InvolvedQueries::new()
                .fresh(ACTOR, Query::Entity(*actor))
                .fresh(TARGET, Query::Entity(*target)),
            _ => InvolvedQueries::new(),
        }
    }

    fn apply(&self, involved: &mut Involved, event: &Event, ctx: &mut Context) -> HandlerResult<()> {
        let Event::Give {
            actor,
            target,
            stack,
        } = event
        else {
            return Err(wrong_kind(EventKind::Give, event));
        };
        if actor == target {
            return Err(HandlerError::InvalidEvent("cannot give to oneself".into()));
        }
        if stack.count == 0 {
            return Err(HandlerError::InvalidEvent("empty stack".into()));
        }

        let from = involved.component::<Position>(ACTOR)?.0;
        let to = involved.component::<Position>(TARGET)?.0;
        check_range(from, to, self.range)?;

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
        involved.fork(TARGET)?.mutable::<Inventory>().add(*stack);

        ctx.publish(FactPayload::ItemTransferred {
            from: *actor,
            to: *target,
            stack: *stack,
        });
        Ok(())
    }
}
