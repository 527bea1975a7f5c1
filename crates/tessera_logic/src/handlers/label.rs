//! Relabelling.

use tessera_core::Label;
use tessera_firehose::FactPayload;

use super::wrong_kind;
use crate::context::Context;
use crate::error::HandlerResult;
use crate::event::{Event, EventKind, MergeKey};
use crate::handler::EventHandler;
use crate::involved::{Involved, InvolvedQueries, Query};

const ACTOR: &str = "actor";

/// Sets the actor's label and announces it.
#[derive(Clone, Copy, Debug, Default)]
pub struct LabelHandler;

impl EventHandler for LabelHandler {
    fn kind(&self) -> EventKind {
        EventKind::Label
    }

    fn merge_key(&self, event: &Event) -> MergeKey {
        MergeKey::Entity(event.actor())
    }

    fn involves(&self, event: &Event) -> InvolvedQueries {
        InvolvedQueries::new().fresh(ACTOR, Query::Entity(event.actor()))
    }

    fn apply(&self, involved: &mut Involved, event: &Event, ctx: &mut Context) -> HandlerResult<()> {
        let Event::Label { actor, text } = event else {
            return Err(wrong_kind(EventKind::Label, event));
        };
        involved.fork(ACTOR)?.set(Label(text.clone()));
        ctx.publish(FactPayload::LabelChanged {
            entity: *actor,
            label: text.clone(),
        });
        Ok(())
    }
}
