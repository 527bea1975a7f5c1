//! Combat damage.

use tessera_core::{Health, Position};
use tessera_firehose::FactPayload;

use super::{check_range, wrong_kind};
use crate::context::Context;
use crate::error::HandlerResult;
use crate::event::{Event, EventKind, MergeKey};
use crate::handler::EventHandler;
use crate::involved::{Involved, InvolvedQueries, Query};

const ATTACKER: &str = "attacker";
const TARGET: &str = "target";

/// Reduces the target's health; deletes it at zero.
///
/// The attacker is only read for its position, so a replica copy is good
/// enough. Hits on the same target within one batch add up.
#[derive(Clone, Copy, Debug)]
pub struct DamageHandler {
    range: f32,
}

impl DamageHandler {
    /// Creates the handler with an interaction range.
    #[must_use]
    pub fn new(range: f32) -> Self {
        Self { range }
    }
}

impl EventHandler for DamageHandler {
    fn kind(&self) -> EventKind {
        EventKind::Damage
    }

    fn merge_key(&self, event: &Event) -> MergeKey {
        match event {
            Event::Damage { target, .. } => MergeKey::Entity(*target),
            other => MergeKey::Entity(other.actor()),
        }
    }

    fn involves(&self, event: &Event) -> InvolvedQueries {
        match event {
            Event::Damage {
                attacker, target, ..
            } => InvolvedQueries::new()
                .stale(ATTACKER, Query::Entity(*attacker))
                .fresh(TARGET, Query::Entity(*target)),
            _ => InvolvedQueries::new(),
        }
    }

    fn merge(&self, existing: Event, incoming: Event) -> Event {
        match (existing, incoming) {
            (
                Event::Damage { amount: earlier, .. },
                Event::Damage {
                    attacker,
                    target,
                    amount,
                },
            ) => Event::Damage {
                attacker,
                target,
                amount: earlier.saturating_add(amount),
            },
            (_, incoming) => incoming,
        }
    }

    fn apply(&self, involved: &mut Involved, event: &Event, ctx: &mut Context) -> HandlerResult<()> {
        let Event::Damage {
            attacker,
            target,
            amount,
        } = event
        else {
            return Err(wrong_kind(EventKind::Damage, event));
        };

        let from = involved.stale_component::<Position>(ATTACKER)?.0;
        let at = involved.component::<Position>(TARGET)?.0;
        check_range(from, at, self.range)?;
        involved.component::<Health>(TARGET)?;

        let fork = involved.fork(TARGET)?;
        let health = fork.mutable::<Health>();
        let dealt = health.damage(*amount);
        let remaining = health.current;
        let dead = health.is_dead();

        ctx.publish(FactPayload::EntityDamaged {
            attacker: *attacker,
            target: *target,
            amount: dealt,
            remaining,
        });
        if dead {
            fork.delete();
            ctx.publish(FactPayload::EntityDied {
                target: *target,
                killer: *attacker,
            });
        }
        Ok(())
    }
}
