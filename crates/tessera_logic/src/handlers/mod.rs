//! Built-in handlers, one per event kind.

mod collect;
mod damage;
mod drop_item;
mod dump_water;
mod give;
mod label;
mod movement;

pub use collect::CollectHandler;
pub use damage::DamageHandler;
pub use drop_item::DropItemHandler;
pub use dump_water::DumpWaterHandler;
pub use give::GiveHandler;
pub use label::LabelHandler;
pub use movement::{MoveHandler, MovementPath};

use tessera_core::Vec3;

use crate::error::{HandlerError, HandlerResult};
use crate::event::{Event, EventKind};

/// Fails with [`HandlerError::OutOfRange`] if `a` and `b` are farther apart than `range`.
pub(crate) fn check_range(a: Vec3, b: Vec3, range: f32) -> HandlerResult<()> {
    let distance = a.distance(b);
    if distance > range {
        return Err(HandlerError::OutOfRange { distance, range });
    }
    Ok(())
}

pub(crate) fn wrong_kind(expected: EventKind, event: &Event) -> HandlerError {
    HandlerError::WrongKind {
        expected,
        actual: event.kind(),
    }
}
