//! Pouring water onto terrain.

use tessera_core::{Terrain, MAX_WATER_LEVEL};

use super::wrong_kind;
use crate::context::Context;
use crate::error::{HandlerError, HandlerResult};
use crate::event::{Event, EventKind, MergeKey};
use crate::handler::EventHandler;
use crate::involved::{Involved, InvolvedQueries, Query};

const TERRAIN: &str = "terrain";

/// Fills the terrain cell under a position to the maximum water level.
/// Emits no fact.
#[derive(Clone, Copy, Debug, Default)]
pub struct DumpWaterHandler;

impl EventHandler for DumpWaterHandler {
    fn kind(&self) -> EventKind {
        EventKind::DumpWater
    }

    fn merge_key(&self, event: &Event) -> MergeKey {
        match event {
            Event::DumpWater { position, .. } => MergeKey::cell(*position),
            other => MergeKey::Entity(other.actor()),
        }
    }

    fn involves(&self, event: &Event) -> InvolvedQueries {
        match event {
            Event::DumpWater { position, .. } => {
                InvolvedQueries::new().fresh(TERRAIN, Query::TerrainAt(*position))
            }
            _ => InvolvedQueries::new(),
        }
    }

    fn apply(&self, involved: &mut Involved, event: &Event, _ctx: &mut Context) -> HandlerResult<()> {
        let Event::DumpWater { position, .. } = event else {
            return Err(wrong_kind(EventKind::DumpWater, event));
        };
        involved.component::<Terrain>(TERRAIN)?;
        let terrain = involved.fork(TERRAIN)?.mutable::<Terrain>();
        if !terrain.set_water(*position, MAX_WATER_LEVEL) {
            return Err(HandlerError::InvalidEvent(format!(
                "position {position:?} is outside the resolved terrain shard"
            )));
        }
        Ok(())
    }
}
