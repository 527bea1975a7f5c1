//! # Spatial Index
//!
//! Uniform hash grid over world space. Each entry is a point or a box and is
//! registered in every cell it overlaps. Volumes that would span too many
//! cells are kept in a side list and checked linearly, and so is every entry
//! when a query itself spans too many cells.
//!
//! ```text
//!   cell (x, y, z) = floor(p / cell_size)
//!
//!   ┌────┬────┬────┐
//!   │ a  │ a  │    │   a: box spanning two cells
//!   ├────┼────┼────┤   b: point
//!   │    │ b  │    │
//!   └────┴────┴────┘
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tessera_core::{Aabb, EntityId, Vec3};

/// Entries spanning more cells than this go to the linear list.
pub const MAX_CELLS_PER_ENTRY: u64 = 512;

/// Queries spanning more cells than this scan every entry.
pub const MAX_CELLS_PER_QUERY: u64 = 4096;

/// Bounding volume of an indexed entity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Volume {
    /// A single point.
    Point(Vec3),
    /// An axis-aligned box.
    Box(Aabb),
}

// Queries are closed on every face so flat boxes and points on a query's
// upper face are found.
impl Volume {
    fn covers_point(&self, p: Vec3) -> bool {
        match self {
            Self::Point(q) => *q == p,
            Self::Box(b) => b.contains_closed(p),
        }
    }

    fn intersects_box(&self, query: &Aabb) -> bool {
        match self {
            Self::Point(q) => query.contains_closed(*q),
            Self::Box(b) => b.intersects_closed(query),
        }
    }

    fn within_sphere(&self, center: Vec3, radius_sq: f32) -> bool {
        match self {
            Self::Point(q) => q.distance_squared(center) <= radius_sq,
            Self::Box(b) => b.distance_squared_to(center) <= radius_sq,
        }
    }

    fn extent(&self) -> (Vec3, Vec3) {
        match self {
            Self::Point(p) => (*p, *p),
            Self::Box(b) => (b.min, b.max),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Cell(i32, i32, i32);

/// Inclusive range of cells.
#[derive(Clone, Copy, Debug)]
struct CellRange {
    min: Cell,
    max: Cell,
}

impl CellRange {
    fn count(&self) -> u64 {
        let span = |lo: i32, hi: i32| u64::try_from(i64::from(hi) - i64::from(lo) + 1).unwrap_or(0);
        span(self.min.0, self.max.0)
            .saturating_mul(span(self.min.1, self.max.1))
            .saturating_mul(span(self.min.2, self.max.2))
    }

    fn cells(self) -> impl Iterator<Item = Cell> {
        (self.min.0..=self.max.0).flat_map(move |x| {
            (self.min.1..=self.max.1)
                .flat_map(move |y| (self.min.2..=self.max.2).map(move |z| Cell(x, y, z)))
        })
    }
}

#[derive(Clone, Debug)]
struct Entry {
    volume: Volume,
    /// `None` when the entry lives in the oversized list.
    cells: Option<CellRange>,
}

/// Hash-grid spatial index.
#[derive(Clone, Debug)]
pub struct SpatialIndex {
    cell_size: f32,
    cells: HashMap<Cell, Vec<EntityId>>,
    entries: HashMap<EntityId, Entry>,
    oversized: HashSet<EntityId>,
}

impl SpatialIndex {
    /// Creates an empty index. Non-positive cell sizes fall back to 1.
    #[must_use]
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };
        Self {
            cell_size,
            cells: HashMap::new(),
            entries: HashMap::new(),
            oversized: HashSet::new(),
        }
    }

    /// Edge length of a grid cell.
    #[inline]
    #[must_use]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of indexed entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is indexed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current volume of an entity.
    #[must_use]
    pub fn volume(&self, id: EntityId) -> Option<Volume> {
        self.entries.get(&id).map(|e| e.volume)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn cell_of(&self, p: Vec3) -> Cell {
        let c = |v: f32| (v / self.cell_size).floor() as i32;
        Cell(c(p.x), c(p.y), c(p.z))
    }

    fn range(&self, min: Vec3, max: Vec3) -> CellRange {
        CellRange {
            min: self.cell_of(min),
            max: self.cell_of(max),
        }
    }

    /// Inserts or moves an entity.
    pub fn update(&mut self, id: EntityId, volume: Volume) {
        self.delete(id);

        let (min, max) = volume.extent();
        let range = self.range(min, max);
        let cells = if range.count() > MAX_CELLS_PER_ENTRY {
            self.oversized.insert(id);
            None
        } else {
            for cell in range.cells() {
                self.cells.entry(cell).or_default().push(id);
            }
            Some(range)
        };
        self.entries.insert(id, Entry { volume, cells });
    }

    /// Removes an entity. Returns true if it was indexed.
    pub fn delete(&mut self, id: EntityId) -> bool {
        let Some(entry) = self.entries.remove(&id) else {
            return false;
        };
        match entry.cells {
            Some(range) => {
                for cell in range.cells() {
                    if let Some(bucket) = self.cells.get_mut(&cell) {
                        bucket.retain(|other| *other != id);
                        if bucket.is_empty() {
                            self.cells.remove(&cell);
                        }
                    }
                }
            }
            None => {
                self.oversized.remove(&id);
            }
        }
        true
    }

    /// Entities whose volume covers `p`.
    #[must_use]
    pub fn scan_point(&self, p: Vec3) -> Vec<EntityId> {
        let range = self.range(p, p);
        self.collect(range, |v| v.covers_point(p))
    }

    /// Entities whose volume intersects `query`.
    #[must_use]
    pub fn scan_box(&self, query: &Aabb) -> Vec<EntityId> {
        let range = self.range(query.min, query.max);
        self.collect(range, |v| v.intersects_box(query))
    }

    /// Entities whose volume comes within `radius` of `center`.
    #[must_use]
    pub fn scan_sphere(&self, center: Vec3, radius: f32) -> Vec<EntityId> {
        let radius = radius.max(0.0);
        let half = Vec3::new(radius, radius, radius);
        let range = self.range(center - half, center + half);
        let radius_sq = radius * radius;
        self.collect(range, |v| v.within_sphere(center, radius_sq))
    }

    fn collect(&self, range: CellRange, matches: impl Fn(&Volume) -> bool) -> Vec<EntityId> {
        let mut found: Vec<EntityId> = if range.count() > MAX_CELLS_PER_QUERY {
            self.entries
                .iter()
                .filter(|(_, e)| matches(&e.volume))
                .map(|(id, _)| *id)
                .collect()
        } else {
            let mut seen = HashSet::new();
            range
                .cells()
                .filter_map(|cell| self.cells.get(&cell))
                .flatten()
                .chain(self.oversized.iter())
                .filter(|id| seen.insert(**id))
                .filter(|id| self.entries.get(*id).is_some_and(|e| matches(&e.volume)))
                .copied()
                .collect()
        };
        found.sort_unstable();
        found
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(32.0)
    }
}
