//! # Component System
//!
//! The component schema is fixed and typed: every entity has one optional
//! slot per component kind. Absence of a value means the entity lacks that
//! component. Each kind owns one bit in [`ComponentMask`].

use serde::{Deserialize, Serialize};

use super::entity::EntityId;
use super::math::{Aabb, Vec3};

/// Marker trait for component types.
///
/// # Example
///
/// ```rust,ignore
/// let mut components = Components::default();
/// components.set(Health::full(100));
/// assert!(components.mask().contains(Health::KIND));
/// ```
pub trait Component: Clone + PartialEq + Default + std::fmt::Debug + Send + Sync + 'static {
    /// Discriminator for this component type.
    ///
    /// Its bit position in [`ComponentMask`].
    const KIND: ComponentKind;

    /// Borrows this component's slot.
    fn slot(components: &Components) -> Option<&Self>;

    /// Mutably borrows this component's slot.
    fn slot_mut(components: &mut Components) -> &mut Option<Self>;
}

/// Discriminator of a component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ComponentKind {
    /// [`Position`]
    Position = 0,
    /// [`Bounds`]
    Bounds = 1,
    /// [`Label`]
    Label = 2,
    /// [`Inventory`]
    Inventory = 3,
    /// [`Health`]
    Health = 4,
    /// [`ItemDrop`]
    ItemDrop = 5,
    /// [`Terrain`]
    Terrain = 6,
    /// [`CreatedBy`]
    CreatedBy = 7,
}

impl ComponentKind {
    /// Every kind, in bit order.
    pub const ALL: [Self; 8] = [
        Self::Position,
        Self::Bounds,
        Self::Label,
        Self::Inventory,
        Self::Health,
        Self::ItemDrop,
        Self::Terrain,
        Self::CreatedBy,
    ];

    /// Bit of this kind inside a [`ComponentMask`].
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u16 {
        1 << (self as u8)
    }
}

/// Bitmask of component kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentMask(u16);

impl ComponentMask {
    /// No components.
    pub const EMPTY: Self = Self(0);

    /// Every component kind.
    pub const ALL: Self = Self(0xFF);

    /// Builds a mask from a list of kinds.
    #[must_use]
    pub fn of(kinds: &[ComponentKind]) -> Self {
        kinds.iter().fold(Self::EMPTY, |mask, kind| mask.with(*kind))
    }

    /// Returns a copy with `kind` added.
    #[inline]
    #[must_use]
    pub const fn with(self, kind: ComponentKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Adds a kind.
    #[inline]
    pub fn insert(&mut self, kind: ComponentKind) {
        self.0 |= kind.bit();
    }

    /// Removes a kind.
    #[inline]
    pub fn remove(&mut self, kind: ComponentKind) {
        self.0 &= !kind.bit();
    }

    /// Returns true if `kind` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, kind: ComponentKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Returns true if every kind in `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains_all(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of both masks.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if no kind is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of kinds set.
    #[inline]
    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterates the kinds set, in bit order.
    pub fn iter(self) -> impl Iterator<Item = ComponentKind> {
        ComponentKind::ALL.into_iter().filter(move |kind| self.contains(*kind))
    }
}

/// Unique identifier for an item type.
pub type ItemId = u32;

/// A stack of identical items.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item type.
    pub item_id: ItemId,
    /// Number of items.
    pub count: u32,
}

impl ItemStack {
    /// Creates a stack.
    #[inline]
    #[must_use]
    pub const fn new(item_id: ItemId, count: u32) -> Self {
        Self { item_id, count }
    }
}

/// Point position in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position(pub Vec3);

impl Position {
    /// Creates a position.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self(Vec3::new(x, y, z))
    }
}

/// Axis-aligned extent in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds(pub Aabb);

/// Display text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label(pub String);

/// Item stacks carried by an entity.
///
/// Stacks of the same item are merged, so each item id appears at most once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// Held stacks, in insertion order.
    pub stacks: Vec<ItemStack>,
}

impl Inventory {
    /// Total count held of `item_id`.
    #[must_use]
    pub fn count(&self, item_id: ItemId) -> u32 {
        self.stacks
            .iter()
            .find(|s| s.item_id == item_id)
            .map_or(0, |s| s.count)
    }

    /// Adds a stack, merging with an existing one.
    pub fn add(&mut self, stack: ItemStack) {
        if stack.count == 0 {
            return;
        }
        match self.stacks.iter_mut().find(|s| s.item_id == stack.item_id) {
            Some(existing) => existing.count = existing.count.saturating_add(stack.count),
            None => self.stacks.push(stack),
        }
    }

    /// Removes `count` of `item_id`. Leaves the inventory untouched and
    /// returns false if not enough is held.
    #[must_use]
    pub fn take(&mut self, item_id: ItemId, count: u32) -> bool {
        let Some(index) = self.stacks.iter().position(|s| s.item_id == item_id) else {
            return count == 0;
        };
        let stack = &mut self.stacks[index];
        if stack.count < count {
            return false;
        }
        stack.count -= count;
        if stack.count == 0 {
            self.stacks.remove(index);
        }
        true
    }
}

/// Hit points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Current hit points.
    pub current: u32,
    /// Maximum hit points.
    pub maximum: u32,
}

impl Health {
    /// Full health.
    #[inline]
    #[must_use]
    pub const fn full(maximum: u32) -> Self {
        Self { current: maximum, maximum }
    }

    /// Applies damage, saturating at zero. Returns the damage actually dealt.
    pub fn damage(&mut self, amount: u32) -> u32 {
        let dealt = amount.min(self.current);
        self.current -= dealt;
        dealt
    }

    /// Returns true at zero hit points.
    #[inline]
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }
}

/// An item stack lying in the world, waiting to be collected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDrop(pub ItemStack);

/// Edge length of a terrain shard in cells (1 cell = 1 world unit).
pub const TERRAIN_SHARD_SIZE: u32 = 16;

/// Highest water level a cell can hold.
pub const MAX_WATER_LEVEL: u8 = 15;

/// A terrain shard: a square patch of columns with a water level each.
///
/// Columns are indexed by `x + z * size` relative to the origin.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terrain {
    /// World X of the shard's first column.
    pub origin_x: i32,
    /// World Z of the shard's first column.
    pub origin_z: i32,
    /// Columns per side.
    pub size: u32,
    /// Water level per column.
    pub water: Vec<u8>,
}

impl Terrain {
    /// Creates a dry terrain shard.
    #[must_use]
    pub fn new(origin_x: i32, origin_z: i32, size: u32) -> Self {
        Self {
            origin_x,
            origin_z,
            size,
            water: vec![0; (size as usize) * (size as usize)],
        }
    }

    /// Column index covering a world position, if inside the shard.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn column_index(&self, p: Vec3) -> Option<usize> {
        let x = i64::from(p.x.floor() as i32) - i64::from(self.origin_x);
        let z = i64::from(p.z.floor() as i32) - i64::from(self.origin_z);
        let size = i64::from(self.size);
        if x < 0 || z < 0 || x >= size || z >= size {
            return None;
        }
        usize::try_from(x + z * size).ok()
    }

    /// Water level at a world position.
    #[must_use]
    pub fn water_at(&self, p: Vec3) -> Option<u8> {
        self.column_index(p).and_then(|i| self.water.get(i).copied())
    }

    /// Sets the water level at a world position, clamped to
    /// [`MAX_WATER_LEVEL`]. Returns false if the position is outside.
    pub fn set_water(&mut self, p: Vec3, level: u8) -> bool {
        match self.column_index(p).and_then(|i| self.water.get_mut(i)) {
            Some(cell) => {
                *cell = level.min(MAX_WATER_LEVEL);
                true
            }
            None => false,
        }
    }

    /// World-space box covered by this shard between `min_y` and `max_y`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bounds(&self, min_y: f32, max_y: f32) -> Aabb {
        let min = Vec3::new(self.origin_x as f32, min_y, self.origin_z as f32);
        let extent = self.size as f32;
        Aabb::new(min, Vec3::new(min.x + extent, max_y, min.z + extent))
    }
}

/// Plain reference to the entity that created this one.
///
/// Not an owning link: deleting the creator leaves this dangling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedBy(pub EntityId);

/// One optional slot per component kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Components {
    /// Position slot.
    pub position: Option<Position>,
    /// Bounds slot.
    pub bounds: Option<Bounds>,
    /// Label slot.
    pub label: Option<Label>,
    /// Inventory slot.
    pub inventory: Option<Inventory>,
    /// Health slot.
    pub health: Option<Health>,
    /// Item drop slot.
    pub item_drop: Option<ItemDrop>,
    /// Terrain slot.
    pub terrain: Option<Terrain>,
    /// Creator slot.
    pub created_by: Option<CreatedBy>,
}

macro_rules! impl_components {
    ($($ty:ident => $field:ident),* $(,)?) => {
        $(
            impl Component for $ty {
                const KIND: ComponentKind = ComponentKind::$ty;

                #[inline]
                fn slot(components: &Components) -> Option<&Self> {
                    components.$field.as_ref()
                }

                #[inline]
                fn slot_mut(components: &mut Components) -> &mut Option<Self> {
                    &mut components.$field
                }
            }
        )*

        impl Components {
            /// Bitmask of the occupied slots.
            #[must_use]
            pub fn mask(&self) -> ComponentMask {
                let mut mask = ComponentMask::EMPTY;
                $(
                    if self.$field.is_some() {
                        mask.insert(ComponentKind::$ty);
                    }
                )*
                mask
            }

            /// Returns true if the slot for `kind` holds the same value in both.
            #[must_use]
            pub fn slot_eq(&self, other: &Self, kind: ComponentKind) -> bool {
                match kind {
                    $(ComponentKind::$ty => self.$field == other.$field,)*
                }
            }

            /// Copies the slot for `kind` from `source`.
            pub fn copy_slot(&mut self, source: &Self, kind: ComponentKind) {
                match kind {
                    $(ComponentKind::$ty => self.$field.clone_from(&source.$field),)*
                }
            }

            /// Empties the slot for `kind`.
            pub fn clear_kind(&mut self, kind: ComponentKind) {
                match kind {
                    $(ComponentKind::$ty => self.$field = None,)*
                }
            }
        }
    };
}

impl_components! {
    Position => position,
    Bounds => bounds,
    Label => label,
    Inventory => inventory,
    Health => health,
    ItemDrop => item_drop,
    Terrain => terrain,
    CreatedBy => created_by,
}

impl Components {
    /// Returns the component, if present.
    #[inline]
    #[must_use]
    pub fn get<C: Component>(&self) -> Option<&C> {
        C::slot(self)
    }

    /// Stores a component, replacing any previous value.
    #[inline]
    pub fn set<C: Component>(&mut self, value: C) {
        *C::slot_mut(self) = Some(value);
    }

    /// Removes a component, returning it.
    #[inline]
    pub fn take<C: Component>(&mut self) -> Option<C> {
        C::slot_mut(self).take()
    }

    /// Builder form of [`Components::set`].
    #[must_use]
    pub fn with<C: Component>(mut self, value: C) -> Self {
        self.set(value);
        self
    }

    /// Returns true if every kind in `mask` is present.
    #[inline]
    #[must_use]
    pub fn has_all(&self, mask: ComponentMask) -> bool {
        self.mask().contains_all(mask)
    }

    /// Applies a diff produced by a fork.
    pub fn apply_patch(&mut self, patch: &Patch) {
        for kind in patch.mask.iter() {
            self.copy_slot(&patch.values, kind);
        }
    }
}

/// Minimal diff between two component sets.
///
/// `mask` lists the changed kinds; for each, `values` holds the new slot
/// content (`None` meaning the component was removed).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Changed kinds.
    pub mask: ComponentMask,
    /// New values for the changed kinds. Other slots are ignored.
    pub values: Components,
}

impl Patch {
    /// Computes the diff turning `base` into `target`, restricted to `candidates`.
    #[must_use]
    pub fn diff(base: &Components, target: &Components, candidates: ComponentMask) -> Self {
        let mut patch = Self::default();
        for kind in candidates.iter() {
            if !base.slot_eq(target, kind) {
                patch.mask.insert(kind);
                patch.values.copy_slot(target, kind);
            }
        }
        patch
    }

    /// Returns true if nothing changed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_tracks_slots() {
        let c = Components::default()
            .with(Position::new(1.0, 2.0, 3.0))
            .with(Health::full(10));

        let mask = c.mask();
        assert!(mask.contains(ComponentKind::Position));
        assert!(mask.contains(ComponentKind::Health));
        assert!(!mask.contains(ComponentKind::Label));
        assert_eq!(mask.len(), 2);
        assert!(c.has_all(ComponentMask::of(&[ComponentKind::Position])));
    }

    #[test]
    fn test_patch_diff_is_minimal() {
        let base = Components::default()
            .with(Label("a".into()))
            .with(Health::full(10));
        let mut target = base.clone();
        target.set(Label("b".into()));
        target.take::<Health>();

        let patch = Patch::diff(&base, &target, ComponentMask::ALL);
        assert_eq!(patch.mask, ComponentMask::of(&[ComponentKind::Label, ComponentKind::Health]));

        let mut applied = base.clone();
        applied.apply_patch(&patch);
        assert_eq!(applied, target);
    }

    #[test]
    fn test_inventory_add_take() {
        let mut inv = Inventory::default();
        inv.add(ItemStack::new(7, 3));
        inv.add(ItemStack::new(7, 2));
        assert_eq!(inv.count(7), 5);

        assert!(!inv.take(7, 6));
        assert_eq!(inv.count(7), 5);
        assert!(inv.take(7, 5));
        assert!(inv.stacks.is_empty());
    }

    #[test]
    fn test_health_damage_saturates() {
        let mut h = Health::full(10);
        assert_eq!(h.damage(4), 4);
        assert_eq!(h.damage(100), 6);
        assert!(h.is_dead());
    }

    #[test]
    fn test_terrain_water() {
        let mut t = Terrain::new(0, 0, TERRAIN_SHARD_SIZE);
        let p = Vec3::new(10.0, 5.0, 10.0);

        assert_eq!(t.water_at(p), Some(0));
        assert!(t.set_water(p, 200));
        assert_eq!(t.water_at(p), Some(MAX_WATER_LEVEL));
        assert!(!t.set_water(Vec3::new(-1.0, 0.0, 0.0), 1));
        assert!(t.bounds(0.0, 256.0).contains(p));
    }
}
