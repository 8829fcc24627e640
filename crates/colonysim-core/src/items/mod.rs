//! Item pool - stacks, reservations, containers and spoilage.
//!
//! Items live in a generational arena; a stale `ItemId` fails closed on
//! lookup instead of aliasing a recycled slot. Container membership is a
//! parent index on the child (`contained_in`) plus a direct-child count on
//! the parent.

mod containers;
mod spatial;

pub use containers::*;
pub use spatial::{ItemSpatialIndex, NearestGround};

use colonysim_logic::balance::BalanceTable;
use colonysim_logic::constants::limits::MAX_ITEMS;
use colonysim_logic::items::{container_def, flags, item_max_stack, ItemType, MaterialType};
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, Key, SlotMap};

use crate::common::{CellPos, Vec3};
use crate::movers::MoverId;

new_key_type! {
    /// Generational handle for an item record.
    pub struct ItemId;
}

/// Slot index of an arena key, stable for the life of the record.
pub fn slot_index<K: Key>(key: K) -> u32 {
    (key.data().as_ffi() & 0xFFFF_FFFF) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemState {
    OnGround,
    Carried,
    InStockpile,
    InContainer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Condition {
    #[default]
    Fresh,
    Stale,
    Rotten,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_type: ItemType,
    pub state: ItemState,
    pub pos: Vec3,
    pub material: MaterialType,
    pub stack_count: u32,
    pub reserved_by: Option<MoverId>,
    /// Seconds during which work-givers skip this item.
    pub unreachable_cooldown: f32,
    pub contained_in: Option<ItemId>,
    /// Direct children only.
    pub content_count: u32,
    /// Bloom filter over descendant types. Bits are only ever added.
    pub content_type_mask: u64,
    /// Game-seconds of spoilage accumulated.
    pub spoilage_timer: f32,
    pub condition: Condition,
}

impl Item {
    pub fn new(item_type: ItemType, pos: Vec3, stack_count: u32, material: MaterialType) -> Self {
        Self {
            item_type,
            state: ItemState::OnGround,
            pos,
            material,
            stack_count: stack_count.max(1),
            reserved_by: None,
            unreachable_cooldown: 0.0,
            contained_in: None,
            content_count: 0,
            content_type_mask: 0,
            spoilage_timer: 0.0,
            condition: Condition::Fresh,
        }
    }

    pub fn cell(&self) -> CellPos {
        self.pos.cell()
    }

    pub fn is_container(&self) -> bool {
        container_def(self.item_type).is_some()
    }

    pub fn is_edible(&self) -> bool {
        self.item_type.has_flag(flags::EDIBLE) && self.condition != Condition::Rotten
    }
}

#[derive(Debug, Clone, Default)]
pub struct ItemPool {
    pub(crate) items: SlotMap<ItemId, Item>,
    pub(crate) spatial: ItemSpatialIndex,
    /// Highest arena slot index ever handed out.
    pub(crate) high_water: usize,
}

impl ItemPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Highest slot index ever occupied, an upper bound on live slot
    /// indices. Deleting items never lowers it; freed slots are reused
    /// below it first.
    pub fn high_water_mark(&self) -> usize {
        self.high_water
    }

    fn insert(&mut self, item: Item) -> ItemId {
        let id = self.items.insert(item);
        self.high_water = self.high_water.max(slot_index(id) as usize);
        id
    }

    /// Raise the mark to cover every live record, e.g. after a load.
    pub(crate) fn restore_high_water(&mut self, saved: usize) {
        let live = self.items.keys().map(|id| slot_index(id) as usize).max().unwrap_or(0);
        self.high_water = saved.max(live);
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &Item)> {
        self.items.iter()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.keys().collect()
    }

    /// Spawn a ground item at the center of `cell`. Returns `None` when the
    /// pool is full.
    pub fn spawn_item(&mut self, item_type: ItemType, cell: CellPos, stack_count: u32, material: MaterialType) -> Option<ItemId> {
        if self.items.len() >= MAX_ITEMS {
            log::warn!("item pool exhausted ({} items), dropping spawn of {}", MAX_ITEMS, item_type.name());
            return None;
        }
        let stack = stack_count.clamp(1, item_max_stack(item_type));
        Some(self.insert(Item::new(item_type, cell.center(), stack, material)))
    }

    /// Spawn with the type's default material.
    pub fn spawn_default(&mut self, item_type: ItemType, cell: CellPos, stack_count: u32) -> Option<ItemId> {
        self.spawn_item(item_type, cell, stack_count, item_type.def().default_material)
    }

    /// Remove an item. A nested item is unlinked from its parent; a
    /// container's children fall out onto the container's cell.
    pub fn delete_item(&mut self, id: ItemId) -> Option<Item> {
        let item = self.items.remove(id)?;
        if let Some(parent) = item.contained_in {
            if let Some(p) = self.items.get_mut(parent) {
                p.content_count = p.content_count.saturating_sub(1);
            }
        }
        if item.content_count > 0 {
            let drop_at = item.pos.cell().center();
            for (_, child) in self.items.iter_mut() {
                if child.contained_in == Some(id) {
                    child.contained_in = None;
                    child.state = ItemState::OnGround;
                    child.pos = drop_at;
                }
            }
        }
        Some(item)
    }

    /// Move as much of `source` into `target` as fits. A fully merged
    /// source is deleted. Returns the count moved.
    pub fn merge_item_into_stack(&mut self, target: ItemId, source: ItemId) -> u32 {
        self.merge_up_to(target, source, u32::MAX)
    }

    /// As `merge_item_into_stack`, moving at most `limit` units.
    pub fn merge_up_to(&mut self, target: ItemId, source: ItemId, limit: u32) -> u32 {
        if target == source {
            return 0;
        }
        let (Some(t), Some(s)) = (self.items.get(target), self.items.get(source)) else {
            return 0;
        };
        if t.item_type != s.item_type || t.material != s.material {
            return 0;
        }
        let room = item_max_stack(t.item_type).saturating_sub(t.stack_count);
        let moved = room.min(s.stack_count).min(limit);
        if moved == 0 {
            return 0;
        }
        let (s_count, s_timer) = (s.stack_count, s.spoilage_timer);
        if let Some(t) = self.items.get_mut(target) {
            // Weighted spoilage so merging never refreshes old food.
            let total = (t.stack_count + moved) as f32;
            t.spoilage_timer = (t.spoilage_timer * t.stack_count as f32 + s_timer * moved as f32) / total;
            t.stack_count += moved;
        }
        if moved == s_count {
            self.delete_item(source);
        } else if let Some(s) = self.items.get_mut(source) {
            s.stack_count -= moved;
        }
        moved
    }

    /// Split `count` off `id` into a new ground record at the same place.
    /// The new record copies material, spoilage and condition.
    pub fn split_stack(&mut self, id: ItemId, count: u32) -> Option<ItemId> {
        let item = self.items.get(id)?;
        if count == 0 || count >= item.stack_count {
            return None;
        }
        if self.items.len() >= MAX_ITEMS {
            log::warn!("item pool exhausted, cannot split stack");
            return None;
        }
        let mut split = Item::new(item.item_type, item.pos, count, item.material);
        split.spoilage_timer = item.spoilage_timer;
        split.condition = item.condition;
        if let Some(item) = self.items.get_mut(id) {
            item.stack_count -= count;
        }
        Some(self.insert(split))
    }

    /// Rebuild the ground-item spatial index.
    pub fn rebuild_spatial(&mut self, width: i32, height: i32, depth: i32) {
        self.spatial.rebuild(&self.items, width, height, depth);
    }

    pub fn spatial(&self) -> &ItemSpatialIndex {
        &self.spatial
    }

    /// Ground items indexed at one tile (as of the last rebuild).
    pub fn query_item_at_tile(&self, p: CellPos) -> &[ItemId] {
        self.spatial.at_tile(p)
    }

    /// Visit indexed ground items within a square radius on one z-level.
    pub fn query_items_in_radius(&self, center: CellPos, radius: i32, mut cb: impl FnMut(ItemId)) {
        self.spatial.in_radius(center, radius, |id| cb(id));
    }

    /// Indexed ground items passing `keep`, nearest to `from` first.
    pub fn nearest_ground<F>(&self, from: CellPos, keep: F) -> NearestGround<'_, F>
    where
        F: FnMut(ItemId, &Item) -> bool,
    {
        NearestGround::new(self, from, keep)
    }

    /// Ground items at a tile, read directly from the arena.
    pub fn ground_items_at(&self, p: CellPos) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|(_, it)| it.state == ItemState::OnGround && it.cell() == p)
            .map(|(id, _)| id)
            .collect()
    }

    /// Decay unreachable cooldowns and advance spoilage.
    pub fn items_tick(&mut self, dt: f32, balance: &BalanceTable) {
        let mut modifiers: Vec<(ItemId, f32)> = Vec::new();
        for (id, item) in self.items.iter() {
            if item.item_type.has_flag(flags::SPOILS) {
                let m = item
                    .contained_in
                    .and_then(|p| self.items.get(p))
                    .and_then(|p| container_def(p.item_type))
                    .map(|c| c.spoilage_modifier)
                    .unwrap_or(1.0);
                modifiers.push((id, m));
            }
        }
        for (_, item) in self.items.iter_mut() {
            if item.unreachable_cooldown > 0.0 {
                item.unreachable_cooldown = (item.unreachable_cooldown - dt).max(0.0);
            }
        }
        for (id, m) in modifiers {
            if let Some(item) = self.items.get_mut(id) {
                item.spoilage_timer += dt * m;
                let limit = balance.game_hours_to_game_seconds(item.item_type.def().spoil_hours);
                item.condition = condition_for(item.spoilage_timer, limit);
            }
        }
    }
}

/// Fresh below half the spoil time, stale until the limit, rotten after.
pub fn condition_for(timer: f32, limit: f32) -> Condition {
    if limit <= 0.0 {
        return Condition::Fresh;
    }
    let frac = timer / limit;
    if frac >= 1.0 {
        Condition::Rotten
    } else if frac >= 0.5 {
        Condition::Stale
    } else {
        Condition::Fresh
    }
}
