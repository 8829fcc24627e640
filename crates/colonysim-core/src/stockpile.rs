//! Stockpiles - filtered storage zones with per-slot state.
//!
//! A slot is one tile of the bounding box. A slot holds one representative
//! item record (or one container); `slot_counts` mirrors that record's stack
//! size. In-transit deliveries are counted per slot in `reserved_by`, and the
//! units they carry in `reserved_units`. A slot admits another delivery while
//! `count + reserved_units < cap`, where `cap` is the smaller of the
//! stockpile's stack limit and the item's own limit, and a delivery is
//! granted at most the units still free.

use colonysim_logic::constants::limits::MAX_STOCKPILES;
use colonysim_logic::items::{container_accepts, container_def, item_max_stack, ItemType, MaterialType};
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::common::CellPos;
use crate::items::{put_item_in_container, ItemId, ItemPool, ItemState, Stowed};
use crate::world::Grid;

new_key_type! {
    /// Generational handle for a stockpile.
    pub struct StockpileId;
}

pub const DEFAULT_MAX_STACK: u32 = 20;
pub const DEFAULT_PRIORITY: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stockpile {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub width: i32,
    pub height: i32,
    pub active_cells: Vec<bool>,
    pub allowed_types: [bool; ItemType::COUNT],
    pub allowed_materials: [bool; MaterialType::COUNT],

    pub slots: Vec<Option<ItemId>>,
    pub slot_counts: Vec<u32>,
    pub slot_types: Vec<Option<ItemType>>,
    pub slot_materials: Vec<MaterialType>,
    pub slot_is_container: Vec<bool>,
    /// In-transit deliveries per slot.
    pub reserved_by: Vec<u32>,
    /// Units promised to the slot by those deliveries.
    pub reserved_units: Vec<u32>,
    /// First loose ground item on each slot's tile, rebuilt every tick.
    #[serde(skip)]
    pub ground_item: Vec<Option<ItemId>>,
    pub free_slot_count: usize,

    pub max_stack_size: u32,
    /// 1 (lowest) to 9 (highest).
    pub priority: u8,
}

/// What happened to a delivered item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placed {
    /// The item now sits in (or was merged into) the slot.
    Stored(ItemId),
    /// The slot filled up. This record is the part that did not fit; any
    /// other part was stored.
    Overflow(ItemId),
}

impl Stockpile {
    pub fn new(x: i32, y: i32, z: i32, width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let n = (width * height) as usize;
        Self {
            x,
            y,
            z,
            width,
            height,
            active_cells: vec![true; n],
            allowed_types: [true; ItemType::COUNT],
            allowed_materials: [true; MaterialType::COUNT],
            slots: vec![None; n],
            slot_counts: vec![0; n],
            slot_types: vec![None; n],
            slot_materials: vec![MaterialType::None; n],
            slot_is_container: vec![false; n],
            reserved_by: vec![0; n],
            reserved_units: vec![0; n],
            ground_item: vec![None; n],
            free_slot_count: n,
            max_stack_size: DEFAULT_MAX_STACK,
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.active_cells.len()
    }

    /// Slot index for an absolute cell, if the cell is inside the box.
    pub fn slot_index(&self, p: CellPos) -> Option<usize> {
        let lx = p.x - self.x;
        let ly = p.y - self.y;
        if p.z != self.z || lx < 0 || ly < 0 || lx >= self.width || ly >= self.height {
            return None;
        }
        Some((ly * self.width + lx) as usize)
    }

    pub fn slot_cell(&self, idx: usize) -> CellPos {
        let i = idx as i32;
        CellPos::new(self.x + i % self.width, self.y + i / self.width, self.z)
    }

    pub fn contains_cell(&self, p: CellPos) -> bool {
        self.slot_index(p).map(|i| self.active_cells[i]).unwrap_or(false)
    }

    pub fn active_cell_count(&self) -> usize {
        self.active_cells.iter().filter(|a| **a).count()
    }

    pub fn accepts(&self, item_type: ItemType, material: MaterialType) -> bool {
        self.allowed_types[item_type.index()] && self.allowed_materials[material.index()]
    }

    pub fn set_type_allowed(&mut self, item_type: ItemType, allowed: bool) {
        self.allowed_types[item_type.index()] = allowed;
    }

    pub fn set_material_allowed(&mut self, material: MaterialType, allowed: bool) {
        self.allowed_materials[material.index()] = allowed;
    }

    /// Allow exactly the listed types.
    pub fn set_only_types(&mut self, types: &[ItemType]) {
        self.allowed_types = [false; ItemType::COUNT];
        for t in types {
            self.allowed_types[t.index()] = true;
        }
    }

    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority.clamp(1, 9);
    }

    /// Stack cap for a slot of this type.
    pub fn cap_for(&self, item_type: ItemType) -> u32 {
        self.max_stack_size.min(item_max_stack(item_type)).max(1)
    }

    /// Units a new delivery of `item_type` may still bring to slot `i`.
    pub fn slot_room(&self, i: usize, item_type: ItemType) -> u32 {
        self.cap_for(item_type)
            .saturating_sub(self.slot_counts[i] + self.reserved_units[i])
    }

    fn slot_has_room(&self, i: usize, items: &ItemPool) -> bool {
        if self.slot_is_container[i] {
            let Some(c) = self.slots[i].and_then(|id| items.get(id)) else {
                return false;
            };
            let max = container_def(c.item_type).map(|d| d.max_contents).unwrap_or(0);
            return c.content_count + self.reserved_by[i] < max;
        }
        match self.slot_types[i] {
            Some(t) => self.slot_room(i, t) > 0,
            None => true,
        }
    }

    /// Whether slot `i` counts toward `free_slot_count`.
    pub fn is_slot_free(&self, i: usize, items: &ItemPool) -> bool {
        if !self.active_cells[i] || self.ground_item[i].is_some() {
            return false;
        }
        if self.slot_counts[i] == 0 && !self.slot_is_container[i] {
            return true;
        }
        self.slot_has_room(i, items)
    }

    pub fn compute_free_slot_count(&self, items: &ItemPool) -> usize {
        (0..self.slot_count()).filter(|i| self.is_slot_free(*i, items)).count()
    }

    pub fn recompute_free_slots(&mut self, items: &ItemPool) {
        self.free_slot_count = self.compute_free_slot_count(items);
    }

    /// A slot that can take one more delivery of (type, material). Partial
    /// stacks of the same kind come first, then containers with room, then
    /// empty tiles.
    pub fn find_free_slot(&self, grid: &Grid, items: &ItemPool, item_type: ItemType, material: MaterialType) -> Option<CellPos> {
        if !self.accepts(item_type, material) || self.free_slot_count == 0 {
            return None;
        }
        let usable = |i: usize| self.active_cells[i] && self.ground_item[i].is_none() && grid.is_walkable(self.slot_cell(i));
        let partial = (0..self.slot_count()).find(|&i| {
            usable(i)
                && !self.slot_is_container[i]
                && self.slot_counts[i] > 0
                && self.slot_types[i] == Some(item_type)
                && self.slot_materials[i] == material
                && self.slot_room(i, item_type) > 0
        });
        if let Some(i) = partial {
            return Some(self.slot_cell(i));
        }

        let container = (0..self.slot_count()).find(|&i| {
            usable(i)
                && self.slot_is_container[i]
                && self.slots[i]
                    .and_then(|id| items.get(id))
                    .map(|c| container_accepts(c.item_type, item_type))
                    .unwrap_or(false)
                && self.slot_has_room(i, items)
        });
        if let Some(i) = container {
            return Some(self.slot_cell(i));
        }

        (0..self.slot_count())
            .find(|&i| {
                usable(i)
                    && !self.slot_is_container[i]
                    && self.slot_counts[i] == 0
                    && match self.slot_types[i] {
                        None => true,
                        Some(t) => t == item_type && self.slot_materials[i] == material && self.slot_room(i, t) > 0,
                    }
            })
            .map(|i| self.slot_cell(i))
    }

    /// Reserve room for one in-transit delivery of up to `units` at `p`.
    /// Returns the units granted, which may be fewer than asked for.
    pub fn reserve_slot(
        &mut self,
        p: CellPos,
        item_type: ItemType,
        material: MaterialType,
        units: u32,
        items: &ItemPool,
    ) -> Option<u32> {
        let i = self.slot_index(p)?;
        if units == 0 || !self.active_cells[i] || !self.accepts(item_type, material) {
            return None;
        }
        let granted = if self.slot_is_container[i] {
            if !self.slot_has_room(i, items) {
                return None;
            }
            units
        } else {
            if self.slot_types[i].is_some_and(|t| t != item_type || self.slot_materials[i] != material) {
                return None;
            }
            let room = self.slot_room(i, item_type);
            if room == 0 {
                return None;
            }
            if self.slot_types[i].is_none() {
                self.slot_types[i] = Some(item_type);
                self.slot_materials[i] = material;
            }
            units.min(room)
        };
        self.reserved_by[i] += 1;
        self.reserved_units[i] += granted;
        self.recompute_free_slots(items);
        Some(granted)
    }

    /// Drop one delivery of `units` from the slot's reservations.
    pub fn release_slot(&mut self, p: CellPos, units: u32, items: &ItemPool) {
        let Some(i) = self.slot_index(p) else {
            return;
        };
        self.reserved_by[i] = self.reserved_by[i].saturating_sub(1);
        self.reserved_units[i] = self.reserved_units[i].saturating_sub(units);
        self.reset_slot_type_if_idle(i);
        self.recompute_free_slots(items);
    }

    fn reset_slot_type_if_idle(&mut self, i: usize) {
        if self.slot_counts[i] == 0 && self.reserved_by[i] == 0 && self.slots[i].is_none() {
            self.slot_types[i] = None;
            self.slot_materials[i] = MaterialType::None;
            self.slot_is_container[i] = false;
        }
    }

    /// Store `item` in the slot at `p`, never past the slot's cap. An
    /// existing stack absorbs what fits and the rest is handed back.
    /// Reservations are untouched; a delivering job releases its own first.
    pub fn place_item(&mut self, p: CellPos, item: ItemId, items: &mut ItemPool) -> Placed {
        let Some(i) = self.slot_index(p) else {
            return Placed::Overflow(item);
        };
        let placed = self.place_without_reservation(i, item, items);
        self.recompute_free_slots(items);
        placed
    }

    fn place_without_reservation(&mut self, i: usize, item: ItemId, items: &mut ItemPool) -> Placed {
        let Some(it) = items.get(item) else {
            return Placed::Overflow(item);
        };
        let (item_type, material, count, is_container) = (it.item_type, it.material, it.stack_count, it.is_container());

        if self.slot_is_container[i] {
            let Some(container) = self.slots[i] else {
                return Placed::Overflow(item);
            };
            return match put_item_in_container(items, item, container) {
                Ok(Stowed::Merged(t)) => Placed::Stored(t),
                Ok(Stowed::Added(t)) => Placed::Stored(t),
                Err(_) => Placed::Overflow(item),
            };
        }

        let cap = self.cap_for(item_type);
        if let Some(rep) = self.slots[i] {
            let room = cap.saturating_sub(self.slot_counts[i]);
            items.merge_up_to(rep, item, room);
            self.slot_counts[i] = items.get(rep).map(|r| r.stack_count).unwrap_or(0);
            return if items.contains(item) {
                Placed::Overflow(item)
            } else {
                Placed::Stored(rep)
            };
        }

        if self.slot_counts[i] > 0 {
            return Placed::Overflow(item);
        }
        let mut rest = None;
        if count > cap {
            match items.split_stack(item, count - cap) {
                Some(piece) => rest = Some(piece),
                None => return Placed::Overflow(item),
            }
        }
        let count = count.min(cap);
        let center = self.slot_cell(i).center();
        if let Some(it) = items.get_mut(item) {
            it.state = ItemState::InStockpile;
            it.pos = center;
            it.reserved_by = None;
            it.contained_in = None;
        }
        crate::items::sync_contents_position(items, item);
        self.slots[i] = Some(item);
        self.slot_counts[i] = count;
        self.slot_types[i] = Some(item_type);
        self.slot_materials[i] = material;
        self.slot_is_container[i] = is_container;
        match rest {
            Some(piece) => Placed::Overflow(piece),
            None => Placed::Stored(item),
        }
    }

    /// Take a stored record out of its slot (for pickup). The item itself is
    /// left for the caller to re-state.
    pub fn take_from_slot(&mut self, item: ItemId, items: &ItemPool) -> bool {
        let Some(i) = self.slots.iter().position(|s| *s == Some(item)) else {
            return false;
        };
        self.slots[i] = None;
        self.slot_counts[i] = 0;
        self.slot_is_container[i] = false;
        self.reset_slot_type_if_idle(i);
        self.recompute_free_slots(items);
        true
    }

    /// Re-read a slot's count from its representative item, e.g. after a
    /// split took part of the stack away.
    pub fn refresh_slot(&mut self, item: ItemId, items: &ItemPool) {
        if let Some(i) = self.slots.iter().position(|s| *s == Some(item)) {
            match items.get(item) {
                Some(it) => self.slot_counts[i] = if self.slot_is_container[i] { 1 } else { it.stack_count },
                None => {
                    self.slots[i] = None;
                    self.slot_counts[i] = 0;
                    self.slot_is_container[i] = false;
                    self.reset_slot_type_if_idle(i);
                }
            }
            self.recompute_free_slots(items);
        }
    }

    /// Slot index holding `item` as its representative record.
    pub fn slot_of_item(&self, item: ItemId) -> Option<usize> {
        self.slots.iter().position(|s| *s == Some(item))
    }

    /// Revert the stored record of slot `i` to a ground item and clear it.
    fn spill_slot(&mut self, i: usize, items: &mut ItemPool) {
        if let Some(id) = self.slots[i].take() {
            if let Some(it) = items.get_mut(id) {
                if it.state == ItemState::InStockpile {
                    it.state = ItemState::OnGround;
                }
            }
        }
        self.slot_counts[i] = 0;
        self.slot_is_container[i] = false;
        self.reset_slot_type_if_idle(i);
    }
}

/// Every stockpile, keyed by generational id.
#[derive(Debug, Clone, Default)]
pub struct StockpileTable {
    pub(crate) piles: SlotMap<StockpileId, Stockpile>,
}

impl StockpileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.piles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.piles.is_empty()
    }

    pub fn get(&self, id: StockpileId) -> Option<&Stockpile> {
        self.piles.get(id)
    }

    pub fn get_mut(&mut self, id: StockpileId) -> Option<&mut Stockpile> {
        self.piles.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StockpileId, &Stockpile)> {
        self.piles.iter()
    }

    pub fn ids(&self) -> Vec<StockpileId> {
        self.piles.keys().collect()
    }

    /// Create a rectangular stockpile. Tiles already owned by another
    /// stockpile start inactive.
    pub fn create(&mut self, x: i32, y: i32, z: i32, width: i32, height: i32) -> Option<StockpileId> {
        if self.piles.len() >= MAX_STOCKPILES {
            log::warn!("stockpile table full ({}), refusing new stockpile", MAX_STOCKPILES);
            return None;
        }
        let mut sp = Stockpile::new(x, y, z, width, height);
        for i in 0..sp.slot_count() {
            if self.owner_of(sp.slot_cell(i)).is_some() {
                sp.active_cells[i] = false;
            }
        }
        sp.free_slot_count = sp.active_cell_count();
        if sp.free_slot_count == 0 {
            return None;
        }
        let id = self.piles.insert(sp);
        log::info!("stockpile created at ({}, {}, {}) {}x{}", x, y, z, width, height);
        Some(id)
    }

    /// Stockpile whose active tile covers `p`.
    pub fn owner_of(&self, p: CellPos) -> Option<StockpileId> {
        self.piles.iter().find(|(_, sp)| sp.contains_cell(p)).map(|(id, _)| id)
    }

    /// Delete a stockpile. Stored items become ground items again.
    pub fn delete(&mut self, id: StockpileId, items: &mut ItemPool) -> bool {
        let Some(mut sp) = self.piles.remove(id) else {
            return false;
        };
        for i in 0..sp.slot_count() {
            sp.spill_slot(i, items);
        }
        log::info!("stockpile deleted at ({}, {}, {})", sp.x, sp.y, sp.z);
        true
    }

    /// Toggle one tile. Turning off a tile spills its contents; a stockpile
    /// with no active tiles left deletes itself. Returns false when the tile
    /// cannot be toggled.
    pub fn set_cell_active(&mut self, id: StockpileId, p: CellPos, active: bool, items: &mut ItemPool) -> bool {
        if active && self.owner_of(p).is_some_and(|o| o != id) {
            return false;
        }
        let Some(sp) = self.piles.get_mut(id) else {
            return false;
        };
        let Some(i) = sp.slot_index(p) else {
            return false;
        };
        if !active {
            sp.spill_slot(i, items);
        }
        sp.active_cells[i] = active;
        sp.recompute_free_slots(items);
        if sp.active_cell_count() == 0 {
            self.delete(id, items);
        }
        true
    }

    /// Spill whatever is stored on tile `p` back onto the ground, leaving
    /// the tile active.
    pub fn spill_at(&mut self, p: CellPos, items: &mut ItemPool) {
        for (_, sp) in self.piles.iter_mut() {
            if let Some(i) = sp.slot_index(p) {
                if sp.slots[i].is_some() {
                    sp.spill_slot(i, items);
                    sp.recompute_free_slots(items);
                }
            }
        }
    }

    /// Rebuild every ground-item cache from the item spatial index and
    /// recompute free counts.
    pub fn rebuild_ground_cache(&mut self, items: &ItemPool) {
        for (_, sp) in self.piles.iter_mut() {
            for i in 0..sp.slot_count() {
                sp.ground_item[i] = if sp.active_cells[i] {
                    items.query_item_at_tile(sp.slot_cell(i)).first().copied()
                } else {
                    None
                };
            }
            sp.recompute_free_slots(items);
        }
    }

    /// Ensure derived vectors have their full length after a load.
    pub(crate) fn restore_derived(&mut self, items: &ItemPool) {
        for (_, sp) in self.piles.iter_mut() {
            sp.ground_item = vec![None; sp.slot_count()];
        }
        self.rebuild_ground_cache(items);
    }

    /// Best stockpile slot for an item, preferring higher priority, then
    /// distance. Stockpiles at or below `min_priority` are skipped.
    pub fn find_slot_for(
        &self,
        grid: &Grid,
        items: &ItemPool,
        item_type: ItemType,
        material: MaterialType,
        from: CellPos,
        min_priority: Option<u8>,
    ) -> Option<(StockpileId, CellPos)> {
        let mut best: Option<(u8, i64, StockpileId, CellPos)> = None;
        for (id, sp) in self.piles.iter() {
            if min_priority.is_some_and(|m| sp.priority <= m) {
                continue;
            }
            let Some(cell) = sp.find_free_slot(grid, items, item_type, material) else {
                continue;
            };
            let d = cell.dist_sq_weighted(&from);
            let better = match best {
                None => true,
                Some((bp, bd, _, _)) => sp.priority > bp || (sp.priority == bp && d < bd),
            };
            if better {
                best = Some((sp.priority, d, id, cell));
            }
        }
        best.map(|(_, _, id, cell)| (id, cell))
    }
}
