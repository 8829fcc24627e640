//! Voxel grid storage.
//!
//! One flat array per field, indexed z-major, then y, then x. Cell kind,
//! floor bit, wetness, burned, trampled, workshop-block and explored are
//! independent: writing one never disturbs the others.

use std::collections::BTreeSet;

use colonysim_logic::constants::limits::{DEFAULT_CHUNK_H, DEFAULT_CHUNK_W, MAX_GRID_D, MAX_GRID_H, MAX_GRID_W};
use colonysim_logic::items::MaterialType;
use serde::{Deserialize, Serialize};

use crate::common::{CellPos, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CellKind {
    #[default]
    Air = 0,
    Wall,
    LadderUp,
    LadderDown,
    LadderBoth,
    RampN,
    RampE,
    RampS,
    RampW,
    Sapling,
    TreeTrunk,
    TreeBranch,
    TreeRoot,
    TreeFelled,
    TreeLeaves,
    Bush,
    Track,
    Door,
}

impl CellKind {
    pub fn is_ladder(self) -> bool {
        matches!(self, CellKind::LadderUp | CellKind::LadderDown | CellKind::LadderBoth)
    }

    pub fn ladder_goes_up(self) -> bool {
        matches!(self, CellKind::LadderUp | CellKind::LadderBoth)
    }

    pub fn ladder_goes_down(self) -> bool {
        matches!(self, CellKind::LadderDown | CellKind::LadderBoth)
    }

    pub fn is_ramp(self) -> bool {
        self.ramp_dir().is_some()
    }

    /// Direction of the high side for ramp kinds.
    pub fn ramp_dir(self) -> Option<Direction> {
        match self {
            CellKind::RampN => Some(Direction::North),
            CellKind::RampE => Some(Direction::East),
            CellKind::RampS => Some(Direction::South),
            CellKind::RampW => Some(Direction::West),
            _ => None,
        }
    }

    pub fn ramp(dir: Direction) -> CellKind {
        match dir {
            Direction::North => CellKind::RampN,
            Direction::East => CellKind::RampE,
            Direction::South => CellKind::RampS,
            Direction::West => CellKind::RampW,
        }
    }

    /// Solid cells support whatever stands above them.
    pub fn is_solid(self) -> bool {
        matches!(self, CellKind::Wall | CellKind::TreeTrunk | CellKind::TreeRoot)
    }

    pub fn is_tree(self) -> bool {
        matches!(
            self,
            CellKind::Sapling
                | CellKind::TreeTrunk
                | CellKind::TreeBranch
                | CellKind::TreeRoot
                | CellKind::TreeFelled
                | CellKind::TreeLeaves
        )
    }

    pub fn is_flammable(self) -> bool {
        self.is_tree() || matches!(self, CellKind::Bush | CellKind::Door)
    }

    /// Terrain part of the move cost (always even).
    pub fn terrain_penalty(self) -> u32 {
        match self {
            CellKind::Bush | CellKind::TreeFelled => 4,
            CellKind::Door => 2,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Vegetation {
    #[default]
    None = 0,
    Short,
    Normal,
    Tall,
    Taller,
}

impl Vegetation {
    pub fn grow(self) -> Vegetation {
        match self {
            Vegetation::None => Vegetation::Short,
            Vegetation::Short => Vegetation::Normal,
            Vegetation::Normal => Vegetation::Tall,
            Vegetation::Tall | Vegetation::Taller => Vegetation::Taller,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Designation {
    #[default]
    None = 0,
    Mine,
    Channel,
    DigRamp,
    Chop,
    Harvest,
    Plant,
    Deconstruct,
}

/// Per-cell flag bits.
pub mod cell_flags {
    pub const HAS_FLOOR: u8 = 1 << 0;
    pub const BURNED: u8 = 1 << 1;
    pub const WORKSHOP_BLOCK: u8 = 1 << 2;
    pub const WETNESS_SHIFT: u8 = 3;
    pub const WETNESS_MASK: u8 = 0b11 << WETNESS_SHIFT;
    pub const TRAMPLED: u8 = 1 << 5;
    pub const EXPLORED: u8 = 1 << 6;
    /// A job currently owns this cell's designation.
    pub const DESIGNATION_CLAIMED: u8 = 1 << 7;
}

/// Marker in `fixture_cost` for cells blocked by furniture.
pub const FIXTURE_BLOCKED: u8 = u8::MAX;

/// Default ambient temperature for a fresh grid (°C).
pub const DEFAULT_TEMP: i16 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub z: i32,
    pub cy: i32,
    pub cx: i32,
}

#[derive(Debug, Clone)]
pub struct Grid {
    pub width: i32,
    pub height: i32,
    pub depth: i32,
    pub chunk_w: i32,
    pub chunk_h: i32,

    pub(crate) kinds: Vec<CellKind>,
    pub(crate) materials: Vec<MaterialType>,
    pub(crate) flags: Vec<u8>,
    pub(crate) vegetation: Vec<Vegetation>,
    pub(crate) water: Vec<u8>,
    pub(crate) fire: Vec<u8>,
    pub(crate) smoke: Vec<u8>,
    pub(crate) temp: Vec<i16>,
    pub(crate) designation: Vec<Designation>,
    /// Growth counter for grass, saplings and bushes.
    pub(crate) growth: Vec<u8>,

    // Derived, never persisted
    pub(crate) fixture_cost: Vec<u8>,
    designated: BTreeSet<CellPos>,
    dirty_chunks: BTreeSet<ChunkKey>,
    changed_cells: Vec<CellPos>,
}

impl Grid {
    pub fn new(width: i32, height: i32, depth: i32) -> Self {
        Self::with_chunks(width, height, depth, DEFAULT_CHUNK_W, DEFAULT_CHUNK_H)
    }

    pub fn with_chunks(width: i32, height: i32, depth: i32, chunk_w: i32, chunk_h: i32) -> Self {
        debug_assert!(width > 0 && width <= MAX_GRID_W, "grid width {}", width);
        debug_assert!(height > 0 && height <= MAX_GRID_H, "grid height {}", height);
        debug_assert!(depth > 0 && depth <= MAX_GRID_D, "grid depth {}", depth);
        let width = width.clamp(1, MAX_GRID_W);
        let height = height.clamp(1, MAX_GRID_H);
        let depth = depth.clamp(1, MAX_GRID_D);
        let n = (width * height * depth) as usize;
        Self {
            width,
            height,
            depth,
            chunk_w: chunk_w.max(1),
            chunk_h: chunk_h.max(1),
            kinds: vec![CellKind::Air; n],
            materials: vec![MaterialType::None; n],
            flags: vec![0; n],
            vegetation: vec![Vegetation::None; n],
            water: vec![0; n],
            fire: vec![0; n],
            smoke: vec![0; n],
            temp: vec![DEFAULT_TEMP; n],
            designation: vec![Designation::None; n],
            growth: vec![0; n],
            fixture_cost: vec![0; n],
            designated: BTreeSet::new(),
            dirty_chunks: BTreeSet::new(),
            changed_cells: Vec::new(),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.kinds.len()
    }

    pub fn in_bounds(&self, p: CellPos) -> bool {
        p.x >= 0 && p.y >= 0 && p.z >= 0 && p.x < self.width && p.y < self.height && p.z < self.depth
    }

    pub fn idx(&self, p: CellPos) -> Option<usize> {
        if self.in_bounds(p) {
            Some(((p.z * self.height + p.y) * self.width + p.x) as usize)
        } else {
            None
        }
    }

    pub fn pos_of(&self, idx: usize) -> CellPos {
        let i = idx as i32;
        let x = i % self.width;
        let y = (i / self.width) % self.height;
        let z = i / (self.width * self.height);
        CellPos::new(x, y, z)
    }

    // ── Kind ──

    /// Out-of-bounds cells read as walls.
    pub fn kind(&self, p: CellPos) -> CellKind {
        self.idx(p).map(|i| self.kinds[i]).unwrap_or(CellKind::Wall)
    }

    /// Raw kind write. Clears the floor bit when the new kind is not air
    /// and marks the chunk dirty. Edits that must also move entities go
    /// through `world::edit`.
    pub fn set_kind(&mut self, p: CellPos, kind: CellKind) {
        let Some(i) = self.idx(p) else {
            debug_assert!(false, "set_kind out of bounds {}", p);
            return;
        };
        if self.kinds[i] == kind {
            return;
        }
        self.kinds[i] = kind;
        if kind != CellKind::Air {
            self.flags[i] &= !cell_flags::HAS_FLOOR;
        }
        self.mark_dirty(p);
    }

    pub fn set_kind_with_material(&mut self, p: CellPos, kind: CellKind, material: MaterialType) {
        self.set_kind(p, kind);
        self.set_material(p, material);
    }

    /// Fill a whole z-level with one kind and material.
    pub fn fill_level(&mut self, z: i32, kind: CellKind, material: MaterialType) {
        for y in 0..self.height {
            for x in 0..self.width {
                self.set_kind_with_material(CellPos::new(x, y, z), kind, material);
            }
        }
    }

    pub fn material(&self, p: CellPos) -> MaterialType {
        self.idx(p).map(|i| self.materials[i]).unwrap_or_default()
    }

    pub fn set_material(&mut self, p: CellPos, material: MaterialType) {
        if let Some(i) = self.idx(p) {
            self.materials[i] = material;
        }
    }

    // ── Flags ──

    fn flag(&self, p: CellPos, bit: u8) -> bool {
        self.idx(p).map(|i| self.flags[i] & bit != 0).unwrap_or(false)
    }

    fn set_flag(&mut self, p: CellPos, bit: u8, on: bool) {
        if let Some(i) = self.idx(p) {
            if on {
                self.flags[i] |= bit;
            } else {
                self.flags[i] &= !bit;
            }
        }
    }

    pub fn raw_flags(&self, p: CellPos) -> u8 {
        self.idx(p).map(|i| self.flags[i]).unwrap_or(0)
    }

    pub fn has_floor(&self, p: CellPos) -> bool {
        self.flag(p, cell_flags::HAS_FLOOR)
    }

    /// Floors only exist on air cells; the request is refused otherwise.
    pub fn set_floor(&mut self, p: CellPos, on: bool) -> bool {
        if on && self.kind(p) != CellKind::Air {
            return false;
        }
        if self.has_floor(p) != on {
            self.set_flag(p, cell_flags::HAS_FLOOR, on);
            self.mark_dirty(p);
        }
        true
    }

    pub fn is_burned(&self, p: CellPos) -> bool {
        self.flag(p, cell_flags::BURNED)
    }

    pub fn set_burned(&mut self, p: CellPos, on: bool) {
        self.set_flag(p, cell_flags::BURNED, on);
    }

    pub fn is_workshop_block(&self, p: CellPos) -> bool {
        self.flag(p, cell_flags::WORKSHOP_BLOCK)
    }

    pub fn set_workshop_block(&mut self, p: CellPos, on: bool) {
        self.set_flag(p, cell_flags::WORKSHOP_BLOCK, on);
    }

    pub fn is_trampled(&self, p: CellPos) -> bool {
        self.flag(p, cell_flags::TRAMPLED)
    }

    pub fn set_trampled(&mut self, p: CellPos, on: bool) {
        self.set_flag(p, cell_flags::TRAMPLED, on);
    }

    pub fn is_explored(&self, p: CellPos) -> bool {
        self.flag(p, cell_flags::EXPLORED)
    }

    pub fn set_explored(&mut self, p: CellPos, on: bool) {
        self.set_flag(p, cell_flags::EXPLORED, on);
    }

    pub fn wetness(&self, p: CellPos) -> u8 {
        self.idx(p)
            .map(|i| (self.flags[i] & cell_flags::WETNESS_MASK) >> cell_flags::WETNESS_SHIFT)
            .unwrap_or(0)
    }

    pub fn set_wetness(&mut self, p: CellPos, wetness: u8) {
        if let Some(i) = self.idx(p) {
            let w = wetness.min(3) << cell_flags::WETNESS_SHIFT;
            self.flags[i] = (self.flags[i] & !cell_flags::WETNESS_MASK) | w;
        }
    }

    pub fn designation_claimed(&self, p: CellPos) -> bool {
        self.flag(p, cell_flags::DESIGNATION_CLAIMED)
    }

    pub(crate) fn set_designation_claimed(&mut self, p: CellPos, on: bool) {
        self.set_flag(p, cell_flags::DESIGNATION_CLAIMED, on);
    }

    // ── Co-located fields ──

    pub fn vegetation(&self, p: CellPos) -> Vegetation {
        self.idx(p).map(|i| self.vegetation[i]).unwrap_or_default()
    }

    pub fn set_vegetation(&mut self, p: CellPos, v: Vegetation) {
        if let Some(i) = self.idx(p) {
            self.vegetation[i] = v;
        }
    }

    pub fn water(&self, p: CellPos) -> u8 {
        self.idx(p).map(|i| self.water[i]).unwrap_or(0)
    }

    pub fn set_water(&mut self, p: CellPos, level: u8) {
        if let Some(i) = self.idx(p) {
            self.water[i] = level;
        }
    }

    pub fn fire(&self, p: CellPos) -> u8 {
        self.idx(p).map(|i| self.fire[i]).unwrap_or(0)
    }

    pub fn set_fire(&mut self, p: CellPos, level: u8) {
        if let Some(i) = self.idx(p) {
            self.fire[i] = level;
        }
    }

    pub fn smoke(&self, p: CellPos) -> u8 {
        self.idx(p).map(|i| self.smoke[i]).unwrap_or(0)
    }

    pub fn set_smoke(&mut self, p: CellPos, level: u8) {
        if let Some(i) = self.idx(p) {
            self.smoke[i] = level;
        }
    }

    pub fn temperature(&self, p: CellPos) -> i16 {
        self.idx(p).map(|i| self.temp[i]).unwrap_or(DEFAULT_TEMP)
    }

    pub fn set_temperature(&mut self, p: CellPos, t: i16) {
        if let Some(i) = self.idx(p) {
            self.temp[i] = t;
        }
    }

    pub fn designation(&self, p: CellPos) -> Designation {
        self.idx(p).map(|i| self.designation[i]).unwrap_or_default()
    }

    pub(crate) fn set_designation_raw(&mut self, p: CellPos, d: Designation) {
        if let Some(i) = self.idx(p) {
            self.designation[i] = d;
            if d == Designation::None {
                self.flags[i] &= !cell_flags::DESIGNATION_CLAIMED;
                self.designated.remove(&p);
            } else {
                self.designated.insert(p);
            }
        }
    }

    /// Designated cells in z, y, x order.
    pub fn designated_cells(&self) -> impl Iterator<Item = (CellPos, Designation)> + '_ {
        self.designated.iter().map(move |p| (*p, self.designation(*p)))
    }

    /// Re-derive the designated-cell index from the designation array.
    pub(crate) fn rebuild_designated(&mut self) {
        self.designated = (0..self.designation.len())
            .filter(|i| self.designation[*i] != Designation::None)
            .map(|i| self.pos_of(i))
            .collect();
    }

    pub fn growth(&self, p: CellPos) -> u8 {
        self.idx(p).map(|i| self.growth[i]).unwrap_or(0)
    }

    pub fn set_growth(&mut self, p: CellPos, g: u8) {
        if let Some(i) = self.idx(p) {
            self.growth[i] = g;
        }
    }

    pub fn fixture_cost(&self, p: CellPos) -> u8 {
        self.idx(p).map(|i| self.fixture_cost[i]).unwrap_or(0)
    }

    /// Record the furniture cost of a cell. Blocking changes walkability and
    /// marks the chunk dirty.
    pub fn set_fixture_cost(&mut self, p: CellPos, cost: u8) {
        let Some(i) = self.idx(p) else {
            return;
        };
        let was_blocked = self.fixture_cost[i] == FIXTURE_BLOCKED;
        self.fixture_cost[i] = cost;
        if was_blocked != (cost == FIXTURE_BLOCKED) {
            self.mark_dirty(p);
        }
    }

    // ── Walkability ──

    pub fn is_solid(&self, p: CellPos) -> bool {
        self.kind(p).is_solid()
    }

    /// Walkable iff air standing on ground (z=0, floor or solid below),
    /// or a ladder, ramp, door, bush or felled tree.
    pub fn is_walkable(&self, p: CellPos) -> bool {
        let Some(i) = self.idx(p) else {
            return false;
        };
        if self.fixture_cost[i] == FIXTURE_BLOCKED {
            return false;
        }
        match self.kinds[i] {
            CellKind::Air => {
                p.z == 0 || self.flags[i] & cell_flags::HAS_FLOOR != 0 || self.is_solid(p.offset(0, 0, -1))
            }
            k if k.is_ladder() || k.is_ramp() => true,
            CellKind::Door | CellKind::Bush | CellKind::TreeFelled => true,
            _ => false,
        }
    }

    /// Extra path cost for stepping through `p` (always even).
    pub fn move_penalty(&self, p: CellPos) -> u32 {
        let Some(i) = self.idx(p) else {
            return 0;
        };
        let mut cost = self.kinds[i].terrain_penalty();
        cost += 2 * ((self.flags[i] & cell_flags::WETNESS_MASK) >> cell_flags::WETNESS_SHIFT) as u32;
        if self.flags[i] & cell_flags::WORKSHOP_BLOCK != 0 {
            cost += 4;
        }
        let f = self.fixture_cost[i];
        if f != FIXTURE_BLOCKED {
            cost += (f as u32) & !1;
        }
        if self.water[i] >= 4 {
            cost += 6;
        }
        cost
    }

    /// Open sky above: no solid cell or floor anywhere above `p`.
    pub fn is_exposed(&self, p: CellPos) -> bool {
        let mut z = p.z + 1;
        while z < self.depth {
            let q = CellPos::new(p.x, p.y, z);
            if self.is_solid(q) || self.has_floor(q) {
                return false;
            }
            z += 1;
        }
        true
    }

    // ── Ladders ──

    /// Re-derive ladder kinds in one column: a ladder cell with ladders both
    /// above and below is `LadderBoth`, only above `LadderUp`, only below
    /// `LadderDown`. A lone ladder cell is `LadderUp`.
    pub fn recalculate_ladder_column(&mut self, x: i32, y: i32) {
        for z in 0..self.depth {
            let p = CellPos::new(x, y, z);
            if !self.kind(p).is_ladder() {
                continue;
            }
            let above = z + 1 < self.depth && self.kind(p.offset(0, 0, 1)).is_ladder();
            let below = z > 0 && self.kind(p.offset(0, 0, -1)).is_ladder();
            let derived = match (above, below) {
                (true, true) => CellKind::LadderBoth,
                (false, true) => CellKind::LadderDown,
                _ => CellKind::LadderUp,
            };
            self.set_kind(p, derived);
        }
    }

    // ── Chunks and dirtiness ──

    pub fn chunks_x(&self) -> i32 {
        (self.width + self.chunk_w - 1) / self.chunk_w
    }

    pub fn chunks_y(&self) -> i32 {
        (self.height + self.chunk_h - 1) / self.chunk_h
    }

    pub fn chunk_of(&self, p: CellPos) -> ChunkKey {
        ChunkKey {
            z: p.z,
            cy: p.y / self.chunk_h,
            cx: p.x / self.chunk_w,
        }
    }

    /// Mark `p`'s chunk (and the chunks directly above and below, whose
    /// support or vertical links may depend on it) for graph rebuild, and
    /// record the cell for path invalidation.
    pub fn mark_dirty(&mut self, p: CellPos) {
        for dz in -1..=1 {
            let q = p.offset(0, 0, dz);
            if q.z >= 0 && q.z < self.depth {
                let key = self.chunk_of(q);
                self.dirty_chunks.insert(key);
            }
        }
        self.changed_cells.push(p);
    }

    pub fn mark_all_dirty(&mut self) {
        for z in 0..self.depth {
            for cy in 0..self.chunks_y() {
                for cx in 0..self.chunks_x() {
                    self.dirty_chunks.insert(ChunkKey { z, cy, cx });
                }
            }
        }
    }

    pub fn has_dirty_chunks(&self) -> bool {
        !self.dirty_chunks.is_empty()
    }

    pub fn take_dirty_chunks(&mut self) -> BTreeSet<ChunkKey> {
        std::mem::take(&mut self.dirty_chunks)
    }

    pub fn take_changed_cells(&mut self) -> Vec<CellPos> {
        std::mem::take(&mut self.changed_cells)
    }
}
