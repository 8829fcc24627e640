//! Movers - the colony's agents.
//!
//! A mover's path is stored reversed: `path[0]` is the goal and
//! `path[path_index]` is the next waypoint; `path_index` counts down and
//! the path is complete once it drops below zero.

mod motion;
mod spatial;
mod steering;

pub use motion::*;
pub use spatial::MoverGrid;
pub use steering::*;

use colonysim_logic::constants::limits::{MAX_MOVERS, MAX_MOVER_PATH};
use colonysim_logic::constants::mover::{MOVER_SPEED, NORMAL_BODY_TEMP};
use colonysim_logic::names::{generate_name, Gender, Name};
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::common::{CellPos, Vec3};
use crate::engine::Sim;
use crate::items::{ItemId, ItemState};
use crate::jobs::{cancel_job, JobId};

new_key_type! {
    /// Generational handle for a mover.
    pub struct MoverId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_haul: bool,
    pub can_mine: bool,
    pub can_build: bool,
    pub can_hunt: bool,
    pub can_plant: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_haul: true,
            can_mine: true,
            can_build: true,
            can_hunt: true,
            can_plant: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FreetimeState {
    #[default]
    None,
    SeekingFood,
    Eating,
    SeekingDrink,
    Drinking,
    SeekingRest,
    Resting,
}

/// Need levels. Hunger, thirst and energy run 1 (full) to 0 (empty); body
/// temperature is in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoverNeeds {
    pub hunger: f32,
    pub thirst: f32,
    pub energy: f32,
    pub body_temp: f32,
    /// Game-seconds spent with hunger or thirst at zero.
    pub deprivation_time: f32,
}

impl Default for MoverNeeds {
    fn default() -> Self {
        Self {
            hunger: 1.0,
            thirst: 1.0,
            energy: 1.0,
            body_temp: NORMAL_BODY_TEMP,
            deprivation_time: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mover {
    pub pos: Vec3,
    pub goal: CellPos,
    pub path: Vec<CellPos>,
    pub path_index: i32,
    pub needs_repath: bool,
    /// Set by the repath service when no path to `goal` exists.
    pub path_failed: bool,
    pub repath_cooldown: u32,

    pub capabilities: Capabilities,
    pub current_job: Option<JobId>,
    pub speed: f32,

    pub freetime: FreetimeState,
    /// Seconds spent in the current freetime seek.
    pub freetime_timer: f32,
    pub freetime_cooldown: f32,
    pub needs: MoverNeeds,

    pub equipped_tool: Option<ItemId>,
    pub equipped_clothing: Option<ItemId>,

    pub name: Name,
    pub gender: Gender,

    // Stuck detection
    pub last_check_pos: Vec3,
    pub stuck_check_timer: f32,
    pub time_without_progress: f32,
    /// Seconds the current waypoint has been the target.
    pub waypoint_timer: f32,
    /// Avoidance vector reused on frames skipped by staggering.
    pub avoid_cache: (f32, f32),
    #[serde(skip)]
    pub(crate) repath_queued: bool,
}

impl Mover {
    pub fn new(cell: CellPos, name: Name, gender: Gender) -> Self {
        let pos = cell.center();
        Self {
            pos,
            goal: cell,
            path: Vec::new(),
            path_index: -1,
            needs_repath: false,
            path_failed: false,
            repath_cooldown: 0,
            capabilities: Capabilities::default(),
            current_job: None,
            speed: MOVER_SPEED,
            freetime: FreetimeState::None,
            freetime_timer: 0.0,
            freetime_cooldown: 0.0,
            needs: MoverNeeds::default(),
            equipped_tool: None,
            equipped_clothing: None,
            name,
            gender,
            last_check_pos: pos,
            stuck_check_timer: 0.0,
            time_without_progress: 0.0,
            waypoint_timer: 0.0,
            avoid_cache: (0.0, 0.0),
            repath_queued: false,
        }
    }

    pub fn cell(&self) -> CellPos {
        self.pos.cell()
    }

    pub fn is_idle(&self) -> bool {
        self.current_job.is_none()
    }

    pub fn has_path(&self) -> bool {
        self.path_index >= 0 && (self.path_index as usize) < self.path.len()
    }

    /// Current waypoint.
    pub fn waypoint(&self) -> Option<CellPos> {
        if self.has_path() {
            Some(self.path[self.path_index as usize])
        } else {
            None
        }
    }

    /// Install a reversed path. Paths longer than the mover can store keep
    /// their start end; the goal end is dropped and picked up by a later
    /// repath.
    pub fn set_path(&mut self, goal: CellPos, mut path: Vec<CellPos>) {
        truncate_path(&mut path);
        self.goal = goal;
        self.path_index = path.len() as i32 - 1;
        self.path = path;
        self.needs_repath = false;
        self.path_failed = false;
        self.waypoint_timer = 0.0;
        self.time_without_progress = 0.0;
    }

    pub fn clear_path(&mut self) {
        self.path.clear();
        self.path_index = -1;
    }

    /// Remaining waypoints, next first.
    pub fn remaining_path(&self) -> impl Iterator<Item = &CellPos> {
        let end = if self.has_path() { self.path_index as usize + 1 } else { 0 };
        self.path[..end].iter().rev()
    }
}

/// Keep the start end of a reversed path.
pub fn truncate_path(path: &mut Vec<CellPos>) {
    if path.len() > MAX_MOVER_PATH {
        let excess = path.len() - MAX_MOVER_PATH;
        path.drain(..excess);
    }
}

/// Every mover, plus the insertion order the tick processes them in.
#[derive(Debug, Clone, Default)]
pub struct MoverPool {
    pub(crate) movers: SlotMap<MoverId, Mover>,
    pub(crate) order: Vec<MoverId>,
}

impl MoverPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.movers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movers.is_empty()
    }

    pub fn get(&self, id: MoverId) -> Option<&Mover> {
        self.movers.get(id)
    }

    pub fn get_mut(&mut self, id: MoverId) -> Option<&mut Mover> {
        self.movers.get_mut(id)
    }

    pub fn contains(&self, id: MoverId) -> bool {
        self.movers.contains_key(id)
    }

    /// Movers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (MoverId, &Mover)> {
        self.order.iter().filter_map(move |id| self.movers.get(*id).map(|m| (*id, m)))
    }

    pub fn ids(&self) -> Vec<MoverId> {
        self.order.clone()
    }

    pub fn insert(&mut self, mover: Mover) -> Option<MoverId> {
        if self.movers.len() >= MAX_MOVERS {
            log::warn!("mover pool exhausted ({}), dropping spawn", MAX_MOVERS);
            return None;
        }
        let id = self.movers.insert(mover);
        self.order.push(id);
        Some(id)
    }

    pub(crate) fn remove_raw(&mut self, id: MoverId) -> Option<Mover> {
        let m = self.movers.remove(id)?;
        self.order.retain(|o| *o != id);
        Some(m)
    }
}

/// Spawn a mover with a generated name at `cell`.
pub fn spawn_mover(sim: &mut Sim, cell: CellPos) -> Option<MoverId> {
    let (name, gender) = generate_name(&mut sim.rng);
    let id = sim.movers.insert(Mover::new(cell, name, gender))?;
    log::debug!("mover spawned at {}", cell);
    Some(id)
}

/// Remove a mover, releasing its job, equipment and fixture claims.
pub fn remove_mover(sim: &mut Sim, id: MoverId) {
    if !sim.movers.contains(id) {
        return;
    }
    cancel_job(sim, id);
    let Some(m) = sim.movers.remove_raw(id) else {
        return;
    };
    let at = crate::world::find_safe_drop_cell(&sim.grid, m.cell());
    for item in [m.equipped_tool, m.equipped_clothing].into_iter().flatten() {
        if let Some(it) = sim.items.get_mut(item) {
            it.state = ItemState::OnGround;
            it.reserved_by = None;
            it.pos = at.center();
        }
    }
    sim.fixtures.release_mover(id);
    // Claims a vanished mover could still hold.
    for (_, it) in sim.items.items.iter_mut() {
        if it.reserved_by == Some(id) {
            it.reserved_by = None;
            if it.state == ItemState::Carried {
                it.state = ItemState::OnGround;
                it.pos = at.center();
            }
        }
    }
    log::info!("mover {} removed", m.name.full());
}

/// Outcome of a movement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStatus {
    Arrived,
    Moving,
    Failed,
}

/// Ask the mover to walk to `target`. Call every tick until it reports
/// `Arrived` or `Failed`.
pub fn move_to(sim: &mut Sim, id: MoverId, target: CellPos) -> MoveStatus {
    let Some(m) = sim.movers.get_mut(id) else {
        return MoveStatus::Failed;
    };
    if m.goal == target {
        if m.path_failed {
            m.path_failed = false;
            return MoveStatus::Failed;
        }
        if m.cell() == target && !m.has_path() {
            return MoveStatus::Arrived;
        }
        if !m.has_path() && !m.needs_repath {
            m.needs_repath = true;
        }
        return MoveStatus::Moving;
    }
    m.goal = target;
    m.clear_path();
    m.path_failed = false;
    if m.cell() == target {
        return MoveStatus::Arrived;
    }
    m.needs_repath = true;
    MoveStatus::Moving
}

/// Flag movers whose remaining path crosses any changed cell.
pub fn invalidate_paths_through(sim: &mut Sim, changed: &[CellPos]) {
    if changed.is_empty() {
        return;
    }
    let mut set: Vec<CellPos> = changed.to_vec();
    set.sort();
    set.dedup();
    for id in sim.movers.order.clone() {
        let Some(m) = sim.movers.get_mut(id) else {
            continue;
        };
        if !m.has_path() {
            continue;
        }
        let hit = m.remaining_path().any(|c| set.binary_search(c).is_ok());
        if hit {
            m.needs_repath = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colonysim_logic::names::Gender;

    fn mover_at(x: i32, y: i32) -> Mover {
        Mover::new(CellPos::new(x, y, 0), Name::new("Ada", "Stone"), Gender::Female)
    }

    #[test]
    fn test_truncation_keeps_start() {
        let start = CellPos::new(0, 0, 0);
        let mut path: Vec<CellPos> = (0..(MAX_MOVER_PATH as i32 + 50)).rev().map(|x| CellPos::new(x, 0, 0)).collect();
        assert_eq!(*path.last().unwrap(), start);
        let goal = path[0];
        let mut m = mover_at(0, 0);
        m.set_path(goal, std::mem::take(&mut path));
        assert_eq!(m.path.len(), MAX_MOVER_PATH);
        assert_eq!(m.path[m.path_index as usize], start);
        assert_ne!(m.path[0], goal);
    }

    #[test]
    fn test_remaining_path_order() {
        let mut m = mover_at(0, 0);
        let path = vec![CellPos::new(2, 0, 0), CellPos::new(1, 0, 0), CellPos::new(0, 0, 0)];
        m.set_path(CellPos::new(2, 0, 0), path);
        let rest: Vec<_> = m.remaining_path().copied().collect();
        assert_eq!(rest[0], CellPos::new(0, 0, 0));
        assert_eq!(rest[2], CellPos::new(2, 0, 0));
    }

    #[test]
    fn test_pool_keeps_insertion_order() {
        let mut pool = MoverPool::new();
        let a = pool.insert(mover_at(0, 0)).unwrap();
        let b = pool.insert(mover_at(1, 0)).unwrap();
        let c = pool.insert(mover_at(2, 0)).unwrap();
        pool.remove_raw(b);
        let ids: Vec<_> = pool.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, c]);
    }
}
