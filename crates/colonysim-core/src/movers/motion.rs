//! Per-tick mover integration and the repath service.

use std::collections::VecDeque;

use colonysim_logic::constants::mover::{
    ARRIVAL_RADIUS, CARRY_SPEED_MULT, COLD_SPEED_MULT, HUNGRY_SPEED_MULT, HYPOTHERMIA_TEMP, KNOT_STUCK_TIME,
    MAX_REPATHS_PER_FRAME, REPATH_COOLDOWN_FRAMES, STUCK_CHECK_INTERVAL, STUCK_MIN_PROGRESS, STUCK_REPATH_TIME,
};

use super::{avoidance_vector, remove_mover, slide_move, wall_repulsion, Mover, MoverId};
use crate::common::{CellPos, Vec3};
use crate::engine::Sim;
use crate::items::sync_contents_position;
use crate::path;
use crate::world::{landing_below, walkable_cardinal_neighbor};

/// Radius for endless-mode and re-evaluated goals.
pub(crate) const WANDER_RADIUS: i32 = 10;

/// Movers waiting for a path, serviced first-in first-out.
#[derive(Debug, Clone, Default)]
pub struct RepathQueue {
    queue: VecDeque<MoverId>,
}

impl RepathQueue {
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub(crate) fn push(&mut self, id: MoverId) {
        self.queue.push_back(id);
    }
}

/// Speed after need, load and terrain penalties.
pub fn effective_speed(sim: &Sim, m: &Mover) -> f32 {
    let mut speed = m.speed;
    if sim.flags.hunger_enabled && m.needs.hunger < sim.balance.hunger_seek_threshold {
        speed *= HUNGRY_SPEED_MULT;
    }
    if sim.flags.body_temp_enabled && m.needs.body_temp < HYPOTHERMIA_TEMP {
        speed *= COLD_SPEED_MULT;
    }
    if is_carrying(sim, m) {
        speed *= CARRY_SPEED_MULT;
    }
    let penalty = sim.grid.move_penalty(m.cell()) as f32;
    speed * 10.0 / (10.0 + penalty)
}

pub fn is_carrying(sim: &Sim, m: &Mover) -> bool {
    m.current_job
        .and_then(|j| sim.jobs.get(j))
        .is_some_and(|job| job.carrying.is_some())
}

fn repath_cooldown(sim: &mut Sim) -> u32 {
    if sim.flags.use_randomized_cooldowns {
        let half = (REPATH_COOLDOWN_FRAMES / 2) as i32;
        sim.rng.get_random_value(half, REPATH_COOLDOWN_FRAMES as i32 + half) as u32
    } else {
        REPATH_COOLDOWN_FRAMES
    }
}

/// A random walkable cell within `radius` of `around`.
pub fn random_walkable_near(sim: &mut Sim, around: CellPos, radius: i32) -> Option<CellPos> {
    let prefer_other_z = sim.flags.prefer_different_z && sim.grid.depth > 1;
    for attempt in 0..16 {
        let x = sim.rng.get_random_value(around.x - radius, around.x + radius);
        let y = sim.rng.get_random_value(around.y - radius, around.y + radius);
        let z = if prefer_other_z && attempt < 8 {
            sim.rng.get_random_value(0, sim.grid.depth - 1)
        } else {
            around.z
        };
        let p = CellPos::new(x, y, z);
        if prefer_other_z && attempt < 8 && z == around.z {
            continue;
        }
        if p != around && sim.grid.is_walkable(p) {
            return Some(p);
        }
    }
    None
}

/// Integrate every mover for one tick, in insertion order.
pub fn update_movers(sim: &mut Sim, dt: f32) {
    sim.mover_grid.rebuild(&sim.movers);
    let tick = sim.clock.tick;
    for (index, id) in sim.movers.ids().into_iter().enumerate() {
        if !sim.movers.contains(id) {
            continue;
        }
        sync_carried(sim, id);
        enqueue_repath(sim, id);
        stuck_check(sim, id, dt);
        follow_path(sim, id, dt, index, tick);
        if !push_out_of_wall(sim, id) {
            continue;
        }
        endless_goal(sim, id);
    }
}

fn sync_carried(sim: &mut Sim, id: MoverId) {
    let Some(m) = sim.movers.get(id) else {
        return;
    };
    let pos = m.pos;
    let carried = m.current_job.and_then(|j| sim.jobs.get(j)).and_then(|job| job.carrying);
    let equipped = [m.equipped_tool, m.equipped_clothing];
    for item in std::iter::once(carried).chain(equipped).flatten() {
        if let Some(it) = sim.items.get_mut(item) {
            it.pos = pos;
        }
        sync_contents_position(&mut sim.items, item);
    }
}

fn enqueue_repath(sim: &mut Sim, id: MoverId) {
    let Some(m) = sim.movers.get_mut(id) else {
        return;
    };
    if m.repath_cooldown > 0 {
        m.repath_cooldown -= 1;
        return;
    }
    if m.needs_repath && !m.repath_queued {
        m.repath_queued = true;
        sim.repath_queue.push(id);
    }
}

fn stuck_check(sim: &mut Sim, id: MoverId, dt: f32) {
    let Some(m) = sim.movers.get_mut(id) else {
        return;
    };
    m.stuck_check_timer += dt;
    if m.stuck_check_timer < STUCK_CHECK_INTERVAL {
        return;
    }
    let moved = m.pos.distance(&m.last_check_pos);
    if m.has_path() && moved < STUCK_MIN_PROGRESS {
        m.time_without_progress += m.stuck_check_timer;
    } else {
        m.time_without_progress = 0.0;
    }
    m.stuck_check_timer = 0.0;
    m.last_check_pos = m.pos;
    if m.time_without_progress >= STUCK_REPATH_TIME {
        log::debug!("mover {} stuck at {}, repathing", m.name.given, m.cell());
        m.time_without_progress = 0.0;
        m.needs_repath = true;
    }
}

fn follow_path(sim: &mut Sim, id: MoverId, dt: f32, index: usize, tick: u64) {
    let Some(m) = sim.movers.get(id) else {
        return;
    };
    let Some(waypoint) = m.waypoint() else {
        return;
    };
    let speed = effective_speed(sim, m);
    let mut pos = m.pos;
    let target = waypoint.center();

    let dx = target.x - pos.x;
    let dy = target.y - pos.y;
    let dist = (dx * dx + dy * dy).sqrt();
    let step = speed * dt;
    let mut arrived = false;
    if dist <= step.max(ARRIVAL_RADIUS) {
        pos = Vec3::new(target.x, target.y, waypoint.z as f32);
        arrived = true;
    } else {
        let next = Vec3::new(pos.x + dx / dist * step, pos.y + dy / dist * step, pos.z);
        let mut next_cell = next.cell();
        if next_cell.x == waypoint.x && next_cell.y == waypoint.y {
            next_cell.z = waypoint.z;
        }
        if next_cell != pos.cell() && !sim.grid.is_walkable(next_cell) {
            if let Some(m) = sim.movers.get_mut(id) {
                m.needs_repath = true;
            }
            return;
        }
        pos = Vec3::new(next.x, next.y, next_cell.z as f32);
    }

    // Steering only displaces within the current level.
    let mut push = (0.0f32, 0.0f32);
    if sim.flags.use_mover_avoidance {
        let refresh = !sim.flags.use_staggered_updates || (index as u64 + tick) % 2 == 0;
        let avoid = if refresh {
            avoidance_vector(&sim.grid, &sim.mover_grid, &sim.flags, id, pos)
        } else {
            sim.movers.get(id).map(|m| m.avoid_cache).unwrap_or_default()
        };
        if let Some(m) = sim.movers.get_mut(id) {
            m.avoid_cache = avoid;
        }
        push.0 += avoid.0;
        push.1 += avoid.1;
    }
    if sim.flags.use_wall_repulsion {
        let (rx, ry) = wall_repulsion(&sim.grid, pos, sim.flags.wall_repulsion_strength);
        push.0 += rx;
        push.1 += ry;
    }
    if !arrived && (push.0 != 0.0 || push.1 != 0.0) {
        pos = slide_move(&sim.grid, pos, push.0 * speed * dt, push.1 * speed * dt, sim.flags.use_wall_sliding);
    }

    let use_knot_fix = sim.flags.use_knot_fix;
    let Some(m) = sim.movers.get_mut(id) else {
        return;
    };
    m.pos = pos;
    if arrived {
        m.path_index -= 1;
        m.waypoint_timer = 0.0;
        if m.path_index < 0 && m.cell() != m.goal {
            // Truncated path: continue from the effective goal.
            m.needs_repath = true;
        }
    } else {
        m.waypoint_timer += dt;
        if use_knot_fix && m.waypoint_timer > KNOT_STUCK_TIME {
            m.waypoint_timer = 0.0;
            m.needs_repath = true;
        }
    }
}

/// Resolve a mover standing in an unwalkable cell. Returns false when the
/// mover had to be removed.
fn push_out_of_wall(sim: &mut Sim, id: MoverId) -> bool {
    let Some(m) = sim.movers.get(id) else {
        return false;
    };
    let cell = m.cell();
    if sim.grid.is_walkable(cell) {
        return true;
    }
    let dest = walkable_cardinal_neighbor(&sim.grid, cell).or_else(|| landing_below(&sim.grid, cell));
    match dest {
        Some(p) => {
            if let Some(m) = sim.movers.get_mut(id) {
                m.pos = p.center();
                m.clear_path();
                m.needs_repath = true;
            }
            true
        }
        None => {
            log::warn!("mover trapped at {} with no walkable neighbour, removing", cell);
            remove_mover(sim, id);
            false
        }
    }
}

fn endless_goal(sim: &mut Sim, id: MoverId) {
    if !sim.flags.endless_mover_mode {
        return;
    }
    let Some(m) = sim.movers.get(id) else {
        return;
    };
    if !m.is_idle() || m.has_path() || m.needs_repath || m.freetime != super::FreetimeState::None {
        return;
    }
    let around = m.cell();
    if let Some(goal) = random_walkable_near(sim, around, WANDER_RADIUS) {
        if let Some(m) = sim.movers.get_mut(id) {
            m.goal = goal;
            m.path_failed = false;
            m.needs_repath = true;
        }
    }
}

/// Compute paths for up to `MAX_REPATHS_PER_FRAME` queued movers.
pub fn service_repaths(sim: &mut Sim) {
    let mut budget = MAX_REPATHS_PER_FRAME;
    while budget > 0 {
        let Some(id) = sim.repath_queue.queue.pop_front() else {
            break;
        };
        let Some(m) = sim.movers.get_mut(id) else {
            continue;
        };
        m.repath_queued = false;
        if !m.needs_repath {
            continue;
        }
        budget -= 1;
        let start = m.cell();
        let goal = m.goal;
        let has_job = m.current_job.is_some();
        sim.stats.repaths += 1;

        if let Some(p) = path::find_path(sim, start, goal) {
            if let Some(m) = sim.movers.get_mut(id) {
                m.set_path(goal, p);
            }
            continue;
        }

        sim.stats.path_failures += 1;
        let cooldown = repath_cooldown(sim);
        let goal_walkable = sim.grid.is_walkable(goal);
        let new_goal = if !has_job && !goal_walkable {
            random_walkable_near(sim, start, WANDER_RADIUS / 2)
        } else {
            None
        };
        let Some(m) = sim.movers.get_mut(id) else {
            continue;
        };
        m.clear_path();
        m.repath_cooldown = cooldown;
        if has_job {
            m.needs_repath = false;
            m.path_failed = true;
            log::debug!("no path {} -> {} for {}", start, goal, m.name.given);
        } else if let Some(g) = new_goal {
            m.goal = g;
        } else if !goal_walkable {
            m.goal = start;
            m.needs_repath = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movers::{move_to, spawn_mover, MoveStatus};
    use crate::world::CellKind;
    use colonysim_logic::config::SimFlags;

    fn run(sim: &mut Sim, ticks: usize) {
        for _ in 0..ticks {
            sim.tick();
        }
    }

    #[test]
    fn test_mover_walks_to_goal() {
        let mut sim = Sim::new(12, 12, 1, 1, SimFlags::deterministic_test());
        let id = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let goal = CellPos::new(9, 6, 0);
        assert_eq!(move_to(&mut sim, id, goal), MoveStatus::Moving);
        let mut arrived = false;
        for _ in 0..600 {
            sim.tick();
            if move_to(&mut sim, id, goal) == MoveStatus::Arrived {
                arrived = true;
                break;
            }
        }
        assert!(arrived);
        assert_eq!(sim.movers.get(id).unwrap().cell(), goal);
    }

    #[test]
    fn test_unreachable_goal_fails() {
        let mut sim = Sim::new(10, 10, 1, 1, SimFlags::deterministic_test());
        for p in [(4, 4), (5, 4), (6, 4), (4, 5), (6, 5), (4, 6), (5, 6), (6, 6)] {
            sim.grid.set_kind(CellPos::new(p.0, p.1, 0), CellKind::Wall);
        }
        let id = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        sim.movers.get_mut(id).unwrap().current_job = None;
        move_to(&mut sim, id, CellPos::new(5, 5, 0));
        run(&mut sim, 5);
        // Idle movers keep a walkable goal and retry after the cooldown.
        let m = sim.movers.get(id).unwrap();
        assert!(!m.has_path());
        assert!(m.repath_cooldown > 0 || m.needs_repath);
        assert!(sim.stats.path_failures >= 1);
    }

    #[test]
    fn test_wall_on_cell_pushes_out() {
        let mut sim = Sim::new(6, 6, 1, 1, SimFlags::deterministic_test());
        let id = spawn_mover(&mut sim, CellPos::new(2, 2, 0)).unwrap();
        sim.grid.set_kind(CellPos::new(2, 2, 0), CellKind::Wall);
        run(&mut sim, 1);
        let m = sim.movers.get(id).unwrap();
        assert!(sim.grid.is_walkable(m.cell()));
    }
}
