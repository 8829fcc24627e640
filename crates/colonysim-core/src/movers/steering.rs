//! Local steering: separation from nearby movers, wall repulsion and wall
//! sliding. All vectors are planar; z never changes here.

use colonysim_logic::config::SimFlags;
use colonysim_logic::constants::mover::MOVER_AVOID_RADIUS;

use super::{MoverGrid, MoverId};
use crate::common::{CellPos, Vec3, NEIGHBORS_8};
use crate::world::Grid;

/// Distance from a blocked cell edge inside which repulsion kicks in.
const WALL_REPULSION_RANGE: f32 = 0.3;

/// The 3x3 block around `cell` is walkable.
pub fn is_open_area(grid: &Grid, cell: CellPos) -> bool {
    grid.is_walkable(cell) && NEIGHBORS_8.iter().all(|(dx, dy)| grid.is_walkable(cell.offset(*dx, *dy, 0)))
}

/// Whether steering may push a mover into `cell`.
fn can_push_into(grid: &Grid, cell: CellPos, allow_falling: bool) -> bool {
    if allow_falling {
        grid.in_bounds(cell) && !grid.is_solid(cell)
    } else {
        grid.is_walkable(cell)
    }
}

/// Separation vector away from movers within `MOVER_AVOID_RADIUS`.
pub fn avoidance_vector(grid: &Grid, movers: &MoverGrid, flags: &SimFlags, id: MoverId, pos: Vec3) -> (f32, f32) {
    let mut ax = 0.0f32;
    let mut ay = 0.0f32;
    movers.query_mover_neighbors(pos, MOVER_AVOID_RADIUS, Some(id), |_, other| {
        let dx = pos.x - other.x;
        let dy = pos.y - other.y;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist < 1e-4 {
            // Exactly overlapping: fall back to a fixed axis so the pair splits.
            ax += 1.0;
            return;
        }
        let w = 1.0 - dist / MOVER_AVOID_RADIUS;
        ax += dx / dist * w;
        ay += dy / dist * w;
    });
    if ax == 0.0 && ay == 0.0 {
        return (0.0, 0.0);
    }

    let cell = pos.cell();
    let strength = if is_open_area(grid, cell) {
        flags.steering.avoid_strength_open
    } else {
        flags.steering.avoid_strength_closed
    };
    ax *= strength;
    ay *= strength;

    if flags.use_directional_avoidance {
        let allow = flags.allow_falling_from_avoidance;
        if ax > 0.0 && !can_push_into(grid, cell.offset(1, 0, 0), allow) {
            ax = 0.0;
        }
        if ax < 0.0 && !can_push_into(grid, cell.offset(-1, 0, 0), allow) {
            ax = 0.0;
        }
        if ay > 0.0 && !can_push_into(grid, cell.offset(0, 1, 0), allow) {
            ay = 0.0;
        }
        if ay < 0.0 && !can_push_into(grid, cell.offset(0, -1, 0), allow) {
            ay = 0.0;
        }
    }
    (ax, ay)
}

/// Push away from unwalkable cardinal neighbours when closer than
/// `WALL_REPULSION_RANGE` to the shared edge.
pub fn wall_repulsion(grid: &Grid, pos: Vec3, strength: f32) -> (f32, f32) {
    let cell = pos.cell();
    let fx = pos.x - cell.x as f32;
    let fy = pos.y - cell.y as f32;
    let mut rx = 0.0;
    let mut ry = 0.0;
    if fx < WALL_REPULSION_RANGE && !grid.is_walkable(cell.offset(-1, 0, 0)) {
        rx += (WALL_REPULSION_RANGE - fx) / WALL_REPULSION_RANGE;
    }
    if 1.0 - fx < WALL_REPULSION_RANGE && !grid.is_walkable(cell.offset(1, 0, 0)) {
        rx -= (WALL_REPULSION_RANGE - (1.0 - fx)) / WALL_REPULSION_RANGE;
    }
    if fy < WALL_REPULSION_RANGE && !grid.is_walkable(cell.offset(0, -1, 0)) {
        ry += (WALL_REPULSION_RANGE - fy) / WALL_REPULSION_RANGE;
    }
    if 1.0 - fy < WALL_REPULSION_RANGE && !grid.is_walkable(cell.offset(0, 1, 0)) {
        ry -= (WALL_REPULSION_RANGE - (1.0 - fy)) / WALL_REPULSION_RANGE;
    }
    (rx * strength, ry * strength)
}

fn lands_walkable(grid: &Grid, from: Vec3, to: Vec3) -> bool {
    let a = from.cell();
    let b = to.cell();
    if a == b {
        return true;
    }
    if !grid.is_walkable(b) {
        return false;
    }
    // Diagonal cell change must not cut a corner.
    if a.x != b.x && a.y != b.y {
        return grid.is_walkable(CellPos::new(b.x, a.y, a.z)) && grid.is_walkable(CellPos::new(a.x, b.y, a.z));
    }
    true
}

/// Apply a planar displacement. With sliding, a blocked move retries each
/// axis on its own; without it the mover stays put.
pub fn slide_move(grid: &Grid, pos: Vec3, dx: f32, dy: f32, sliding: bool) -> Vec3 {
    let full = Vec3::new(pos.x + dx, pos.y + dy, pos.z);
    if lands_walkable(grid, pos, full) {
        return full;
    }
    if !sliding {
        return pos;
    }
    let x_only = Vec3::new(pos.x + dx, pos.y, pos.z);
    if dx != 0.0 && lands_walkable(grid, pos, x_only) {
        return x_only;
    }
    let y_only = Vec3::new(pos.x, pos.y + dy, pos.z);
    if dy != 0.0 && lands_walkable(grid, pos, y_only) {
        return y_only;
    }
    pos
}
