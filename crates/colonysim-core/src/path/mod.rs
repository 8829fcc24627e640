//! Pathfinding: cell-level A*, chunked HPA* and optional string pulling.
//!
//! Costs are integer tenths of a tile: 10 per cardinal or vertical step,
//! 14 per diagonal, plus the mean of both cells' move penalties. Penalties
//! are always even, so every edge costs the same in both directions.

mod astar;
mod hpa;
mod smoothing;

pub use astar::{astar, astar_filtered, Found};
pub use hpa::HpaGraph;
pub use smoothing::{line_of_sight, string_pull};

use colonysim_logic::config::PathAlgorithm;

use crate::common::{CellPos, Direction};
use crate::engine::Sim;
use crate::world::Grid;

pub const COST_STRAIGHT: u32 = 10;
pub const COST_DIAGONAL: u32 = 14;

const IN_PLANE: [(i32, i32); 8] = [(0, -1), (1, 0), (0, 1), (-1, 0), (1, -1), (1, 1), (-1, 1), (-1, -1)];

/// Admissible estimate: Chebyshev distance over all three axes.
pub fn heuristic(a: CellPos, b: CellPos) -> u32 {
    a.chebyshev(&b) as u32 * COST_STRAIGHT
}

fn step_cost(grid: &Grid, base: u32, a: CellPos, b: CellPos) -> u32 {
    base + (grid.move_penalty(a) + grid.move_penalty(b)) / 2
}

/// Every edge out of `p` with its cost. Nothing is emitted for an
/// unwalkable `p`.
pub fn neighbors(grid: &Grid, p: CellPos, out: &mut Vec<(CellPos, u32)>) {
    if !grid.is_walkable(p) {
        return;
    }
    for (dx, dy) in IN_PLANE {
        let q = p.offset(dx, dy, 0);
        if !grid.is_walkable(q) {
            continue;
        }
        let base = if dx != 0 && dy != 0 {
            if !grid.is_walkable(p.offset(dx, 0, 0)) || !grid.is_walkable(p.offset(0, dy, 0)) {
                continue;
            }
            COST_DIAGONAL
        } else {
            COST_STRAIGHT
        };
        out.push((q, step_cost(grid, base, p, q)));
    }

    let kind = grid.kind(p);
    // Ladders link consecutive ladder cells in a column.
    if kind.ladder_goes_up() {
        let q = p.offset(0, 0, 1);
        if grid.kind(q).ladder_goes_down() {
            out.push((q, step_cost(grid, COST_STRAIGHT, p, q)));
        }
    }
    if kind.ladder_goes_down() {
        let q = p.offset(0, 0, -1);
        if grid.kind(q).ladder_goes_up() {
            out.push((q, step_cost(grid, COST_STRAIGHT, p, q)));
        }
    }
    // Up a ramp onto its high side, and down from a high side onto the ramp.
    if let Some(dir) = kind.ramp_dir() {
        let (dx, dy) = dir.delta();
        let q = p.offset(dx, dy, 1);
        if grid.is_walkable(q) {
            out.push((q, step_cost(grid, COST_STRAIGHT, p, q)));
        }
    }
    for dir in Direction::ALL {
        let (dx, dy) = dir.delta();
        let r = p.offset(-dx, -dy, -1);
        if grid.kind(r).ramp_dir() == Some(dir) {
            out.push((r, step_cost(grid, COST_STRAIGHT, p, r)));
        }
    }
}

/// Cost of an adjacent-step path, or `None` if any step is not an edge.
pub fn path_cost(grid: &Grid, path: &[CellPos]) -> Option<u32> {
    let mut total = 0;
    let mut edges = Vec::new();
    for pair in path.windows(2) {
        edges.clear();
        neighbors(grid, pair[0], &mut edges);
        let (_, c) = edges.iter().find(|(q, _)| *q == pair[1])?;
        total += c;
    }
    Some(total)
}

/// Owns the HPA* abstract graph and dispatches searches.
#[derive(Debug, Clone, Default)]
pub struct Pathfinder {
    pub hpa: HpaGraph,
}

impl Pathfinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the abstract graph for chunks the grid reports dirty.
    pub fn build_graph(&mut self, grid: &mut Grid) {
        if !grid.has_dirty_chunks() && self.hpa.is_built() {
            return;
        }
        let dirty = grid.take_dirty_chunks();
        self.hpa.rebuild(grid, &dirty);
    }

    /// Reversed path from `start` to `goal` using `algo`.
    pub fn find(&self, grid: &Grid, start: CellPos, goal: CellPos, algo: PathAlgorithm) -> Option<Vec<CellPos>> {
        let found = match algo {
            PathAlgorithm::AStar => astar(grid, start, goal),
            PathAlgorithm::Hpa => self.hpa.find_path(grid, start, goal),
        };
        found.map(|f| f.path)
    }
}

/// Path for a mover using the sim's algorithm and smoothing flags,
/// rebuilding dirty chunks first.
pub fn find_path(sim: &mut Sim, start: CellPos, goal: CellPos) -> Option<Vec<CellPos>> {
    sim.pathfinder.build_graph(&mut sim.grid);
    let path = sim.pathfinder.find(&sim.grid, start, goal, sim.flags.mover_path_algorithm)?;
    if sim.flags.use_string_pulling {
        Some(string_pull(&sim.grid, &path))
    } else {
        Some(path)
    }
}

/// Cheap reachability check for work-givers.
pub fn is_reachable(sim: &mut Sim, start: CellPos, goal: CellPos) -> bool {
    sim.pathfinder.build_graph(&mut sim.grid);
    sim.pathfinder
        .find(&sim.grid, start, goal, sim.flags.mover_path_algorithm)
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::CellKind;

    #[test]
    fn test_edge_costs_symmetric() {
        let mut g = Grid::new(6, 6, 1);
        g.set_kind(CellPos::new(3, 3, 0), CellKind::Bush);
        g.set_wetness(CellPos::new(2, 3, 0), 2);
        let mut a = Vec::new();
        let mut b = Vec::new();
        neighbors(&g, CellPos::new(2, 3, 0), &mut a);
        neighbors(&g, CellPos::new(3, 3, 0), &mut b);
        let ab = a.iter().find(|(q, _)| *q == CellPos::new(3, 3, 0)).unwrap().1;
        let ba = b.iter().find(|(q, _)| *q == CellPos::new(2, 3, 0)).unwrap().1;
        assert_eq!(ab, ba);
        assert!(ab > COST_STRAIGHT);
    }

    #[test]
    fn test_unwalkable_has_no_edges() {
        let mut g = Grid::new(3, 3, 1);
        g.set_kind(CellPos::new(1, 1, 0), CellKind::Wall);
        let mut out = Vec::new();
        neighbors(&g, CellPos::new(1, 1, 0), &mut out);
        assert!(out.is_empty());
    }
}
