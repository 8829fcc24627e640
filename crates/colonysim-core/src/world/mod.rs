//! Voxel world - grid storage and the edits that keep entities consistent
//! with it.

mod edit;
mod grid;

pub use edit::*;
pub use grid::*;

use crate::common::{CellPos, Direction, NEIGHBORS_8};

/// A ramp pointing `dir` at `p` is valid when the cell on its high side at
/// the same level is solid (so the exit cell above it is supported) and
/// there is a level to climb to.
pub fn ramp_is_valid(grid: &Grid, p: CellPos, dir: Direction) -> bool {
    let (dx, dy) = dir.delta();
    p.z + 1 < grid.depth && grid.in_bounds(p) && grid.is_solid(p.offset(dx, dy, 0))
}

/// Every direction a ramp at `p` could point.
pub fn valid_ramp_dirs(grid: &Grid, p: CellPos) -> Vec<Direction> {
    Direction::ALL.into_iter().filter(|d| ramp_is_valid(grid, p, *d)).collect()
}

/// Cell to drop something near `at`: `at` itself when walkable, else the
/// first walkable of its eight neighbours, else `at` anyway.
pub fn find_safe_drop_cell(grid: &Grid, at: CellPos) -> CellPos {
    if grid.is_walkable(at) {
        return at;
    }
    NEIGHBORS_8
        .iter()
        .map(|(dx, dy)| at.offset(*dx, *dy, 0))
        .find(|p| grid.is_walkable(*p))
        .unwrap_or(at)
}

/// First walkable 4-neighbour of `p`.
pub fn walkable_cardinal_neighbor(grid: &Grid, p: CellPos) -> Option<CellPos> {
    Direction::ALL
        .into_iter()
        .map(|d| {
            let (dx, dy) = d.delta();
            p.offset(dx, dy, 0)
        })
        .find(|q| grid.is_walkable(*q))
}

/// Walk down from `p` to the first walkable cell in the column.
pub fn landing_below(grid: &Grid, p: CellPos) -> Option<CellPos> {
    let mut z = p.z - 1;
    while z >= 0 {
        let q = CellPos::new(p.x, p.y, z);
        if grid.is_walkable(q) {
            return Some(q);
        }
        if grid.is_solid(q) {
            return None;
        }
        z -= 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use colonysim_logic::items::MaterialType;

    #[test]
    fn test_ramp_needs_solid_high_side() {
        let mut g = Grid::new(5, 5, 2);
        let p = CellPos::new(2, 2, 0);
        assert!(valid_ramp_dirs(&g, p).is_empty());
        g.set_kind_with_material(CellPos::new(3, 2, 0), CellKind::Wall, MaterialType::Granite);
        assert_eq!(valid_ramp_dirs(&g, p), vec![Direction::East]);
    }

    #[test]
    fn test_safe_drop_prefers_own_cell() {
        let mut g = Grid::new(5, 5, 1);
        let p = CellPos::new(2, 2, 0);
        assert_eq!(find_safe_drop_cell(&g, p), p);
        g.set_kind(p, CellKind::Wall);
        let d = find_safe_drop_cell(&g, p);
        assert_ne!(d, p);
        assert!(g.is_walkable(d));
    }

    #[test]
    fn test_landing_below_stops_at_solid() {
        let mut g = Grid::new(3, 3, 3);
        g.set_kind(CellPos::new(1, 1, 0), CellKind::Wall);
        assert_eq!(landing_below(&g, CellPos::new(1, 1, 2)), Some(CellPos::new(1, 1, 1)));
    }
}
