//! String pulling: greedy line-of-sight shortcuts over a cell path.
//!
//! Off by default. The check runs against the grid at build time; movers
//! displaced by avoidance can later stand where the shortcut's line no
//! longer clears a corner.

use crate::common::CellPos;
use crate::world::Grid;

/// Every cell on the segment `a`-`b` (same level) is walkable, and
/// diagonal steps never cut a corner.
pub fn line_of_sight(grid: &Grid, a: CellPos, b: CellPos) -> bool {
    if a.z != b.z {
        return false;
    }
    let dx = (b.x - a.x).abs();
    let dy = (b.y - a.y).abs();
    let sx = (b.x - a.x).signum();
    let sy = (b.y - a.y).signum();
    let mut x = a.x;
    let mut y = a.y;
    let mut err = dx - dy;
    if !grid.is_walkable(a) {
        return false;
    }
    while x != b.x || y != b.y {
        let e2 = 2 * err;
        let step_x = e2 > -dy;
        let step_y = e2 < dx;
        if step_x && step_y {
            if !grid.is_walkable(CellPos::new(x + sx, y, a.z)) || !grid.is_walkable(CellPos::new(x, y + sy, a.z)) {
                return false;
            }
        }
        if step_x {
            err -= dy;
            x += sx;
        }
        if step_y {
            err += dx;
            y += sy;
        }
        if !grid.is_walkable(CellPos::new(x, y, a.z)) {
            return false;
        }
    }
    true
}

/// Shortcut a reversed path. Waypoints where the level changes are kept.
pub fn string_pull(grid: &Grid, path: &[CellPos]) -> Vec<CellPos> {
    if path.len() <= 2 {
        return path.to_vec();
    }
    let forward: Vec<CellPos> = path.iter().rev().copied().collect();
    let mut out = vec![forward[0]];
    let mut i = 0;
    while i < forward.len() - 1 {
        let mut best = i + 1;
        let mut j = i + 2;
        while j < forward.len() {
            if forward[j - 1].z != forward[i].z || forward[j].z != forward[i].z {
                break;
            }
            if line_of_sight(grid, forward[i], forward[j]) {
                best = j;
            }
            j += 1;
        }
        out.push(forward[best]);
        i = best;
    }
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::astar;
    use crate::world::CellKind;

    #[test]
    fn test_open_field_collapses() {
        let g = Grid::new(10, 10, 1);
        let f = astar(&g, CellPos::new(0, 0, 0), CellPos::new(9, 4, 0)).unwrap();
        let pulled = string_pull(&g, &f.path);
        assert_eq!(pulled.len(), 2);
        assert_eq!(pulled[0], CellPos::new(9, 4, 0));
    }

    #[test]
    fn test_wall_blocks_shortcut() {
        let mut g = Grid::new(10, 10, 1);
        for y in 0..8 {
            g.set_kind(CellPos::new(5, y, 0), CellKind::Wall);
        }
        assert!(!line_of_sight(&g, CellPos::new(0, 0, 0), CellPos::new(9, 0, 0)));
        let f = astar(&g, CellPos::new(0, 0, 0), CellPos::new(9, 0, 0)).unwrap();
        let pulled = string_pull(&g, &f.path);
        assert!(pulled.len() > 2);
        for w in pulled.windows(2) {
            assert!(line_of_sight(&g, w[0], w[1]));
        }
    }
}
