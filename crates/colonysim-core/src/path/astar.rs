//! Cell-level A*.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use super::{heuristic, neighbors};
use crate::common::CellPos;
use crate::world::Grid;

/// Result of a search: the path reversed (`path[0]` is the goal) and its
/// total cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub path: Vec<CellPos>,
    pub cost: u32,
}

/// A* from `start` to `goal`, expanding only cells for which `allow`
/// returns true. Open-set ties break on lower f, then lower h, then cell
/// order, so results never depend on hash iteration.
pub fn astar_filtered(grid: &Grid, start: CellPos, goal: CellPos, allow: impl Fn(CellPos) -> bool) -> Option<Found> {
    if !grid.is_walkable(start) || !grid.is_walkable(goal) || !allow(start) || !allow(goal) {
        return None;
    }
    if start == goal {
        return Some(Found { path: vec![start], cost: 0 });
    }

    let mut open: BinaryHeap<Reverse<(u32, u32, CellPos)>> = BinaryHeap::new();
    let mut g_score: HashMap<CellPos, u32> = HashMap::new();
    let mut came_from: HashMap<CellPos, CellPos> = HashMap::new();
    let mut edges = Vec::with_capacity(12);

    let h0 = heuristic(start, goal);
    g_score.insert(start, 0);
    open.push(Reverse((h0, h0, start)));

    while let Some(Reverse((f, h, cur))) = open.pop() {
        let g = f - h;
        if g_score.get(&cur).is_some_and(|best| *best < g) {
            continue;
        }
        if cur == goal {
            let mut path = vec![cur];
            let mut at = cur;
            while let Some(prev) = came_from.get(&at) {
                path.push(*prev);
                at = *prev;
            }
            return Some(Found { path, cost: g });
        }
        edges.clear();
        neighbors(grid, cur, &mut edges);
        for (next, cost) in edges.iter().copied() {
            if !allow(next) {
                continue;
            }
            let tentative = g + cost;
            if g_score.get(&next).is_some_and(|best| *best <= tentative) {
                continue;
            }
            g_score.insert(next, tentative);
            came_from.insert(next, cur);
            let nh = heuristic(next, goal);
            open.push(Reverse((tentative + nh, nh, next)));
        }
    }
    None
}

/// Unrestricted A* over the whole grid.
pub fn astar(grid: &Grid, start: CellPos, goal: CellPos) -> Option<Found> {
    astar_filtered(grid, start, goal, |_| true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::path_cost;
    use crate::world::CellKind;
    use colonysim_logic::items::MaterialType;

    #[test]
    fn test_straight_line() {
        let g = Grid::new(10, 10, 1);
        let f = astar(&g, CellPos::new(0, 0, 0), CellPos::new(5, 0, 0)).unwrap();
        assert_eq!(f.path.len(), 6);
        assert_eq!(f.path[0], CellPos::new(5, 0, 0));
        assert_eq!(*f.path.last().unwrap(), CellPos::new(0, 0, 0));
        assert_eq!(f.cost, 50);
        assert_eq!(path_cost(&g, &f.path), Some(50));
    }

    #[test]
    fn test_no_corner_cutting() {
        let mut g = Grid::new(4, 4, 1);
        g.set_kind(CellPos::new(1, 0, 0), CellKind::Wall);
        let f = astar(&g, CellPos::new(0, 0, 0), CellPos::new(1, 1, 0)).unwrap();
        // Diagonal is blocked by the wall, so the path goes around.
        assert_eq!(f.path.len(), 3);
    }

    #[test]
    fn test_ladder_climb() {
        let mut g = Grid::new(5, 5, 2);
        g.set_kind_with_material(CellPos::new(2, 2, 0), CellKind::LadderUp, MaterialType::Oak);
        g.set_kind_with_material(CellPos::new(2, 2, 1), CellKind::LadderDown, MaterialType::Oak);
        g.set_kind(CellPos::new(3, 2, 0), CellKind::Wall);
        let f = astar(&g, CellPos::new(0, 2, 0), CellPos::new(3, 2, 1)).unwrap();
        assert!(f.path.contains(&CellPos::new(2, 2, 1)));
    }

    #[test]
    fn test_ramp_climb() {
        let mut g = Grid::new(5, 5, 2);
        g.set_kind(CellPos::new(3, 2, 0), CellKind::Wall);
        g.set_kind(CellPos::new(2, 2, 0), CellKind::RampE);
        let f = astar(&g, CellPos::new(0, 2, 0), CellPos::new(3, 2, 1)).unwrap();
        assert_eq!(f.path[1], CellPos::new(2, 2, 0));
    }

    #[test]
    fn test_walled_pocket_unreachable() {
        let mut g = Grid::new(8, 8, 1);
        for (x, y) in [(2, 2), (3, 2), (4, 2), (2, 3), (4, 3), (2, 4), (3, 4), (4, 4)] {
            g.set_kind(CellPos::new(x, y, 0), CellKind::Wall);
        }
        assert!(astar(&g, CellPos::new(0, 0, 0), CellPos::new(3, 3, 0)).is_none());
    }
}
