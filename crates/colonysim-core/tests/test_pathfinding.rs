//! Pathfinder properties over random terrain.

use colonysim_core::common::CellPos;
use colonysim_core::movers::truncate_path;
use colonysim_core::path::{astar, path_cost, Pathfinder};
use colonysim_core::world::{CellKind, Grid};
use colonysim_logic::config::PathAlgorithm;
use colonysim_logic::constants::limits::MAX_MOVER_PATH;
use proptest::prelude::*;

const W: i32 = 24;
const H: i32 = 24;

/// A single-level grid with 8x8 chunks and the given wall cells.
fn walled_grid(walls: &[bool]) -> Grid {
    let mut grid = Grid::with_chunks(W, H, 1, 8, 8);
    for (i, wall) in walls.iter().enumerate() {
        if *wall {
            let p = CellPos::new(i as i32 % W, i as i32 / W, 0);
            grid.set_kind(p, CellKind::Wall);
        }
    }
    grid
}

fn cell_strategy() -> impl Strategy<Value = CellPos> {
    (0..W, 0..H).prop_map(|(x, y)| CellPos::new(x, y, 0))
}

fn walls_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(prop::bool::weighted(0.25), (W * H) as usize)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_path_cost_is_reversible(walls in walls_strategy(), s in cell_strategy(), g in cell_strategy()) {
        let mut grid = walled_grid(&walls);
        grid.set_kind(s, CellKind::Air);
        grid.set_kind(g, CellKind::Air);
        let there = astar(&grid, s, g);
        let back = astar(&grid, g, s);
        prop_assert_eq!(there.is_some(), back.is_some());
        if let (Some(a), Some(b)) = (there, back) {
            prop_assert_eq!(a.cost, b.cost);
            prop_assert_eq!(path_cost(&grid, &a.path), path_cost(&grid, &b.path));
        }
    }

    #[test]
    fn test_hpa_agrees_with_astar(walls in walls_strategy(), s in cell_strategy(), g in cell_strategy()) {
        let mut grid = walled_grid(&walls);
        let mut pf = Pathfinder::new();
        pf.build_graph(&mut grid);
        let flat = pf.find(&grid, s, g, PathAlgorithm::AStar);
        let hpa = pf.find(&grid, s, g, PathAlgorithm::Hpa);
        prop_assert_eq!(flat.is_some(), hpa.is_some());
        if let Some(path) = hpa {
            prop_assert_eq!(path[0], g);
            prop_assert_eq!(*path.last().unwrap(), s);
            prop_assert!(path_cost(&grid, &path).is_some(), "hpa path has a non-edge step");
        }
    }

    #[test]
    fn test_hpa_agrees_after_edit(
        walls in walls_strategy(),
        edits in prop::collection::vec(cell_strategy(), 1..6),
        s in cell_strategy(),
        g in cell_strategy(),
    ) {
        let mut grid = walled_grid(&walls);
        let mut pf = Pathfinder::new();
        pf.build_graph(&mut grid);
        for p in edits {
            let kind = if grid.kind(p) == CellKind::Wall { CellKind::Air } else { CellKind::Wall };
            grid.set_kind(p, kind);
        }
        // One rebuild must be enough.
        pf.build_graph(&mut grid);
        let flat = pf.find(&grid, s, g, PathAlgorithm::AStar);
        let hpa = pf.find(&grid, s, g, PathAlgorithm::Hpa);
        prop_assert_eq!(flat.is_some(), hpa.is_some());
    }
}

#[test]
fn test_truncated_long_path_starts_at_mover() {
    // A serpentine corridor long enough to exceed the mover path cap.
    let (w, h) = (64, 64);
    let mut grid = Grid::new(w, h, 1);
    for y in (1..h).step_by(2) {
        for x in 0..w {
            let gap = if (y / 2) % 2 == 0 { w - 1 } else { 0 };
            if x != gap {
                grid.set_kind(CellPos::new(x, y, 0), CellKind::Wall);
            }
        }
    }
    let start = CellPos::new(0, 0, 0);
    let goal = CellPos::new(0, h - 2, 0);
    let mut path = astar(&grid, start, goal).expect("corridor is connected").path;
    assert!(path.len() > MAX_MOVER_PATH);
    truncate_path(&mut path);
    assert_eq!(path.len(), MAX_MOVER_PATH);
    assert_eq!(path[path.len() - 1], start);
}

#[test]
fn test_multi_level_hpa_matches_astar_reachability() {
    let mut grid = Grid::with_chunks(16, 16, 2, 8, 8);
    let ladder = (12, 12);
    for y in 0..16 {
        for x in 0..16 {
            if (x, y) != ladder {
                grid.set_floor(CellPos::new(x, y, 1), true);
            }
        }
    }
    grid.set_kind(CellPos::new(ladder.0, ladder.1, 0), CellKind::LadderUp);
    grid.set_kind(CellPos::new(ladder.0, ladder.1, 1), CellKind::LadderDown);
    let mut pf = Pathfinder::new();
    pf.build_graph(&mut grid);
    let s = CellPos::new(1, 1, 0);
    let g = CellPos::new(2, 2, 1);
    let flat = astar(&grid, s, g).expect("ladder connects levels");
    let hpa = pf.find(&grid, s, g, PathAlgorithm::Hpa).expect("hpa finds the ladder");
    assert!(hpa.contains(&CellPos::new(ladder.0, ladder.1, 1)));
    assert!(path_cost(&grid, &hpa).unwrap() >= flat.cost);
}
