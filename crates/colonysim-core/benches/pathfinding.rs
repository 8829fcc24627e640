use colonysim_core::common::CellPos;
use colonysim_core::path::{astar, Pathfinder};
use colonysim_core::world::{CellKind, Grid};
use colonysim_logic::config::PathAlgorithm;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// 128x128 level with offset wall bands so paths have to weave.
fn banded_grid() -> Grid {
    let mut grid = Grid::new(128, 128, 1);
    for y in (8..128).step_by(16) {
        let gap = if (y / 16) % 2 == 0 { 120 } else { 4 };
        for x in 0..128 {
            if (x - gap as i32).abs() > 1 {
                grid.set_kind(CellPos::new(x, y, 0), CellKind::Wall);
            }
        }
    }
    grid
}

fn bench_astar(c: &mut Criterion) {
    let grid = banded_grid();
    let (start, goal) = (CellPos::new(1, 1, 0), CellPos::new(126, 126, 0));
    c.bench_function("astar_128_banded", |b| b.iter(|| black_box(astar(&grid, start, goal))));
}

fn bench_hpa(c: &mut Criterion) {
    let mut grid = banded_grid();
    let mut pf = Pathfinder::new();
    pf.build_graph(&mut grid);
    let (start, goal) = (CellPos::new(1, 1, 0), CellPos::new(126, 126, 0));
    c.bench_function("hpa_128_banded", |b| {
        b.iter(|| black_box(pf.find(&grid, start, goal, PathAlgorithm::Hpa)))
    });

    c.bench_function("hpa_rebuild_one_chunk", |b| {
        let mut toggle = false;
        b.iter(|| {
            toggle = !toggle;
            let kind = if toggle { CellKind::Wall } else { CellKind::Air };
            grid.set_kind(CellPos::new(64, 60, 0), kind);
            pf.build_graph(&mut grid);
        })
    });
}

criterion_group!(benches, bench_astar, bench_hpa);
criterion_main!(benches);
