//! Water: falls first, then levels out with lower 4-neighbours.

use colonysim_logic::constants::layers::{DRYING_CHANCE, EVAPORATION_CHANCE, WATER_MAX};
use rand::Rng;

use crate::common::Direction;
use crate::engine::Sim;

pub fn fluid_tick(sim: &mut Sim) {
    let g = &mut sim.grid;
    // Bottom level first so a column drops one level per update.
    for i in 0..g.cell_count() {
        if g.water[i] == 0 {
            continue;
        }
        let p = g.pos_of(i);
        let below = p.offset(0, 0, -1);
        if let Some(j) = g.idx(below) {
            if !g.has_floor(p) && !g.is_solid(below) {
                let moved = g.water[i].min(WATER_MAX.saturating_sub(g.water[j]));
                g.water[j] += moved;
                g.water[i] -= moved;
            }
        }
        for d in Direction::ALL {
            let (dx, dy) = d.delta();
            let q = p.offset(dx, dy, 0);
            let Some(j) = g.idx(q) else {
                continue;
            };
            if g.is_solid(q) {
                continue;
            }
            if g.water[i] > g.water[j] + 1 {
                g.water[i] -= 1;
                g.water[j] += 1;
            }
        }
    }

    for i in 0..sim.grid.cell_count() {
        let p = sim.grid.pos_of(i);
        match sim.grid.water[i] {
            0 => {
                let wet = sim.grid.wetness(p);
                if wet > 0 && sim.rng.gen::<f32>() < DRYING_CHANCE {
                    sim.grid.set_wetness(p, wet - 1);
                }
            }
            level => {
                sim.grid.set_wetness(p, 3);
                if level == 1 && sim.rng.gen::<f32>() < EVAPORATION_CHANCE {
                    sim.grid.water[i] = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CellPos;
    use crate::world::CellKind;
    use colonysim_logic::config::SimFlags;

    #[test]
    fn test_water_falls_before_spreading() {
        let mut sim = Sim::new(5, 5, 3, 1, SimFlags::deterministic_test());
        let top = CellPos::new(2, 2, 2);
        sim.grid.set_water(top, 3);
        fluid_tick(&mut sim);
        assert_eq!(sim.grid.water(top), 0);
        assert_eq!(sim.grid.water(CellPos::new(2, 2, 1)), 3);
        assert_eq!(sim.grid.water(CellPos::new(1, 2, 2)), 0);
    }

    #[test]
    fn test_floor_holds_water_that_spreads() {
        let mut sim = Sim::new(5, 1, 2, 1, SimFlags::deterministic_test());
        for x in 0..5 {
            sim.grid.set_floor(CellPos::new(x, 0, 1), true);
        }
        sim.grid.set_water(CellPos::new(0, 0, 1), 6);
        for _ in 0..20 {
            fluid_tick(&mut sim);
        }
        assert_eq!(sim.grid.water(CellPos::new(0, 0, 0)), 0);
        let levels: Vec<u8> = (0..5).map(|x| sim.grid.water(CellPos::new(x, 0, 1))).collect();
        assert!(levels[0] < 6, "levels {:?}", levels);
        assert!(levels.iter().map(|l| *l as u32).sum::<u32>() <= 6);
    }

    #[test]
    fn test_walls_block_flow() {
        let mut sim = Sim::new(3, 1, 1, 1, SimFlags::deterministic_test());
        sim.grid.set_kind(CellPos::new(1, 0, 0), CellKind::Wall);
        sim.grid.set_water(CellPos::new(0, 0, 0), 5);
        for _ in 0..5 {
            fluid_tick(&mut sim);
        }
        assert_eq!(sim.grid.water(CellPos::new(1, 0, 0)), 0);
        assert_eq!(sim.grid.water(CellPos::new(2, 0, 0)), 0);
    }
}
