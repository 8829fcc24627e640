//! Per-cell temperature relaxing toward its surroundings.

use colonysim_logic::constants::layers::{FIRE_HEAT, FIRE_MAX, TEMPERATURE_RELAX, UNDERGROUND_TEMP};

use crate::common::CellPos;
use crate::engine::Sim;

/// Temperature a cell drifts toward: the weather's ambient under open sky,
/// a steady underground value otherwise, plus heat from any fire on it.
fn target(ambient: i16, exposed: bool, fire: u8) -> i16 {
    let base = if exposed { ambient } else { UNDERGROUND_TEMP };
    base + FIRE_HEAT * fire as i16 / FIRE_MAX as i16
}

fn relax(current: i16, target: i16) -> i16 {
    let diff = target - current;
    if diff == 0 {
        return current;
    }
    let step = (diff as f32 * TEMPERATURE_RELAX).round() as i16;
    current + if step == 0 { diff.signum() } else { step }
}

pub fn temperature_tick(sim: &mut Sim) {
    let ambient = sim.layers.weather.ambient;
    let g = &mut sim.grid;
    for y in 0..g.height {
        for x in 0..g.width {
            // Walk the column top-down so exposure is one pass.
            let mut covered = false;
            for z in (0..g.depth).rev() {
                let p = CellPos::new(x, y, z);
                let Some(i) = g.idx(p) else {
                    continue;
                };
                g.temp[i] = relax(g.temp[i], target(ambient, !covered, g.fire[i]));
                covered |= g.is_solid(p) || g.has_floor(p);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{CellKind, DEFAULT_TEMP};
    use colonysim_logic::config::SimFlags;

    #[test]
    fn test_relax_always_moves() {
        assert_eq!(relax(10, 11), 11);
        assert_eq!(relax(10, 9), 9);
        assert_eq!(relax(0, 50), 10);
        assert_eq!(relax(5, 5), 5);
    }

    #[test]
    fn test_fire_heats_its_cell() {
        let mut sim = Sim::new(3, 3, 1, 1, SimFlags::deterministic_test());
        let p = CellPos::new(1, 1, 0);
        sim.grid.set_fire(p, 7);
        for _ in 0..30 {
            temperature_tick(&mut sim);
        }
        assert!(sim.grid.temperature(p) > DEFAULT_TEMP + 30);
        assert_eq!(sim.grid.temperature(CellPos::new(0, 0, 0)), sim.layers.weather.ambient);
    }

    #[test]
    fn test_roofed_cells_follow_underground_temp() {
        let mut sim = Sim::new(2, 1, 2, 1, SimFlags::deterministic_test());
        sim.layers.weather.ambient = -10;
        sim.grid.set_kind(CellPos::new(0, 0, 1), CellKind::Wall);
        for _ in 0..50 {
            temperature_tick(&mut sim);
        }
        assert_eq!(sim.grid.temperature(CellPos::new(0, 0, 0)), UNDERGROUND_TEMP);
        assert_eq!(sim.grid.temperature(CellPos::new(1, 0, 0)), -10);
    }
}
