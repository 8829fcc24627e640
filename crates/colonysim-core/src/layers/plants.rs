//! Grass, saplings and berry bushes.

use colonysim_logic::constants::layers::TRAMPLE_RECOVER_CHANCE;
use colonysim_logic::constants::plants::{
    BUSH_GROWTH_STEP, GRASS_GROW_CHANCE, SAPLING_GROWTH_STEP, SAPLING_MATURE, TREE_HEIGHT,
};
use colonysim_logic::items::MaterialType;
use rand::Rng;

use crate::common::CellPos;
use crate::engine::Sim;
use crate::world::{self, CellKind, Vegetation};

pub fn plants_tick(sim: &mut Sim) {
    let mut mature = Vec::new();
    for i in 0..sim.grid.cell_count() {
        let p = sim.grid.pos_of(i);
        match sim.grid.kind(p) {
            CellKind::Sapling => {
                let g = sim.grid.growth(p).saturating_add(SAPLING_GROWTH_STEP);
                sim.grid.set_growth(p, g);
                if g >= SAPLING_MATURE {
                    mature.push(p);
                }
            }
            CellKind::Bush => {
                let g = sim.grid.growth(p).saturating_add(BUSH_GROWTH_STEP);
                sim.grid.set_growth(p, g);
            }
            CellKind::Air if is_soil(sim, p) => grow_grass(sim, p),
            _ => {}
        }
    }
    for p in mature {
        grow_tree(sim, p);
    }
    trample(sim);
}

/// Bare ground: air on the bottom level or on natural rock, not a built floor.
fn is_soil(sim: &Sim, p: CellPos) -> bool {
    !sim.grid.has_floor(p) && (p.z == 0 || sim.grid.is_solid(p.offset(0, 0, -1)))
}

fn grow_grass(sim: &mut Sim, p: CellPos) {
    if sim.grid.is_trampled(p) {
        if sim.rng.gen::<f32>() < TRAMPLE_RECOVER_CHANCE {
            sim.grid.set_trampled(p, false);
        }
        return;
    }
    let v = sim.grid.vegetation(p);
    let burned = sim.grid.is_burned(p);
    // Only cells that already carry grass, or its ashes, grow any.
    if v == Vegetation::None && !burned {
        return;
    }
    if sim.rng.gen::<f32>() >= GRASS_GROW_CHANCE {
        return;
    }
    if burned {
        sim.grid.set_burned(p, false);
        sim.grid.set_vegetation(p, Vegetation::Short);
    } else {
        sim.grid.set_vegetation(p, v.grow());
    }
}

/// Movers flatten tall grass under them.
fn trample(sim: &mut Sim) {
    let cells: Vec<CellPos> = sim.movers.iter().map(|(_, m)| m.cell()).collect();
    for p in cells {
        if sim.grid.kind(p) != CellKind::Air {
            continue;
        }
        if sim.grid.vegetation(p) > Vegetation::Short {
            sim.grid.set_vegetation(p, Vegetation::Short);
        }
        if sim.grid.vegetation(p) != Vegetation::None {
            sim.grid.set_trampled(p, true);
        }
    }
}

/// Replace a mature sapling with a trunk column capped by leaves.
fn grow_tree(sim: &mut Sim, p: CellPos) {
    let material = match sim.grid.material(p) {
        MaterialType::None => MaterialType::Oak,
        m => m,
    };
    sim.grid.set_growth(p, 0);
    if let Err(e) = world::place_cell(sim, p, CellKind::TreeTrunk, material) {
        log::warn!("sapling at {} could not grow: {}", p, e);
        return;
    }
    let mut top = p;
    for h in 1..TREE_HEIGHT {
        let q = p.offset(0, 0, h);
        if !sim.grid.in_bounds(q) || sim.grid.kind(q) != CellKind::Air {
            break;
        }
        if world::place_cell(sim, q, CellKind::TreeTrunk, material).is_err() {
            break;
        }
        top = q;
    }
    let crown = top.offset(0, 0, 1);
    if sim.grid.in_bounds(crown) && sim.grid.kind(crown) == CellKind::Air {
        let _ = world::place_cell(sim, crown, CellKind::TreeLeaves, material);
    }
    log::debug!("tree grew at {}", p);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movers::spawn_mover;
    use colonysim_logic::config::SimFlags;
    use colonysim_logic::constants::plants::BERRY_RIPE;

    #[test]
    fn test_sapling_becomes_tree() {
        let mut sim = Sim::new(3, 3, 5, 1, SimFlags::deterministic_test());
        let p = CellPos::new(1, 1, 0);
        world::place_cell(&mut sim, p, CellKind::Sapling, MaterialType::Pine).unwrap();
        let updates = (SAPLING_MATURE / SAPLING_GROWTH_STEP) as usize + 1;
        for _ in 0..updates {
            plants_tick(&mut sim);
        }
        assert_eq!(sim.grid.kind(p), CellKind::TreeTrunk);
        assert_eq!(sim.grid.material(p), MaterialType::Pine);
        assert_eq!(sim.grid.kind(p.offset(0, 0, TREE_HEIGHT - 1)), CellKind::TreeTrunk);
        assert_eq!(sim.grid.kind(p.offset(0, 0, TREE_HEIGHT)), CellKind::TreeLeaves);
    }

    #[test]
    fn test_bush_ripens() {
        let mut sim = Sim::new(3, 3, 1, 1, SimFlags::deterministic_test());
        let p = CellPos::new(1, 1, 0);
        sim.grid.set_kind(p, CellKind::Bush);
        let updates = (BERRY_RIPE / BUSH_GROWTH_STEP) as usize + 1;
        for _ in 0..updates {
            plants_tick(&mut sim);
        }
        assert!(sim.grid.growth(p) >= BERRY_RIPE);
    }

    #[test]
    fn test_grass_grows_and_is_trampled() {
        let mut sim = Sim::new(4, 4, 1, 1, SimFlags::deterministic_test());
        let p = CellPos::new(1, 1, 0);
        sim.grid.set_vegetation(p, Vegetation::Short);
        for _ in 0..500 {
            plants_tick(&mut sim);
        }
        assert_eq!(sim.grid.vegetation(p), Vegetation::Taller);
        assert_eq!(sim.grid.vegetation(CellPos::new(3, 3, 0)), Vegetation::None);

        spawn_mover(&mut sim, p).unwrap();
        plants_tick(&mut sim);
        assert_eq!(sim.grid.vegetation(p), Vegetation::Short);
        assert!(sim.grid.is_trampled(p));
    }
}
