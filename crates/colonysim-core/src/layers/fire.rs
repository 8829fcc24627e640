//! Fire: burns vegetation, trees, bushes, doors and flammable ground items.
//!
//! A burning cell grows hotter while it has fuel, may ignite its 4-neighbours
//! and the cell above, and sooner or later eats its fuel, leaving the burned
//! bit behind. Water on the cell puts it out.

use colonysim_logic::constants::layers::{
    FIRE_CONSUME_CHANCE, FIRE_IGNITE_LEVEL, FIRE_MAX, FIRE_SPREAD_CHANCE, SMOKE_FROM_FIRE,
};
use colonysim_logic::items::{flags, MaterialType};
use rand::Rng;

use crate::common::{CellPos, Direction};
use crate::engine::Sim;
use crate::jobs::cancel_jobs_for_item;
use crate::world::{self, CellKind, Grid, Vegetation};

fn has_fuel(g: &Grid, p: CellPos) -> bool {
    let kind = g.kind(p);
    kind.is_flammable() || (kind == CellKind::Air && g.vegetation(p) != Vegetation::None)
}

/// Set `p` alight. Refused on cells without fuel or with standing water.
pub fn ignite(sim: &mut Sim, p: CellPos) -> bool {
    if !sim.grid.in_bounds(p) || !has_fuel(&sim.grid, p) || sim.grid.water(p) > 0 {
        return false;
    }
    if sim.grid.fire(p) == 0 {
        sim.grid.set_fire(p, FIRE_IGNITE_LEVEL);
    }
    true
}

pub fn fire_tick(sim: &mut Sim) {
    for s in sim.grid.smoke.iter_mut() {
        *s = s.saturating_sub(1);
    }
    let burning: Vec<CellPos> = (0..sim.grid.cell_count())
        .filter(|i| sim.grid.fire[*i] > 0)
        .map(|i| sim.grid.pos_of(i))
        .collect();

    for p in burning {
        if sim.grid.water(p) > 0 {
            sim.grid.set_fire(p, 0);
            sim.grid.set_smoke(p, SMOKE_FROM_FIRE);
            continue;
        }
        if !has_fuel(&sim.grid, p) {
            let level = sim.grid.fire(p);
            sim.grid.set_fire(p, level - 1);
            continue;
        }
        let level = (sim.grid.fire(p) + 1).min(FIRE_MAX);
        sim.grid.set_fire(p, level);
        let above = p.offset(0, 0, 1);
        let smoke_at = if sim.grid.in_bounds(above) { above } else { p };
        let smoke = sim.grid.smoke(smoke_at).max(SMOKE_FROM_FIRE);
        sim.grid.set_smoke(smoke_at, smoke);

        burn_items(sim, p);

        let mut targets: Vec<CellPos> = Direction::ALL
            .iter()
            .map(|d| {
                let (dx, dy) = d.delta();
                p.offset(dx, dy, 0)
            })
            .collect();
        targets.push(above);
        for q in targets {
            if sim.grid.in_bounds(q) && sim.grid.fire(q) == 0 && sim.rng.gen::<f32>() < FIRE_SPREAD_CHANCE {
                ignite(sim, q);
            }
        }

        if sim.rng.gen::<f32>() < FIRE_CONSUME_CHANCE {
            consume_fuel(sim, p);
        }
    }
}

fn consume_fuel(sim: &mut Sim, p: CellPos) {
    if sim.grid.kind(p).is_flammable() {
        if let Err(e) = world::place_cell(sim, p, CellKind::Air, MaterialType::None) {
            log::warn!("fire could not clear {}: {}", p, e);
        }
    }
    sim.grid.set_vegetation(p, Vegetation::None);
    sim.grid.set_burned(p, true);
}

fn burn_items(sim: &mut Sim, p: CellPos) {
    let doomed: Vec<_> = sim
        .items
        .ground_items_at(p)
        .into_iter()
        .filter(|id| {
            sim.items
                .get(*id)
                .is_some_and(|it| it.item_type.has_flag(flags::FLAMMABLE) || it.material.is_flammable())
        })
        .collect();
    for id in doomed {
        cancel_jobs_for_item(sim, id);
        if let Some(it) = sim.items.delete_item(id) {
            log::debug!("{} burned at {}", it.item_type.name(), p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colonysim_logic::config::SimFlags;
    use colonysim_logic::items::ItemType;

    fn grassy(w: i32, h: i32) -> Sim {
        let mut sim = Sim::new(w, h, 1, 11, SimFlags::deterministic_test());
        for y in 0..h {
            for x in 0..w {
                sim.grid.set_vegetation(CellPos::new(x, y, 0), Vegetation::Normal);
            }
        }
        sim
    }

    #[test]
    fn test_bare_ground_will_not_light() {
        let mut sim = Sim::new(4, 4, 1, 1, SimFlags::deterministic_test());
        assert!(!ignite(&mut sim, CellPos::new(1, 1, 0)));
        assert_eq!(sim.grid.fire(CellPos::new(1, 1, 0)), 0);
    }

    #[test]
    fn test_water_puts_fire_out() {
        let mut sim = grassy(4, 4);
        let p = CellPos::new(1, 1, 0);
        assert!(ignite(&mut sim, p));
        sim.grid.set_water(p, 2);
        fire_tick(&mut sim);
        assert_eq!(sim.grid.fire(p), 0);
        assert!(sim.grid.smoke(p) > 0);
    }

    #[test]
    fn test_fire_spreads_through_grass_and_burns_out() {
        let mut sim = grassy(8, 8);
        ignite(&mut sim, CellPos::new(4, 4, 0));
        for _ in 0..400 {
            fire_tick(&mut sim);
        }
        let burned = (0..8)
            .flat_map(|y| (0..8).map(move |x| CellPos::new(x, y, 0)))
            .filter(|p| sim.grid.is_burned(*p))
            .count();
        assert!(burned > 1, "fire never spread");
        let still_burning = (0..sim.grid.cell_count()).filter(|i| sim.grid.fire[*i] > 0).count();
        assert_eq!(still_burning, 0);
    }

    #[test]
    fn test_fire_destroys_flammable_items_only() {
        let mut sim = grassy(4, 4);
        let p = CellPos::new(2, 2, 0);
        let planks = sim.items.spawn_default(ItemType::Planks, p, 2).unwrap();
        let rock = sim.items.spawn_default(ItemType::Rock, p, 1).unwrap();
        ignite(&mut sim, p);
        fire_tick(&mut sim);
        assert!(!sim.items.contains(planks));
        assert!(sim.items.contains(rock));
    }
}
