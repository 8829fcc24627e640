//! Planting seeds and harvesting bushes and tall grass.

use colonysim_logic::constants::jobs::{HARVEST_WORK_TIME, MAX_CANDIDATES_PER_WORKGIVER, PLANT_WORK_TIME};
use colonysim_logic::constants::plants::{BERRY_RIPE, BERRY_YIELD};
use colonysim_logic::items::{ItemType, MaterialType};

use super::common::{
    adjacent_spots, clear_carrying, consume_claim, is_available, item_site, mark_unreachable, pick_up, reachable_spot,
    walk, work_speed,
};
use super::{start_job, Claim, JobId, JobKind, JobRun, Step};
use crate::common::CellPos;
use crate::engine::Sim;
use crate::items::{ItemId, ItemState};
use crate::movers::MoverId;
use crate::world::{self, find_safe_drop_cell, CellKind, Designation, Vegetation};

/// Whether a harvest designation has something to pick right now.
pub(crate) fn is_harvestable(sim: &Sim, cell: CellPos) -> bool {
    match sim.grid.kind(cell) {
        CellKind::Bush => sim.grid.growth(cell) >= BERRY_RIPE,
        CellKind::Air => sim.grid.vegetation(cell) >= Vegetation::Tall,
        _ => false,
    }
}

fn tick_work(sim: &mut Sim, id: JobId, mover: MoverId, work_time: f32, dt: f32) -> Option<JobRun> {
    let Some(speed) = work_speed(sim, mover, None) else {
        return Some(JobRun::Cancel);
    };
    let job = sim.jobs.get_mut(id)?;
    job.step = Step::Working;
    job.progress += dt * speed / work_time;
    if job.progress < 1.0 {
        Some(JobRun::Running)
    } else {
        None
    }
}

pub(super) fn run_plant(
    sim: &mut Sim,
    id: JobId,
    mover: MoverId,
    cell: CellPos,
    spot: CellPos,
    seed: ItemId,
    dt: f32,
) -> JobRun {
    if sim.grid.designation(cell) != Designation::Plant {
        return JobRun::Cancel;
    }
    let Some(step) = sim.jobs.get(id).map(|j| j.step) else {
        return JobRun::Cancel;
    };
    if step == Step::ToItem {
        let Some(site) = item_site(sim, seed) else {
            return JobRun::Cancel;
        };
        match walk(sim, mover, site) {
            None => {}
            Some(JobRun::Cancel) => {
                mark_unreachable(sim, seed);
                return JobRun::Cancel;
            }
            Some(r) => return r,
        }
        if pick_up(sim, id, mover, seed, Some(1)).is_none() {
            return JobRun::Cancel;
        }
        if let Some(job) = sim.jobs.get_mut(id) {
            job.step = Step::ToTarget;
        }
        return JobRun::Running;
    }
    if let Some(r) = walk(sim, mover, spot) {
        return r;
    }
    if let Some(r) = tick_work(sim, id, mover, PLANT_WORK_TIME, dt) {
        return r;
    }
    let Some(carried) = sim.jobs.get(id).and_then(|j| j.carrying) else {
        return JobRun::Cancel;
    };
    clear_carrying(sim, id);
    sim.items.delete_item(carried);
    sim.grid.set_designation_raw(cell, Designation::None);
    consume_claim(sim, id, Claim::Designation(cell));
    if let Err(e) = world::place_cell(sim, cell, CellKind::Sapling, MaterialType::Oak) {
        log::warn!("planting at {} failed: {}", cell, e);
    }
    sim.grid.set_growth(cell, 0);
    JobRun::Done
}

pub(super) fn run_harvest(sim: &mut Sim, id: JobId, mover: MoverId, cell: CellPos, spot: CellPos, dt: f32) -> JobRun {
    if sim.grid.designation(cell) != Designation::Harvest || !is_harvestable(sim, cell) {
        return JobRun::Cancel;
    }
    if let Some(r) = walk(sim, mover, spot) {
        return r;
    }
    if let Some(r) = tick_work(sim, id, mover, HARVEST_WORK_TIME, dt) {
        return r;
    }
    sim.grid.set_designation_raw(cell, Designation::None);
    consume_claim(sim, id, Claim::Designation(cell));
    let at = find_safe_drop_cell(&sim.grid, cell);
    if sim.grid.kind(cell) == CellKind::Bush {
        sim.grid.set_growth(cell, 0);
        sim.items.spawn_default(ItemType::Berries, at, BERRY_YIELD);
    } else {
        sim.grid.set_vegetation(cell, Vegetation::None);
        sim.items.spawn_default(ItemType::Fiber, at, 1);
        sim.items.spawn_default(ItemType::Seeds, at, 1);
    }
    JobRun::Done
}

fn open_designations(sim: &Sim, d: Designation, at: CellPos) -> Vec<CellPos> {
    let mut cells: Vec<CellPos> = sim
        .grid
        .designated_cells()
        .filter(|(p, dd)| *dd == d && !sim.grid.designation_claimed(*p))
        .map(|(p, _)| p)
        .collect();
    cells.sort_by_key(|p| p.dist_sq_weighted(&at));
    cells
}

fn work_spots_for(sim: &Sim, cell: CellPos) -> Vec<CellPos> {
    if sim.grid.is_walkable(cell) {
        vec![cell]
    } else {
        adjacent_spots(sim, cell)
    }
}

pub(super) fn give_harvest(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    let cells: Vec<CellPos> = open_designations(sim, Designation::Harvest, at)
        .into_iter()
        .filter(|p| is_harvestable(sim, *p))
        .take(MAX_CANDIDATES_PER_WORKGIVER)
        .collect();
    for cell in cells {
        let spots = work_spots_for(sim, cell);
        let Some(spot) = reachable_spot(sim, at, spots) else {
            continue;
        };
        sim.grid.set_designation_claimed(cell, true);
        if start_job(sim, mover, JobKind::Harvest { cell, spot }, vec![Claim::Designation(cell)]).is_some() {
            return true;
        }
    }
    false
}

fn nearest_seed(sim: &Sim, at: CellPos) -> Option<ItemId> {
    sim.items
        .iter()
        .filter(|(id, it)| {
            it.item_type == ItemType::Seeds
                && matches!(it.state, ItemState::OnGround | ItemState::InStockpile)
                && is_available(sim, *id)
        })
        .min_by_key(|(id, it)| (it.cell().dist_sq_weighted(&at), crate::items::slot_index(*id)))
        .map(|(id, _)| id)
}

pub(super) fn give_plant(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    let cells = open_designations(sim, Designation::Plant, at);
    if cells.is_empty() {
        return false;
    }
    let Some(seed) = nearest_seed(sim, at) else {
        return false;
    };
    let Some(seed_cell) = sim.items.get(seed).map(|it| it.cell()) else {
        return false;
    };
    if !crate::path::is_reachable(sim, at, seed_cell) {
        mark_unreachable(sim, seed);
        return false;
    }
    for cell in cells.into_iter().take(MAX_CANDIDATES_PER_WORKGIVER) {
        let spots: Vec<CellPos> = adjacent_spots(sim, cell).into_iter().filter(|p| *p != cell).collect();
        let Some(spot) = reachable_spot(sim, seed_cell, spots) else {
            continue;
        };
        sim.grid.set_designation_claimed(cell, true);
        if let Some(it) = sim.items.get_mut(seed) {
            it.reserved_by = Some(mover);
        }
        let kind = JobKind::Plant { cell, spot, seed };
        if start_job(sim, mover, kind, vec![Claim::Item(seed), Claim::Designation(cell)]).is_some() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movers::spawn_mover;
    use colonysim_logic::config::SimFlags;

    fn run(sim: &mut Sim, ticks: usize) {
        for _ in 0..ticks {
            sim.tick();
        }
    }

    #[test]
    fn test_unripe_bush_is_skipped() {
        let mut sim = Sim::new(10, 10, 1, 4, SimFlags::deterministic_test());
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let bush = CellPos::new(5, 5, 0);
        sim.grid.set_kind(bush, CellKind::Bush);
        world::designate(&mut sim, bush, Designation::Harvest).unwrap();
        run(&mut sim, 30);
        assert!(sim.movers.get(m).unwrap().is_idle());
        assert!(!sim.grid.designation_claimed(bush));
    }

    #[test]
    fn test_ripe_bush_yields_berries() {
        let mut sim = Sim::new(10, 10, 1, 4, SimFlags::deterministic_test());
        spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let bush = CellPos::new(5, 5, 0);
        sim.grid.set_kind(bush, CellKind::Bush);
        sim.grid.set_growth(bush, BERRY_RIPE);
        world::designate(&mut sim, bush, Designation::Harvest).unwrap();
        run(&mut sim, 800);
        let berries: u32 = sim
            .items
            .iter()
            .filter(|(_, it)| it.item_type == ItemType::Berries)
            .map(|(_, it)| it.stack_count)
            .sum();
        assert_eq!(berries, BERRY_YIELD);
        assert_eq!(sim.grid.growth(bush), 0);
    }

    #[test]
    fn test_plant_uses_one_seed() {
        let mut sim = Sim::new(10, 10, 1, 4, SimFlags::deterministic_test());
        spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let seeds = sim.items.spawn_default(ItemType::Seeds, CellPos::new(2, 2, 0), 3).unwrap();
        let plot = CellPos::new(7, 7, 0);
        world::designate(&mut sim, plot, Designation::Plant).unwrap();
        run(&mut sim, 1000);
        assert_eq!(sim.grid.kind(plot), CellKind::Sapling);
        assert_eq!(sim.items.get(seeds).unwrap().stack_count, 2);
        assert_eq!(sim.items.get(seeds).unwrap().reserved_by, None);
    }
}
