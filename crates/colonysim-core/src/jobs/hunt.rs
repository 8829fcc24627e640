//! Hunting marked animals and butchering the carcasses.

use colonysim_logic::constants::jobs::{
    BUTCHER_WORK_TIME, CARCASS_HIDE_YIELD, CARCASS_MEAT_YIELD, HUNT_STRIKE_RANGE, MAX_CANDIDATES_PER_WORKGIVER,
};
use colonysim_logic::items::{ItemType, ToolQuality};

use super::common::{consume_claim, item_site, mark_unreachable, nearest_item, walk, work_speed};
use super::{start_job, Claim, JobId, JobKind, JobRun, Step};
use crate::common::CellPos;
use crate::engine::Sim;
use crate::fixtures::FixtureKey;
use crate::items::{ItemId, ItemState};
use crate::movers::MoverId;
use crate::path;
use crate::world::find_safe_drop_cell;

/// Chase the animal and strike once in range. The carcass is left where
/// it fell for a butcher to pick up.
pub(super) fn run_hunt(sim: &mut Sim, id: JobId, mover: MoverId, animal: FixtureKey) -> JobRun {
    let Some(a) = sim.fixtures.animal(animal) else {
        return JobRun::Cancel;
    };
    if a.hunted_by != Some(mover) {
        return JobRun::Cancel;
    }
    let Some(pos) = sim.movers.get(mover).map(|m| m.pos) else {
        return JobRun::Cancel;
    };
    let target = a.cell();
    if target.z == pos.cell().z && pos.distance_xy(&a.pos) <= HUNT_STRIKE_RANGE {
        consume_claim(sim, id, Claim::Animal(animal));
        sim.fixtures.remove(&mut sim.grid, animal);
        let at = find_safe_drop_cell(&sim.grid, target);
        sim.items.spawn_default(ItemType::Carcass, at, 1);
        log::debug!("{} killed at {}", a.kind.def().name, target);
        return JobRun::Done;
    }
    if let Some(job) = sim.jobs.get_mut(id) {
        job.step = Step::ToTarget;
    }
    match walk(sim, mover, target) {
        // Arrived on the cell but the animal slipped out of range; keep chasing.
        None => JobRun::Running,
        Some(r) => r,
    }
}

pub(super) fn run_butcher(sim: &mut Sim, id: JobId, mover: MoverId, carcass: ItemId, dt: f32) -> JobRun {
    let Some(site) = item_site(sim, carcass) else {
        return JobRun::Cancel;
    };
    if sim.items.get(carcass).map(|it| it.state) != Some(ItemState::OnGround) {
        return JobRun::Cancel;
    }
    match walk(sim, mover, site) {
        None => {}
        Some(JobRun::Cancel) => {
            mark_unreachable(sim, carcass);
            return JobRun::Cancel;
        }
        Some(r) => return r,
    }
    let Some(speed) = work_speed(sim, mover, Some(ToolQuality::Butchering)) else {
        return JobRun::Cancel;
    };
    let Some(job) = sim.jobs.get_mut(id) else {
        return JobRun::Cancel;
    };
    job.step = Step::Working;
    job.progress += dt * speed / BUTCHER_WORK_TIME;
    if job.progress < 1.0 {
        return JobRun::Running;
    }
    consume_claim(sim, id, Claim::Item(carcass));
    sim.items.delete_item(carcass);
    sim.items.spawn_default(ItemType::RawMeat, site, CARCASS_MEAT_YIELD);
    sim.items.spawn_default(ItemType::Hide, site, CARCASS_HIDE_YIELD);
    JobRun::Done
}

pub(super) fn give_hunt(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    let mut prey: Vec<(i64, FixtureKey)> = sim
        .fixtures
        .animal_list()
        .into_iter()
        .filter(|(_, a)| a.marked && a.hunted_by.is_none())
        .map(|(k, a)| (a.cell().dist_sq_weighted(&at), k))
        .collect();
    prey.sort_by_key(|(d, k)| (*d, k.0));
    for (_, key) in prey.into_iter().take(MAX_CANDIDATES_PER_WORKGIVER) {
        let Some(cell) = sim.fixtures.animal(key).map(|a| a.cell()) else {
            continue;
        };
        if !path::is_reachable(sim, at, cell) {
            continue;
        }
        sim.fixtures.with_animal(key, |a| a.hunted_by = Some(mover));
        if start_job(sim, mover, JobKind::Hunt { animal: key }, vec![Claim::Animal(key)]).is_some() {
            return true;
        }
    }
    false
}

pub(super) fn give_butcher(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    if work_speed(sim, mover, Some(ToolQuality::Butchering)).is_none() {
        return false;
    }
    let Some(carcass) = nearest_item(sim, at, |_, it| {
        it.item_type == ItemType::Carcass && it.state == ItemState::OnGround
    }) else {
        return false;
    };
    let Some(site) = item_site(sim, carcass) else {
        return false;
    };
    if !path::is_reachable(sim, at, site) {
        mark_unreachable(sim, carcass);
        return false;
    }
    if let Some(it) = sim.items.get_mut(carcass) {
        it.reserved_by = Some(mover);
    }
    start_job(sim, mover, JobKind::Butcher { carcass }, vec![Claim::Item(carcass)]).is_some()
}
