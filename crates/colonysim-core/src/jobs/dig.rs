//! Mining, channelling, ramp digging and tree chopping.

use colonysim_logic::constants::jobs::{CHOP_WORK_TIME, MAX_CANDIDATES_PER_WORKGIVER, MINE_WORK_TIME};
use colonysim_logic::items::{ItemType, MaterialType, ToolQuality};

use super::common::{adjacent_spots, consume_claim, reachable_spot, walk, work_speed};
use super::{start_job, Claim, JobId, JobKind, JobRun, Step};
use crate::common::CellPos;
use crate::engine::Sim;
use crate::movers::MoverId;
use crate::world::{self, find_safe_drop_cell, valid_ramp_dirs, CellKind, Designation};

fn designation_of(kind: &JobKind) -> Option<Designation> {
    match kind {
        JobKind::Mine { .. } => Some(Designation::Mine),
        JobKind::Channel { .. } => Some(Designation::Channel),
        JobKind::DigRamp { .. } => Some(Designation::DigRamp),
        JobKind::Chop { .. } => Some(Designation::Chop),
        _ => None,
    }
}

fn quality_for(d: Designation) -> ToolQuality {
    if d == Designation::Chop {
        ToolQuality::Cutting
    } else {
        ToolQuality::Digging
    }
}

fn drop_mined(sim: &mut Sim, material: MaterialType, at: CellPos) {
    let cell = find_safe_drop_cell(&sim.grid, at);
    let item = material.mined_item();
    let material = if material == MaterialType::None {
        item.def().default_material
    } else {
        material
    };
    sim.items.spawn_item(item, cell, 1, material);
}

fn finish_mine(sim: &mut Sim, cell: CellPos, spot: CellPos) {
    let material = sim.grid.material(cell);
    if let Err(e) = world::place_cell(sim, cell, CellKind::Air, MaterialType::None) {
        log::warn!("mine at {} failed: {}", cell, e);
        return;
    }
    let at = if sim.grid.is_walkable(cell) { cell } else { spot };
    drop_mined(sim, material, at);
}

/// Dig out the wall under `cell`, leaving a hole with a ramp when one fits.
fn finish_channel(sim: &mut Sim, cell: CellPos, spot: CellPos) {
    let below = cell.offset(0, 0, -1);
    let material = sim.grid.material(below);
    if let Err(e) = world::place_cell(sim, below, CellKind::Air, MaterialType::None) {
        log::warn!("channel at {} failed: {}", cell, e);
        return;
    }
    sim.grid.set_floor(cell, false);
    if world::place_ramp(sim, below, None, material).is_ok() {
        log::debug!("channel at {} left a ramp", cell);
    }
    let at = if sim.grid.is_walkable(below) { below } else { spot };
    drop_mined(sim, material, at);
}

fn finish_dig_ramp(sim: &mut Sim, cell: CellPos, spot: CellPos) {
    let material = sim.grid.material(cell);
    let Some(dir) = valid_ramp_dirs(&sim.grid, cell).into_iter().next() else {
        log::debug!("no ramp direction left at {}", cell);
        return;
    };
    if let Err(e) = world::place_ramp(sim, cell, Some(dir), material) {
        log::warn!("dig ramp at {} failed: {}", cell, e);
        return;
    }
    drop_mined(sim, material, spot);
}

/// Fell the tree column standing on `cell`: logs per trunk cell, sticks
/// from the canopy.
fn finish_chop(sim: &mut Sim, cell: CellPos, spot: CellPos) {
    let material = match sim.grid.material(cell) {
        m if m.is_wood() => m,
        _ => MaterialType::Oak,
    };
    let mut trunks = 0u32;
    let mut canopy = 0u32;
    let mut z = cell.z;
    while z < sim.grid.depth {
        let p = CellPos::new(cell.x, cell.y, z);
        let kind = sim.grid.kind(p);
        match kind {
            CellKind::TreeTrunk | CellKind::TreeFelled => trunks += 1,
            CellKind::TreeBranch | CellKind::TreeLeaves => canopy += 1,
            _ => break,
        }
        if let Err(e) = world::place_cell(sim, p, CellKind::Air, MaterialType::None) {
            log::warn!("chop at {} failed: {}", p, e);
            break;
        }
        z += 1;
    }
    // Leaves and branches spread around the column.
    for (dx, dy) in crate::common::NEIGHBORS_8 {
        for dz in 1..=3 {
            let p = cell.offset(dx, dy, dz);
            if matches!(sim.grid.kind(p), CellKind::TreeBranch | CellKind::TreeLeaves) {
                canopy += 1;
                sim.grid.set_kind_with_material(p, CellKind::Air, MaterialType::None);
            }
        }
    }
    let at = find_safe_drop_cell(&sim.grid, if sim.grid.is_walkable(cell) { cell } else { spot });
    sim.items.spawn_item(ItemType::Log, at, trunks.max(1), material);
    sim.items.spawn_item(ItemType::Sticks, at, 1 + canopy / 2, material);
    log::debug!("tree at {} felled: {} logs", cell, trunks.max(1));
}

pub(super) fn run_dig(sim: &mut Sim, id: JobId, mover: MoverId, cell: CellPos, spot: CellPos, dt: f32) -> JobRun {
    let Some(d) = sim.jobs.get(id).and_then(|j| designation_of(&j.kind)) else {
        return JobRun::Cancel;
    };
    if sim.grid.designation(cell) != d {
        return JobRun::Cancel;
    }
    if let Some(r) = walk(sim, mover, spot) {
        return r;
    }
    let Some(speed) = work_speed(sim, mover, Some(quality_for(d))) else {
        return JobRun::Cancel;
    };
    let work_time = if d == Designation::Chop { CHOP_WORK_TIME } else { MINE_WORK_TIME };
    let Some(job) = sim.jobs.get_mut(id) else {
        return JobRun::Cancel;
    };
    job.step = Step::Working;
    job.progress += dt * speed / work_time;
    if job.progress < 1.0 {
        return JobRun::Running;
    }

    sim.grid.set_designation_raw(cell, Designation::None);
    consume_claim(sim, id, Claim::Designation(cell));
    match d {
        Designation::Mine => finish_mine(sim, cell, spot),
        Designation::Channel => finish_channel(sim, cell, spot),
        Designation::DigRamp => finish_dig_ramp(sim, cell, spot),
        Designation::Chop => finish_chop(sim, cell, spot),
        _ => {}
    }
    JobRun::Done
}

/// Claim the nearest reachable dig or chop designation this mover can work.
pub(super) fn give_dig(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    let mut cells: Vec<(CellPos, Designation)> = sim
        .grid
        .designated_cells()
        .filter(|(p, d)| {
            matches!(d, Designation::Mine | Designation::Channel | Designation::DigRamp | Designation::Chop)
                && !sim.grid.designation_claimed(*p)
        })
        .collect();
    cells.sort_by_key(|(p, _)| p.dist_sq_weighted(&at));
    for (cell, d) in cells.into_iter().take(MAX_CANDIDATES_PER_WORKGIVER * 2) {
        if work_speed(sim, mover, Some(quality_for(d))).is_none() {
            continue;
        }
        let spots: Vec<CellPos> = adjacent_spots(sim, cell).into_iter().filter(|p| *p != cell).collect();
        let Some(spot) = reachable_spot(sim, at, spots) else {
            continue;
        };
        let kind = match d {
            Designation::Mine => JobKind::Mine { cell, spot },
            Designation::Channel => JobKind::Channel { cell, spot },
            Designation::DigRamp => JobKind::DigRamp { cell, spot },
            _ => JobKind::Chop { cell, spot },
        };
        sim.grid.set_designation_claimed(cell, true);
        if start_job(sim, mover, kind, vec![Claim::Designation(cell)]).is_some() {
            return true;
        }
    }
    false
}
