//! Construction: material delivery to blueprints, building, and
//! deconstruction of finished work.

use colonysim_logic::constants::jobs::{DECONSTRUCT_WORK_TIME, MAX_CANDIDATES_PER_WORKGIVER};
use colonysim_logic::items::MaterialType;
use colonysim_logic::recipes::{BuildResult, ConstructionId};

use super::common::{
    adjacent_spots, clear_carrying, consume_claim, is_available, item_site, mark_unreachable, pick_up, reachable_spot,
    walk, work_speed,
};
use super::{cancel_jobs_with_claim, start_job, Claim, JobId, JobRun, Step};
use crate::blueprint::{self, complete_blueprint, refund_recipe, BlueprintId};
use crate::common::CellPos;
use crate::engine::Sim;
use crate::items::{ItemId, ItemState};
use crate::movers::MoverId;
use crate::path;
use crate::world::{self, CellKind, Designation};

pub(super) fn run_haul_to_blueprint(
    sim: &mut Sim,
    id: JobId,
    mover: MoverId,
    item: ItemId,
    bp: BlueprintId,
    slot: usize,
    spot: CellPos,
) -> JobRun {
    if !sim.blueprints.contains(bp) {
        return JobRun::Cancel;
    }
    let Some(step) = sim.jobs.get(id).map(|j| j.step) else {
        return JobRun::Cancel;
    };
    if step == Step::ToItem {
        let Some(site) = item_site(sim, item) else {
            return JobRun::Cancel;
        };
        match walk(sim, mover, site) {
            None => {}
            Some(JobRun::Cancel) => {
                mark_unreachable(sim, item);
                return JobRun::Cancel;
            }
            Some(r) => return r,
        }
        if pick_up(sim, id, mover, item, Some(1)).is_none() {
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
    let Some(carried) = sim.jobs.get(id).and_then(|j| j.carrying) else {
        return JobRun::Cancel;
    };
    let Some((t, m)) = sim.items.get(carried).map(|it| (it.item_type, it.material)) else {
        return JobRun::Cancel;
    };
    let Some(b) = sim.blueprints.get_mut(bp) else {
        return JobRun::Cancel;
    };
    if !b.slot_accepts(slot, t) {
        return JobRun::Cancel;
    }
    b.deliver(slot, t, m);
    consume_claim(sim, id, Claim::BlueprintSlot { bp, slot });
    clear_carrying(sim, id);
    sim.items.delete_item(carried);
    JobRun::Done
}

pub(super) fn run_build(sim: &mut Sim, id: JobId, mover: MoverId, bp: BlueprintId, spot: CellPos, dt: f32) -> JobRun {
    let Some(b) = sim.blueprints.get(bp) else {
        return JobRun::Cancel;
    };
    if b.assigned_builder != Some(mover) || !b.stage_ready() {
        return JobRun::Cancel;
    }
    if let Some(r) = walk(sim, mover, spot) {
        return r;
    }
    let Some(speed) = work_speed(sim, mover, None) else {
        return JobRun::Cancel;
    };
    if let Some(job) = sim.jobs.get_mut(id) {
        job.step = Step::Working;
    }
    let Some(b) = sim.blueprints.get_mut(bp) else {
        return JobRun::Cancel;
    };
    let work_time = b.current_stage().map(|s| s.work_time).unwrap_or(0.0);
    b.progress += dt * speed;
    if b.progress < work_time {
        return JobRun::Running;
    }
    let finished = b.advance_stage();
    consume_claim(sim, id, Claim::Blueprint(bp));
    if finished {
        complete_blueprint(sim, bp);
    } else if let Some(b) = sim.blueprints.get_mut(bp) {
        b.assigned_builder = None;
    }
    JobRun::Done
}

/// Take down whatever was built at `cell` and refund it.
fn deconstruct_cell(sim: &mut Sim, cell: CellPos) {
    if let Some(key) = sim.fixtures.furniture_at(cell) {
        let Some(f) = sim.fixtures.furniture(key) else {
            return;
        };
        cancel_jobs_with_claim(sim, |c| *c == Claim::Furniture(key));
        sim.fixtures.remove(&mut sim.grid, key);
        sim.grid.mark_dirty(cell);
        let recipe = f.built_from.or_else(|| ConstructionId::for_result(BuildResult::Furniture(f.kind)));
        if let Some(r) = recipe {
            refund_recipe(sim, r, f.material, cell);
        }
        return;
    }
    if let Some(key) = sim.fixtures.workshop_at(cell) {
        let Some(w) = sim.fixtures.workshop(key) else {
            return;
        };
        cancel_jobs_with_claim(sim, |c| *c == Claim::Workshop(key));
        sim.fixtures.remove(&mut sim.grid, key);
        for p in w.footprint() {
            sim.grid.mark_dirty(p);
        }
        let recipe = w.built_from.or_else(|| ConstructionId::for_result(BuildResult::Workshop(w.kind)));
        if let Some(r) = recipe {
            refund_recipe(sim, r, w.material, w.origin);
        }
        return;
    }

    let kind = sim.grid.kind(cell);
    let material = sim.grid.material(cell);
    let (result, removed) = if kind == CellKind::Wall {
        (BuildResult::Wall, world::place_cell(sim, cell, CellKind::Air, MaterialType::None))
    } else if kind == CellKind::Door {
        (BuildResult::Door, world::place_cell(sim, cell, CellKind::Air, MaterialType::None))
    } else if kind.is_ladder() {
        (BuildResult::Ladder, world::erase_ladder(sim, cell))
    } else if kind.is_ramp() {
        (BuildResult::Ramp, world::erase_ramp(sim, cell))
    } else if sim.grid.has_floor(cell) {
        (BuildResult::Floor, world::remove_floor(sim, cell))
    } else {
        return;
    };
    if let Err(e) = removed {
        log::warn!("deconstruct at {} failed: {}", cell, e);
        return;
    }
    if let Some(r) = ConstructionId::for_result(result) {
        refund_recipe(sim, r, material, cell);
    }
}

pub(super) fn run_deconstruct(sim: &mut Sim, id: JobId, mover: MoverId, cell: CellPos, spot: CellPos, dt: f32) -> JobRun {
    if sim.grid.designation(cell) != Designation::Deconstruct {
        return JobRun::Cancel;
    }
    if let Some(r) = walk(sim, mover, spot) {
        return r;
    }
    let Some(speed) = work_speed(sim, mover, None) else {
        return JobRun::Cancel;
    };
    let Some(job) = sim.jobs.get_mut(id) else {
        return JobRun::Cancel;
    };
    job.step = Step::Working;
    job.progress += dt * speed / DECONSTRUCT_WORK_TIME;
    if job.progress < 1.0 {
        return JobRun::Running;
    }
    sim.grid.set_designation_raw(cell, Designation::None);
    deconstruct_cell(sim, cell);
    consume_claim(sim, id, Claim::Designation(cell));
    JobRun::Done
}

// ── Work-givers ────────────────────────────────────────────────────────

/// Items that can fill a blueprint slot, nearest first.
fn materials_for(sim: &Sim, bp: BlueprintId, slot: usize, near: CellPos) -> Vec<ItemId> {
    let Some(b) = sim.blueprints.get(bp) else {
        return Vec::new();
    };
    let mut found: Vec<(i64, ItemId)> = sim
        .items
        .iter()
        .filter(|(_, it)| matches!(it.state, ItemState::OnGround | ItemState::InStockpile))
        .filter(|(id, it)| b.slot_accepts(slot, it.item_type) && is_available(sim, *id))
        .map(|(id, it)| (it.cell().dist_sq_weighted(&near), id))
        .collect();
    found.sort_by_key(|(d, id)| (*d, crate::items::slot_index(*id)));
    found.into_iter().map(|(_, id)| id).collect()
}

/// Deliver one unit to an open blueprint slot, or build a blueprint whose
/// current stage has everything it needs.
pub(super) fn give_build(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    let mut prints: Vec<(i64, BlueprintId)> = sim
        .blueprints
        .iter()
        .map(|(id, b)| (b.pos.dist_sq_weighted(&at), id))
        .collect();
    prints.sort_by_key(|(d, id)| (*d, crate::items::slot_index(*id)));

    for (_, bp) in prints {
        let Some(b) = sim.blueprints.get(bp) else {
            continue;
        };
        let pos = b.pos;
        let ready = b.stage_ready() && b.assigned_builder.is_none();
        let open = b.open_slots();
        let spots = blueprint::work_spots(&sim.grid, pos);
        let Some(spot) = reachable_spot(sim, at, spots) else {
            continue;
        };

        if ready {
            if let Some(b) = sim.blueprints.get_mut(bp) {
                b.assigned_builder = Some(mover);
            }
            let kind = super::JobKind::Build { bp, spot };
            if start_job(sim, mover, kind, vec![Claim::Blueprint(bp)]).is_some() {
                return true;
            }
            continue;
        }

        for slot in open {
            for item in materials_for(sim, bp, slot, at).into_iter().take(MAX_CANDIDATES_PER_WORKGIVER) {
                let Some((cell, t)) = sim.items.get(item).map(|it| (it.cell(), it.item_type)) else {
                    continue;
                };
                if !path::is_reachable(sim, at, cell) {
                    mark_unreachable(sim, item);
                    continue;
                }
                let Some(b) = sim.blueprints.get_mut(bp) else {
                    break;
                };
                if !b.reserve(slot, t) {
                    break;
                }
                if let Some(it) = sim.items.get_mut(item) {
                    it.reserved_by = Some(mover);
                }
                let kind = super::JobKind::HaulToBlueprint { item, bp, slot, spot };
                let claims = vec![Claim::Item(item), Claim::BlueprintSlot { bp, slot }];
                if start_job(sim, mover, kind, claims).is_some() {
                    return true;
                }
            }
        }
    }
    false
}

/// Claim the nearest reachable unclaimed deconstruct designation.
pub(super) fn give_deconstruct(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    let mut cells: Vec<CellPos> = sim
        .grid
        .designated_cells()
        .filter(|(p, d)| *d == Designation::Deconstruct && !sim.grid.designation_claimed(*p))
        .map(|(p, _)| p)
        .collect();
    cells.sort_by_key(|p| p.dist_sq_weighted(&at));
    for cell in cells.into_iter().take(MAX_CANDIDATES_PER_WORKGIVER) {
        let mut spots = adjacent_spots(sim, cell);
        if sim.fixtures.furniture_at(cell).is_some() && sim.grid.is_walkable(cell) {
            spots.push(cell);
        }
        let Some(spot) = reachable_spot(sim, at, spots) else {
            continue;
        };
        sim.grid.set_designation_claimed(cell, true);
        let kind = super::JobKind::Deconstruct { cell, spot };
        if start_job(sim, mover, kind, vec![Claim::Designation(cell)]).is_some() {
            return true;
        }
    }
    false
}
