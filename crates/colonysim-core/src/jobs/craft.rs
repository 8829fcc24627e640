//! Workshop crafting: fetch each ingredient to the work tile, then work
//! the bill's recipe.

use colonysim_logic::items::{flags, ItemType};
use colonysim_logic::recipes::{workshop_recipe, WorkshopRecipe};

use super::common::{consume_claim, is_available, item_site, mark_unreachable, pick_up, put_down, walk, work_speed};
use super::{start_job, Claim, JobId, JobKind, JobRun, Step};
use crate::common::CellPos;
use crate::engine::Sim;
use crate::fixtures::{BillMode, FixtureKey, Workshop};
use crate::items::{ItemId, ItemState};
use crate::movers::MoverId;
use crate::path;

#[allow(clippy::too_many_arguments)]
pub(super) fn run_craft(
    sim: &mut Sim,
    id: JobId,
    mover: MoverId,
    workshop: FixtureKey,
    bill: usize,
    inputs: &[ItemId],
    fetched: usize,
    dt: f32,
) -> JobRun {
    let Some(ws) = sim.fixtures.workshop(workshop) else {
        return JobRun::Cancel;
    };
    let Some(recipe) = ws.bills.get(bill).and_then(|b| workshop_recipe(b.recipe)) else {
        return JobRun::Cancel;
    };
    let tile = ws.work_tile();

    if fetched < inputs.len() {
        let item = inputs[fetched];
        let step = sim.jobs.get(id).map(|j| j.step).unwrap_or_default();
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
            let Some(piece) = pick_up(sim, id, mover, item, Some(1)) else {
                return JobRun::Cancel;
            };
            if let Some(job) = sim.jobs.get_mut(id) {
                job.step = Step::ToTarget;
                if let JobKind::Craft { inputs, .. } = &mut job.kind {
                    inputs[fetched] = piece;
                }
            }
            return JobRun::Running;
        }
        if let Some(r) = walk(sim, mover, tile) {
            return r;
        }
        let Some(carried) = sim.jobs.get(id).and_then(|j| j.carrying) else {
            return JobRun::Cancel;
        };
        put_down(sim, carried, tile);
        if let Some(job) = sim.jobs.get_mut(id) {
            job.carrying = None;
            job.step = Step::ToItem;
            if let JobKind::Craft { fetched, .. } = &mut job.kind {
                *fetched += 1;
            }
        }
        return JobRun::Running;
    }

    if let Some(r) = walk(sim, mover, tile) {
        return r;
    }
    let Some(speed) = work_speed(sim, mover, None) else {
        return JobRun::Cancel;
    };
    let Some(job) = sim.jobs.get_mut(id) else {
        return JobRun::Cancel;
    };
    job.step = Step::Working;
    job.progress += dt * speed / recipe.work_time.max(f32::EPSILON);
    if job.progress < 1.0 {
        return JobRun::Running;
    }

    let material = inputs
        .first()
        .and_then(|i| sim.items.get(*i))
        .map(|it| it.material)
        .unwrap_or_else(|| recipe.output.def().default_material);
    for input in inputs {
        consume_claim(sim, id, Claim::Item(*input));
        sim.items.delete_item(*input);
    }
    sim.items.spawn_item(recipe.output, tile, recipe.output_count, material);
    sim.fixtures.with_workshop(workshop, |w| {
        if let Some(b) = w.bills.get_mut(bill) {
            b.completed += 1;
            if let BillMode::DoNTimes(n) = b.mode {
                if b.completed >= n {
                    log::debug!("bill {} finished after {} runs", recipe.name, n);
                }
            }
        }
    });
    log::debug!("{} crafted at {}", recipe.name, tile);
    JobRun::Done
}

/// Candidate ingredient items for a workshop: stored in its linked
/// stockpiles when it has any, else anywhere within its search radius.
fn ingredient_pool(sim: &Sim, ws: &Workshop) -> Vec<(i64, ItemId)> {
    let tile = ws.work_tile();
    let mut pool: Vec<(i64, ItemId)> = if ws.linked_stockpiles.is_empty() {
        sim.items
            .iter()
            .filter(|(_, it)| matches!(it.state, ItemState::OnGround | ItemState::InStockpile))
            .filter(|(_, it)| it.cell().z == tile.z && it.cell().chebyshev(&tile) <= ws.search_radius)
            .map(|(id, it)| (it.cell().dist_sq_weighted(&tile), id))
            .collect()
    } else {
        ws.linked_stockpiles
            .iter()
            .filter_map(|sp| sim.stockpiles.get(*sp))
            .flat_map(|p| p.slots.iter().flatten().copied())
            .filter_map(|id| sim.items.get(id).map(|it| (it.cell().dist_sq_weighted(&tile), id)))
            .collect()
    };
    pool.retain(|(_, id)| is_available(sim, *id));
    pool.sort_by_key(|(d, id)| (*d, crate::items::slot_index(*id)));
    pool
}

/// Pick one unreserved item per ingredient (and fuel), never the same
/// record twice unless it holds enough units.
fn pick_ingredients(sim: &Sim, ws: &Workshop, recipe: &WorkshopRecipe) -> Option<Vec<ItemId>> {
    let pool = ingredient_pool(sim, ws);
    let mut wanted = vec![Some(recipe.input)];
    if let Some(second) = recipe.input2 {
        wanted.push(Some(second));
    }
    if recipe.needs_fuel {
        // None stands for any fuel item.
        wanted.push(None);
    }
    let mut picked: Vec<ItemId> = Vec::new();
    for want in wanted {
        let found = pool.iter().map(|(_, id)| *id).find(|id| {
            let Some(it) = sim.items.get(*id) else {
                return false;
            };
            let uses = picked.iter().filter(|p| *p == id).count() as u32;
            let matches = match want {
                Some(t) => it.item_type == t,
                None => it.item_type.has_flag(flags::FUEL),
            };
            matches && it.stack_count > uses
        })?;
        picked.push(found);
    }
    Some(picked)
}

/// Run the first runnable bill of the nearest free workshop.
pub(super) fn give_craft(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    let mut shops: Vec<(i64, FixtureKey, Workshop)> = sim
        .fixtures
        .workshop_list()
        .into_iter()
        .filter(|(_, w)| w.assigned_crafter.is_none() && w.bills.iter().any(|b| b.is_runnable()))
        .map(|(k, w)| (w.work_tile().dist_sq_weighted(&at), k, w))
        .collect();
    shops.sort_by_key(|(d, k, _)| (*d, k.0));

    for (_, key, ws) in shops {
        if !path::is_reachable(sim, at, ws.work_tile()) {
            continue;
        }
        for (bill, b) in ws.bills.iter().enumerate() {
            if !b.is_runnable() {
                continue;
            }
            let Some(recipe) = workshop_recipe(b.recipe) else {
                continue;
            };
            let Some(inputs) = pick_ingredients(sim, &ws, recipe) else {
                continue;
            };
            // A record used twice is claimed once; the second fetch takes
            // another unit of it.
            let mut claims = vec![Claim::Workshop(key)];
            for i in &inputs {
                if !claims.contains(&Claim::Item(*i)) {
                    claims.push(Claim::Item(*i));
                }
                if let Some(it) = sim.items.get_mut(*i) {
                    it.reserved_by = Some(mover);
                }
            }
            sim.fixtures.with_workshop(key, |w| w.assigned_crafter = Some(mover));
            let kind = JobKind::Craft {
                workshop: key,
                bill,
                inputs,
                fetched: 0,
            };
            if start_job(sim, mover, kind, claims).is_some() {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Bill;
    use crate::movers::spawn_mover;
    use colonysim_logic::config::SimFlags;
    use colonysim_logic::fixtures::WorkshopType;
    use colonysim_logic::items::MaterialType;
    use colonysim_logic::recipes::recipes_for;

    fn run(sim: &mut Sim, ticks: usize) {
        for _ in 0..ticks {
            sim.tick();
        }
    }

    fn count_of(sim: &Sim, t: ItemType) -> u32 {
        sim.items
            .iter()
            .filter(|(_, it)| it.item_type == t)
            .map(|(_, it)| it.stack_count)
            .sum()
    }

    #[test]
    fn test_do_n_times_bill() {
        let mut sim = Sim::new(12, 12, 1, 8, SimFlags::deterministic_test());
        spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let key = sim
            .fixtures
            .spawn_workshop(&mut sim.grid, WorkshopType::Sawmill, MaterialType::Oak, CellPos::new(6, 6, 0));
        let saw = recipes_for(WorkshopType::Sawmill)
            .find(|r| workshop_recipe(*r).map(|r| r.output) == Some(ItemType::Planks))
            .unwrap();
        sim.fixtures
            .with_workshop(key, |w| w.bills.push(Bill::new(saw, BillMode::DoNTimes(1))));
        sim.items.spawn_default(ItemType::Log, CellPos::new(3, 3, 0), 2).unwrap();
        run(&mut sim, 2000);
        assert_eq!(count_of(&sim, ItemType::Planks), 4);
        assert_eq!(count_of(&sim, ItemType::Log), 1);
        let ws = sim.fixtures.workshop(key).unwrap();
        assert_eq!(ws.bills[0].completed, 1);
        assert_eq!(ws.assigned_crafter, None);
    }

    #[test]
    fn test_fuel_is_required() {
        let mut sim = Sim::new(12, 12, 1, 8, SimFlags::deterministic_test());
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let key = sim
            .fixtures
            .spawn_workshop(&mut sim.grid, WorkshopType::Campfire, MaterialType::None, CellPos::new(6, 6, 0));
        let cook = recipes_for(WorkshopType::Campfire).next().unwrap();
        sim.fixtures
            .with_workshop(key, |w| w.bills.push(Bill::new(cook, BillMode::DoForever)));
        sim.items.spawn_default(ItemType::RawMeat, CellPos::new(3, 3, 0), 1).unwrap();
        run(&mut sim, 60);
        assert!(sim.movers.get(m).unwrap().is_idle());

        sim.items.spawn_default(ItemType::Sticks, CellPos::new(4, 3, 0), 1).unwrap();
        run(&mut sim, 2000);
        assert_eq!(count_of(&sim, ItemType::CookedMeat), 1);
        assert_eq!(count_of(&sim, ItemType::Sticks), 0);
    }
}
