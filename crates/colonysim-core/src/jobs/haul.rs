//! Hauling: ground items to stockpiles, stockpile-tile clearing, and the
//! re-haul passes (filter mismatch, priority, consolidation).

use colonysim_logic::constants::jobs::MAX_CANDIDATES_PER_WORKGIVER;

use super::common::{
    clear_carrying, consume_claim, drop_spot_outside_stockpiles, is_available, item_site, mark_unreachable, pick_up,
    put_down, stockpile_holding, walk,
};
use super::{start_job, Claim, ClearDest, JobId, JobKind, JobRun, Step};
use crate::common::CellPos;
use crate::engine::Sim;
use crate::items::{ItemId, ItemState};
use crate::movers::MoverId;
use crate::path;
use crate::stockpile::{Placed, StockpileId};

// ── Step functions ─────────────────────────────────────────────────────

/// Units the job reserved in its destination slot.
fn reserved_units(sim: &Sim, id: JobId, sp: StockpileId, slot: CellPos) -> Option<u32> {
    sim.jobs.get(id)?.claims.iter().find_map(|c| match *c {
        Claim::StockpileSlot { sp: s, cell, units } if s == sp && cell == slot => Some(units),
        _ => None,
    })
}

fn fetch(sim: &mut Sim, id: JobId, mover: MoverId, item: ItemId, count: Option<u32>) -> Option<JobRun> {
    let Some(site) = item_site(sim, item) else {
        return Some(JobRun::Cancel);
    };
    match walk(sim, mover, site) {
        None => {}
        Some(JobRun::Cancel) => {
            mark_unreachable(sim, item);
            return Some(JobRun::Cancel);
        }
        Some(r) => return Some(r),
    }
    if pick_up(sim, id, mover, item, count).is_none() {
        return Some(JobRun::Cancel);
    }
    if let Some(job) = sim.jobs.get_mut(id) {
        job.step = Step::ToTarget;
    }
    Some(JobRun::Running)
}

fn deliver(sim: &mut Sim, id: JobId, mover: MoverId, sp: StockpileId, slot: CellPos) -> JobRun {
    if let Some(r) = walk(sim, mover, slot) {
        return r;
    }
    let Some(carried) = sim.jobs.get(id).and_then(|j| j.carrying) else {
        return JobRun::Cancel;
    };
    let Some((t, m)) = sim.items.get(carried).map(|it| (it.item_type, it.material)) else {
        return JobRun::Cancel;
    };
    let Some(pile) = sim.stockpiles.get_mut(sp) else {
        return JobRun::Cancel;
    };
    if !pile.accepts(t, m) {
        return JobRun::Cancel;
    }
    let Some(units) = reserved_units(sim, id, sp, slot) else {
        return JobRun::Cancel;
    };
    let Some(pile) = sim.stockpiles.get_mut(sp) else {
        return JobRun::Cancel;
    };
    pile.release_slot(slot, units, &sim.items);
    let placed = pile.place_item(slot, carried, &mut sim.items);
    consume_claim(sim, id, Claim::StockpileSlot { sp, cell: slot, units });
    clear_carrying(sim, id);
    if let Placed::Overflow(rest) = placed {
        log::debug!("slot {} overflowed, dropping remainder", slot);
        super::safe_drop(sim, mover, rest);
    }
    JobRun::Done
}

pub(super) fn run_haul(sim: &mut Sim, id: JobId, mover: MoverId, item: ItemId, sp: StockpileId, slot: CellPos) -> JobRun {
    let Some(job) = sim.jobs.get(id) else {
        return JobRun::Cancel;
    };
    if !sim.stockpiles.get(sp).is_some_and(|p| p.contains_cell(slot)) {
        return JobRun::Cancel;
    }
    match job.step {
        Step::ToItem => {
            let Some(units) = reserved_units(sim, id, sp, slot) else {
                return JobRun::Cancel;
            };
            fetch(sim, id, mover, item, Some(units)).unwrap_or(JobRun::Running)
        }
        Step::ToTarget | Step::Working => deliver(sim, id, mover, sp, slot),
    }
}

pub(super) fn run_clear(sim: &mut Sim, id: JobId, mover: MoverId, item: ItemId, dest: ClearDest) -> JobRun {
    match dest {
        ClearDest::Stockpile { sp, slot } => run_haul(sim, id, mover, item, sp, slot),
        ClearDest::Drop(cell) => {
            let Some(job) = sim.jobs.get(id) else {
                return JobRun::Cancel;
            };
            if job.step == Step::ToItem {
                return fetch(sim, id, mover, item, None).unwrap_or(JobRun::Running);
            }
            if let Some(r) = walk(sim, mover, cell) {
                return r;
            }
            let Some(carried) = sim.jobs.get(id).and_then(|j| j.carrying) else {
                return JobRun::Cancel;
            };
            put_down(sim, carried, cell);
            if let Some(it) = sim.items.get_mut(carried) {
                it.reserved_by = None;
            }
            clear_carrying(sim, id);
            JobRun::Done
        }
    }
}

// ── Work-givers ────────────────────────────────────────────────────────

/// Up to `limit` loose ground items nearest `from` that pass `keep`, read
/// from the spatial index built at the start of the tick.
fn nearby_ground_items(
    sim: &Sim,
    from: CellPos,
    limit: usize,
    keep: impl Fn(&Sim, ItemId) -> bool,
) -> Vec<ItemId> {
    sim.items
        .nearest_ground(from, |id, it| {
            it.state == ItemState::OnGround && it.contained_in.is_none() && is_available(sim, id) && keep(sim, id)
        })
        .take(limit)
        .collect()
}

/// Reserve the item and as many units of slot room as the stack can fill,
/// then hand out a haul-shaped job. The mover later picks up exactly the
/// reserved units.
fn start_delivery(sim: &mut Sim, mover: MoverId, item: ItemId, sp: StockpileId, slot: CellPos, kind: JobKind) -> bool {
    let Some((t, m, stack)) = sim.items.get(item).map(|it| (it.item_type, it.material, it.stack_count)) else {
        return false;
    };
    let Some(pile) = sim.stockpiles.get_mut(sp) else {
        return false;
    };
    let Some(units) = pile.reserve_slot(slot, t, m, stack, &sim.items) else {
        return false;
    };
    if let Some(it) = sim.items.get_mut(item) {
        it.reserved_by = Some(mover);
    }
    let claims = vec![Claim::Item(item), Claim::StockpileSlot { sp, cell: slot, units }];
    start_job(sim, mover, kind, claims).is_some()
}

fn start_drop(sim: &mut Sim, mover: MoverId, item: ItemId, cell: CellPos) -> bool {
    if let Some(it) = sim.items.get_mut(item) {
        it.reserved_by = Some(mover);
    }
    let kind = JobKind::Clear {
        item,
        dest: ClearDest::Drop(cell),
    };
    start_job(sim, mover, kind, vec![Claim::Item(item)]).is_some()
}

/// Loose items on stockpile tiles: absorb them into their own tile when the
/// stockpile takes them, else move them to another stockpile or off the
/// stockpile. Stored items the filter no longer accepts are re-hauled.
pub(super) fn give_clear(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    let candidates = nearby_ground_items(sim, at, MAX_CANDIDATES_PER_WORKGIVER, |sim, id| {
        sim.items
            .get(id)
            .is_some_and(|it| sim.stockpiles.owner_of(it.cell()).is_some())
    });
    for item in candidates {
        let Some((cell, t, m)) = sim.items.get(item).map(|it| (it.cell(), it.item_type, it.material)) else {
            continue;
        };
        if !path::is_reachable(sim, at, cell) {
            mark_unreachable(sim, item);
            continue;
        }
        let Some(owner) = sim.stockpiles.owner_of(cell) else {
            continue;
        };
        let absorbs = sim.stockpiles.get(owner).is_some_and(|p| {
            p.accepts(t, m)
                && p.slot_index(cell).is_some_and(|i| {
                    p.slots[i].is_none() || (p.slot_types[i] == Some(t) && p.slot_materials[i] == m)
                })
        });
        if absorbs {
            let kind = JobKind::Absorb { item, sp: owner, slot: cell };
            if start_delivery(sim, mover, item, owner, cell, kind) {
                return true;
            }
        }
        if let Some((sp, slot)) = sim.stockpiles.find_slot_for(&sim.grid, &sim.items, t, m, cell, None) {
            let kind = JobKind::Clear {
                item,
                dest: ClearDest::Stockpile { sp, slot },
            };
            if start_delivery(sim, mover, item, sp, slot, kind) {
                return true;
            }
        }
        if let Some(spot) = drop_spot_outside_stockpiles(sim, cell) {
            if start_drop(sim, mover, item, spot) {
                return true;
            }
        }
    }
    give_filter_rehaul(sim, mover, at)
}

/// Stored items whose stockpile no longer accepts them.
fn give_filter_rehaul(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    let mut stale: Vec<(i64, ItemId)> = Vec::new();
    for (_, pile) in sim.stockpiles.iter() {
        for i in 0..pile.slot_count() {
            let Some(item) = pile.slots[i] else {
                continue;
            };
            let Some(it) = sim.items.get(item) else {
                continue;
            };
            if !pile.accepts(it.item_type, it.material) && is_available(sim, item) {
                stale.push((pile.slot_cell(i).dist_sq_weighted(&at), item));
            }
        }
    }
    stale.sort_by_key(|(d, id)| (*d, crate::items::slot_index(*id)));
    for (_, item) in stale.into_iter().take(MAX_CANDIDATES_PER_WORKGIVER) {
        let Some((cell, t, m)) = sim.items.get(item).map(|it| (it.cell(), it.item_type, it.material)) else {
            continue;
        };
        if !path::is_reachable(sim, at, cell) {
            mark_unreachable(sim, item);
            continue;
        }
        if let Some((sp, slot)) = sim.stockpiles.find_slot_for(&sim.grid, &sim.items, t, m, cell, None) {
            if start_delivery(sim, mover, item, sp, slot, JobKind::Haul { item, sp, slot }) {
                return true;
            }
        } else if let Some(spot) = drop_spot_outside_stockpiles(sim, cell) {
            if start_drop(sim, mover, item, spot) {
                return true;
            }
        }
    }
    false
}

/// Ground items off stockpiles, inside a gather zone when any exist.
pub(super) fn give_haul(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    if sim.stockpiles.is_empty() {
        return false;
    }
    // Only items some stockpile has room for count against the budget.
    let candidates = nearby_ground_items(sim, at, MAX_CANDIDATES_PER_WORKGIVER, |sim, id| {
        sim.items.get(id).is_some_and(|it| {
            let c = it.cell();
            sim.stockpiles.owner_of(c).is_none()
                && sim.zones.allows(c)
                && sim
                    .stockpiles
                    .find_slot_for(&sim.grid, &sim.items, it.item_type, it.material, c, None)
                    .is_some()
        })
    });
    for item in candidates {
        let Some((cell, t, m)) = sim.items.get(item).map(|it| (it.cell(), it.item_type, it.material)) else {
            continue;
        };
        let Some((sp, slot)) = sim.stockpiles.find_slot_for(&sim.grid, &sim.items, t, m, cell, None) else {
            continue;
        };
        if !path::is_reachable(sim, at, cell) || !path::is_reachable(sim, cell, slot) {
            mark_unreachable(sim, item);
            continue;
        }
        if start_delivery(sim, mover, item, sp, slot, JobKind::Haul { item, sp, slot }) {
            return true;
        }
    }
    false
}

/// Move stored stacks to higher-priority stockpiles, then merge small
/// stacks into strictly larger ones of the same kind.
pub(super) fn give_rehaul(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    let mut stored: Vec<(i64, ItemId, StockpileId, u8)> = Vec::new();
    for (sp, pile) in sim.stockpiles.iter() {
        for i in 0..pile.slot_count() {
            if let Some(item) = pile.slots[i].filter(|id| is_available(sim, *id)) {
                stored.push((pile.slot_cell(i).dist_sq_weighted(&at), item, sp, pile.priority));
            }
        }
    }
    stored.sort_by_key(|(d, id, _, _)| (*d, crate::items::slot_index(*id)));

    for (_, item, _, prio) in &stored {
        let Some((cell, t, m)) = sim.items.get(*item).map(|it| (it.cell(), it.item_type, it.material)) else {
            continue;
        };
        let Some((sp, slot)) = sim.stockpiles.find_slot_for(&sim.grid, &sim.items, t, m, cell, Some(*prio)) else {
            continue;
        };
        if !path::is_reachable(sim, at, cell) {
            mark_unreachable(sim, *item);
            continue;
        }
        let item = *item;
        if start_delivery(sim, mover, item, sp, slot, JobKind::Haul { item, sp, slot }) {
            log::debug!("re-hauling {} to a higher-priority stockpile", t.name());
            return true;
        }
    }

    for (_, item, _, _) in stored.into_iter().take(MAX_CANDIDATES_PER_WORKGIVER * 4) {
        let Some(target) = consolidation_target(sim, item) else {
            continue;
        };
        let (sp, slot) = target;
        if start_delivery(sim, mover, item, sp, slot, JobKind::Haul { item, sp, slot }) {
            return true;
        }
    }
    false
}

/// A slot in the item's own stockpile holding a strictly larger stack of
/// the same type and material with room for all of `item`.
fn consolidation_target(sim: &Sim, item: ItemId) -> Option<(StockpileId, CellPos)> {
    let it = sim.items.get(item)?;
    let own = stockpile_holding(sim, item)?;
    let pile = sim.stockpiles.get(own)?;
    (0..pile.slot_count())
        .filter(|&i| pile.slots[i] != Some(item) && !pile.slot_is_container[i] && pile.active_cells[i])
        .filter(|&i| pile.slot_types[i] == Some(it.item_type) && pile.slot_materials[i] == it.material)
        .find(|&i| pile.slot_counts[i] > it.stack_count && pile.slot_room(i, it.item_type) >= it.stack_count)
        .map(|i| (own, pile.slot_cell(i)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movers::spawn_mover;
    use colonysim_logic::config::SimFlags;
    use colonysim_logic::items::ItemType;

    fn run(sim: &mut Sim, ticks: usize) {
        for _ in 0..ticks {
            sim.tick();
        }
    }

    #[test]
    fn test_haul_to_stockpile() {
        let mut sim = Sim::new(10, 10, 1, 3, SimFlags::deterministic_test());
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let item = sim.items.spawn_default(ItemType::Red, CellPos::new(8, 8, 0), 1).unwrap();
        sim.stockpiles.create(2, 2, 0, 1, 1).unwrap();
        run(&mut sim, 1000);
        let it = sim.items.get(item).unwrap();
        assert_eq!(it.state, ItemState::InStockpile);
        assert_eq!(it.cell(), CellPos::new(2, 2, 0));
        assert!(sim.movers.get(m).unwrap().is_idle());
    }

    #[test]
    fn test_partial_pickup_respects_slot_room() {
        let mut sim = Sim::new(10, 10, 1, 3, SimFlags::deterministic_test());
        spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let sp = sim.stockpiles.create(2, 2, 0, 1, 1).unwrap();
        sim.stockpiles.get_mut(sp).unwrap().max_stack_size = 4;
        let item = sim.items.spawn_default(ItemType::Rock, CellPos::new(6, 6, 0), 7).unwrap();
        run(&mut sim, 1000);
        let pile = sim.stockpiles.get(sp).unwrap();
        assert_eq!(pile.slot_counts[0], 4);
        assert_eq!(sim.items.get(item).unwrap().stack_count, 3);
        assert_eq!(sim.items.get(item).unwrap().state, ItemState::OnGround);
    }

    #[test]
    fn test_second_hauler_takes_only_the_remaining_room() {
        let mut sim = Sim::new(12, 12, 1, 3, SimFlags::deterministic_test());
        let a = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let b = spawn_mover(&mut sim, CellPos::new(10, 10, 0)).unwrap();
        let sp = sim.stockpiles.create(6, 6, 0, 1, 1).unwrap();
        sim.stockpiles.get_mut(sp).unwrap().max_stack_size = 5;
        sim.items.spawn_default(ItemType::Rock, CellPos::new(2, 9, 0), 4).unwrap();
        sim.items.spawn_default(ItemType::Rock, CellPos::new(9, 2, 0), 4).unwrap();
        sim.tick();

        let units = |m: MoverId| {
            let job = sim.movers.get(m).and_then(|m| m.current_job).and_then(|j| sim.jobs.get(j)).unwrap();
            job.claims
                .iter()
                .find_map(|c| match *c {
                    Claim::StockpileSlot { units, .. } => Some(units),
                    _ => None,
                })
                .unwrap()
        };
        assert_eq!(units(a) + units(b), 5);
        assert_eq!(sim.stockpiles.get(sp).unwrap().reserved_units[0], 5);

        run(&mut sim, 1500);
        assert_eq!(sim.stockpiles.get(sp).unwrap().slot_counts[0], 5);
        assert_eq!(sim.stockpiles.get(sp).unwrap().reserved_units[0], 0);
    }

    #[test]
    fn test_consolidation_stays_within_own_stockpile() {
        let mut sim = Sim::new(14, 14, 1, 3, SimFlags::deterministic_test());
        spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let near = sim.stockpiles.create(2, 2, 0, 2, 1).unwrap();
        let far = sim.stockpiles.create(10, 10, 0, 1, 1).unwrap();
        let stash = |sim: &mut Sim, sp: StockpileId, cell: CellPos, n: u32| {
            let rock = sim.items.spawn_default(ItemType::Rock, cell, n).unwrap();
            let placed = sim.stockpiles.get_mut(sp).unwrap().place_item(cell, rock, &mut sim.items);
            assert_eq!(placed, Placed::Stored(rock));
        };
        stash(&mut sim, near, CellPos::new(2, 2, 0), 1);
        stash(&mut sim, near, CellPos::new(3, 2, 0), 3);
        stash(&mut sim, far, CellPos::new(10, 10, 0), 5);

        run(&mut sim, 1500);
        assert_eq!(sim.stockpiles.get(near).unwrap().slot_counts, vec![0, 4]);
        assert_eq!(sim.stockpiles.get(far).unwrap().slot_counts, vec![5]);
    }

    #[test]
    fn test_clear_moves_foreign_item_off_stockpile() {
        let mut sim = Sim::new(12, 12, 1, 3, SimFlags::deterministic_test());
        spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let sp = sim.stockpiles.create(4, 4, 0, 2, 2).unwrap();
        sim.stockpiles.get_mut(sp).unwrap().set_only_types(&[ItemType::Red]);
        let blue = sim.items.spawn_default(ItemType::Blue, CellPos::new(4, 4, 0), 1).unwrap();
        run(&mut sim, 1000);
        let it = sim.items.get(blue).unwrap();
        assert_eq!(it.state, ItemState::OnGround);
        assert!(sim.stockpiles.owner_of(it.cell()).is_none());
        assert_eq!(it.reserved_by, None);
    }

    #[test]
    fn test_absorb_matching_item_in_place() {
        let mut sim = Sim::new(10, 10, 1, 3, SimFlags::deterministic_test());
        spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        sim.stockpiles.create(5, 5, 0, 1, 1).unwrap();
        let red = sim.items.spawn_default(ItemType::Red, CellPos::new(5, 5, 0), 2).unwrap();
        run(&mut sim, 600);
        let it = sim.items.get(red).unwrap();
        assert_eq!(it.state, ItemState::InStockpile);
        assert_eq!(it.cell(), CellPos::new(5, 5, 0));
    }

    #[test]
    fn test_priority_rehaul() {
        let mut sim = Sim::new(12, 12, 1, 3, SimFlags::deterministic_test());
        spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let low = sim.stockpiles.create(2, 2, 0, 1, 1).unwrap();
        let item = sim.items.spawn_default(ItemType::Green, CellPos::new(3, 3, 0), 1).unwrap();
        run(&mut sim, 600);
        assert_eq!(sim.items.get(item).unwrap().cell(), CellPos::new(2, 2, 0));
        let high = sim.stockpiles.create(9, 9, 0, 1, 1).unwrap();
        sim.stockpiles.get_mut(high).unwrap().set_priority(5);
        sim.stockpiles.get_mut(low).unwrap().set_priority(1);
        run(&mut sim, 1000);
        let it = sim.items.get(item).unwrap();
        assert_eq!(it.cell(), CellPos::new(9, 9, 0));
        assert_eq!(it.state, ItemState::InStockpile);
    }
}
