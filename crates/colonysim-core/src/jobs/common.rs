//! Helpers shared by the job step functions and the work-givers.

use colonysim_logic::constants::jobs::{DROP_SEARCH_RADIUS, MAX_CANDIDATES_PER_WORKGIVER, TOOL_SPEED_BONUS};
use colonysim_logic::constants::mover::UNREACHABLE_COOLDOWN;
use colonysim_logic::items::{tool_quality, ToolQuality};

use super::{Claim, JobId};
use crate::common::{CellPos, NEIGHBORS_8};
use crate::engine::Sim;
use crate::items::{
    children_of, is_item_accessible, remove_item_from_container, slot_index, sync_contents_position, Item, ItemId, ItemState,
};
use crate::movers::{move_to, MoveStatus, MoverId};
use crate::path;
use crate::stockpile::StockpileId;
use crate::world::find_safe_drop_cell;

/// Drop `item` on a walkable cell near `mover` and clear its reservation.
pub fn safe_drop(sim: &mut Sim, mover: MoverId, item: ItemId) {
    let Some(at) = sim.movers.get(mover).map(|m| m.cell()) else {
        return;
    };
    let cell = find_safe_drop_cell(&sim.grid, at);
    if let Some(it) = sim.items.get_mut(item) {
        it.state = ItemState::OnGround;
        it.pos = cell.center();
        it.reserved_by = None;
    }
    sync_contents_position(&mut sim.items, item);
}

/// Put a carried item down at `at`, keeping the reservation.
pub(crate) fn put_down(sim: &mut Sim, item: ItemId, at: CellPos) {
    let cell = find_safe_drop_cell(&sim.grid, at);
    if let Some(it) = sim.items.get_mut(item) {
        it.state = ItemState::OnGround;
        it.pos = cell.center();
    }
    sync_contents_position(&mut sim.items, item);
}

/// Skip `item` in work-givers for a while after a failed path to it.
pub fn mark_unreachable(sim: &mut Sim, item: ItemId) {
    if let Some(it) = sim.items.get_mut(item) {
        it.unreachable_cooldown = UNREACHABLE_COOLDOWN;
        sim.stats.unreachable_marks += 1;
        log::debug!("{} at {} unreachable", it.item_type.name(), it.cell());
    }
}

/// Stockpile whose slot stores `item` as its representative record.
pub(crate) fn stockpile_holding(sim: &Sim, item: ItemId) -> Option<StockpileId> {
    sim.stockpiles
        .iter()
        .find(|(_, sp)| sp.slot_of_item(item).is_some())
        .map(|(id, _)| id)
}

/// Cell a mover walks to in order to reach `item`.
pub(crate) fn item_site(sim: &Sim, item: ItemId) -> Option<CellPos> {
    let outer = crate::items::outermost_container(&sim.items, item);
    sim.items.get(outer).map(|it| it.cell())
}

/// Whether a work-giver may target `item` right now.
pub(crate) fn is_available(sim: &Sim, item: ItemId) -> bool {
    sim.items.get(item).is_some_and(|it| {
        it.reserved_by.is_none()
            && it.unreachable_cooldown <= 0.0
            && it.state != ItemState::Carried
            && is_item_accessible(&sim.items, item)
    })
}

/// Nearest available item satisfying `pred`, ties broken by pool slot.
///
/// Loose ground items come from the spatial index. Stored items come from
/// the stockpile slot records, and contained items from the containers
/// standing in slots or on the ground. A contained item is as far away as
/// its outermost container.
pub(crate) fn nearest_item(sim: &Sim, at: CellPos, pred: impl Fn(ItemId, &Item) -> bool) -> Option<ItemId> {
    let wanted = |id: ItemId, it: &Item| pred(id, it) && is_available(sim, id);
    let mut best: Option<(i64, u32, ItemId)> = None;

    if let Some(id) = sim.items.nearest_ground(at, |id, it| it.contained_in.is_none() && wanted(id, it)).next() {
        if let Some(it) = sim.items.get(id) {
            offer(&mut best, it.cell().dist_sq_weighted(&at), id);
        }
    }

    for (_, pile) in sim.stockpiles.iter() {
        for i in 0..pile.slot_count() {
            let Some(id) = pile.slots[i] else {
                continue;
            };
            let d = pile.slot_cell(i).dist_sq_weighted(&at);
            if sim.items.get(id).is_some_and(|it| wanted(id, it)) {
                offer(&mut best, d, id);
            }
            if pile.slot_is_container[i] {
                for child in contained_matches(sim, id, &wanted) {
                    offer(&mut best, d, child);
                }
            }
        }
    }

    let loaded = |_: ItemId, it: &Item| it.contained_in.is_none() && it.is_container() && it.content_count > 0;
    for root in sim.items.nearest_ground(at, loaded) {
        let Some(d) = sim.items.get(root).map(|it| it.cell().dist_sq_weighted(&at)) else {
            continue;
        };
        if best.is_some_and(|b| d > b.0) {
            break;
        }
        for child in contained_matches(sim, root, &wanted) {
            offer(&mut best, d, child);
        }
    }
    best.map(|(_, _, id)| id)
}

fn offer(best: &mut Option<(i64, u32, ItemId)>, d: i64, id: ItemId) {
    let slot = slot_index(id);
    if best.map_or(true, |(bd, bs, _)| (d, slot) < (bd, bs)) {
        *best = Some((d, slot, id));
    }
}

/// Every item nested anywhere inside `container` that passes `wanted`.
fn contained_matches(sim: &Sim, container: ItemId, wanted: &impl Fn(ItemId, &Item) -> bool) -> Vec<ItemId> {
    let mut found = Vec::new();
    let mut open = vec![(container, 0u32)];
    while let Some((parent, depth)) = open.pop() {
        if depth > 16 {
            continue;
        }
        for child in children_of(&sim.items, parent) {
            let Some(it) = sim.items.get(child) else {
                continue;
            };
            if wanted(child, it) {
                found.push(child);
            }
            if it.is_container() && it.content_count > 0 {
                open.push((child, depth + 1));
            }
        }
    }
    found
}

/// Pick up `item` (or `count` units split off it) for job `id`. A split
/// moves the job's item claim onto the new piece. Returns the carried id.
pub(crate) fn pick_up(sim: &mut Sim, id: JobId, mover: MoverId, item: ItemId, count: Option<u32>) -> Option<ItemId> {
    let it = sim.items.get(item)?;
    if it.state == ItemState::Carried || it.reserved_by.is_some_and(|r| r != mover) {
        return None;
    }
    if it.state == ItemState::InContainer {
        remove_item_from_container(&mut sim.items, &sim.grid, item);
    }
    let it = sim.items.get(item)?;
    let (state, stack) = (it.state, it.stack_count);
    let pile = if state == ItemState::InStockpile {
        stockpile_holding(sim, item)
    } else {
        None
    };

    let mut carried = item;
    if let Some(n) = count.filter(|n| *n > 0 && *n < stack) {
        if let Some(piece) = sim.items.split_stack(item, n) {
            carried = piece;
        }
    }

    if carried != item {
        if let Some(orig) = sim.items.get_mut(item) {
            orig.reserved_by = None;
        }
        if let Some(sp) = pile.and_then(|sp| sim.stockpiles.get_mut(sp)) {
            sp.refresh_slot(item, &sim.items);
        }
        if let Some(job) = sim.jobs.get_mut(id) {
            for c in job.claims.iter_mut() {
                if *c == Claim::Item(item) {
                    *c = Claim::Item(carried);
                }
            }
        }
    } else if let Some(sp) = pile.and_then(|sp| sim.stockpiles.get_mut(sp)) {
        sp.take_from_slot(item, &sim.items);
    }

    let pos = sim.movers.get(mover).map(|m| m.pos)?;
    if let Some(it) = sim.items.get_mut(carried) {
        it.state = ItemState::Carried;
        it.reserved_by = Some(mover);
        it.contained_in = None;
        it.pos = pos;
    }
    sync_contents_position(&mut sim.items, carried);
    if let Some(job) = sim.jobs.get_mut(id) {
        job.carrying = Some(carried);
        if !job.claims.contains(&Claim::Item(carried)) {
            job.claims.push(Claim::Item(carried));
        }
    }
    Some(carried)
}

/// Use up `n` units of `item` in place, keeping any stockpile slot that
/// stores it in step.
pub(crate) fn consume_units(sim: &mut Sim, item: ItemId, n: u32) {
    let pile = stockpile_holding(sim, item);
    let Some(it) = sim.items.get_mut(item) else {
        return;
    };
    if it.stack_count > n {
        it.stack_count -= n;
        if let Some(sp) = pile.and_then(|sp| sim.stockpiles.get_mut(sp)) {
            sp.refresh_slot(item, &sim.items);
        }
        return;
    }
    sim.items.delete_item(item);
    if let Some(sp) = pile.and_then(|sp| sim.stockpiles.get_mut(sp)) {
        sp.refresh_slot(item, &sim.items);
    }
}

/// Drop a claim the job has used up so `end_job` does not release it.
pub(crate) fn consume_claim(sim: &mut Sim, id: JobId, claim: Claim) {
    if let Some(job) = sim.jobs.get_mut(id) {
        job.claims.retain(|c| *c != claim);
    }
}

/// Forget the carried item after it was delivered or consumed.
pub(crate) fn clear_carrying(sim: &mut Sim, id: JobId) {
    if let Some(job) = sim.jobs.get_mut(id) {
        if let Some(item) = job.carrying.take() {
            job.claims.retain(|c| *c != Claim::Item(item));
        }
    }
}

/// Work speed multiplier for a task needing `quality`. `None` when tools
/// are required and the mover has none that fits.
pub fn work_speed(sim: &Sim, mover: MoverId, quality: Option<ToolQuality>) -> Option<f32> {
    let Some(q) = quality else {
        return Some(1.0);
    };
    let level = sim
        .movers
        .get(mover)
        .and_then(|m| m.equipped_tool)
        .and_then(|t| sim.items.get(t))
        .and_then(|t| tool_quality(t.item_type))
        .filter(|(tq, _)| *tq == q)
        .map(|(_, level)| level);
    match level {
        Some(l) => Some(TOOL_SPEED_BONUS * l as f32),
        None if sim.flags.tool_requirements_enabled => None,
        None => Some(1.0),
    }
}

/// Walkable cells around `cell` on the same level, or below it when the
/// level has none.
pub(crate) fn adjacent_spots(sim: &Sim, cell: CellPos) -> Vec<CellPos> {
    let g = &sim.grid;
    let mut spots: Vec<CellPos> = NEIGHBORS_8
        .iter()
        .map(|(dx, dy)| cell.offset(*dx, *dy, 0))
        .filter(|p| g.is_walkable(*p))
        .collect();
    if spots.is_empty() {
        let below = cell.offset(0, 0, -1);
        spots.extend(
            NEIGHBORS_8
                .iter()
                .map(|(dx, dy)| below.offset(*dx, *dy, 0))
                .filter(|p| g.is_walkable(*p)),
        );
    }
    spots
}

/// Nearest of `spots` the mover can path to, checking a bounded number.
pub(crate) fn reachable_spot(sim: &mut Sim, from: CellPos, mut spots: Vec<CellPos>) -> Option<CellPos> {
    spots.sort_by_key(|p| p.dist_sq_weighted(&from));
    spots
        .into_iter()
        .take(MAX_CANDIDATES_PER_WORKGIVER)
        .find(|p| *p == from || path::is_reachable(sim, from, *p))
}

/// Nearest walkable cell that is not part of any stockpile.
pub(crate) fn drop_spot_outside_stockpiles(sim: &Sim, around: CellPos) -> Option<CellPos> {
    for r in 1..=DROP_SEARCH_RADIUS {
        for dy in -r..=r {
            for dx in -r..=r {
                if dx.abs() != r && dy.abs() != r {
                    continue;
                }
                let p = around.offset(dx, dy, 0);
                if sim.grid.is_walkable(p) && sim.stockpiles.owner_of(p).is_none() {
                    return Some(p);
                }
            }
        }
    }
    None
}

/// `move_to` for a job leg. `None` once arrived; otherwise the run result.
pub(crate) fn walk(sim: &mut Sim, mover: MoverId, target: CellPos) -> Option<super::JobRun> {
    match move_to(sim, mover, target) {
        MoveStatus::Arrived => None,
        MoveStatus::Moving => Some(super::JobRun::Running),
        MoveStatus::Failed => Some(super::JobRun::Cancel),
    }
}

/// Stop any leftover path once the mover starts working in place.
pub(crate) fn settle(sim: &mut Sim, mover: MoverId) {
    if let Some(m) = sim.movers.get_mut(mover) {
        m.clear_path();
        m.needs_repath = false;
    }
}
