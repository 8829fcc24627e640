//! Cross-entity consistency checks.
//!
//! `audit` walks items, stockpiles, blueprints, jobs, movers and furniture
//! once and reports every broken cross-reference it finds. It never repairs
//! anything; callers decide what a violation means (tests fail, the
//! runtime audit logs a warning).

use std::collections::HashMap;
use std::fmt;

use colonysim_logic::items::{clothing_cooling_reduction, tool_quality};

use crate::common::CellPos;
use crate::engine::Sim;
use crate::items::{ItemId, ItemState};
use crate::jobs::Claim;
use crate::stockpile::StockpileId;

/// Which rule a violation breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Check {
    StoredItemOffStockpile,
    SlotCountWithoutItem,
    ReservationWithoutJob,
    JobItemMissing,
    MoverJobMismatch,
    SlotReservationCount,
    /// Units reserved in a slot differ from what the delivering jobs hold.
    SlotReservedUnits,
    /// A slot stores more than its cap for the stored type.
    SlotOverCapacity,
    /// An item is referenced by more than one job.
    ItemClaimedTwice,
    /// A container's `content_count` disagrees with its children, or a
    /// child points at a missing container.
    ContainerContentCount,
    BlueprintReservationCount,
    FreeSlotCount,
    EquipmentState,
    FurnitureOccupant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub check: Check,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.check, self.detail)
    }
}

fn push(out: &mut Vec<Violation>, check: Check, detail: String) {
    out.push(Violation { check, detail });
}

/// Run every check against the live state.
pub fn audit(sim: &Sim) -> Vec<Violation> {
    let mut out = Vec::new();

    // Claim tallies, one pass over the jobs.
    // (deliveries, units) per slot
    let mut slot_claims: HashMap<(StockpileId, CellPos), (u32, u32)> = HashMap::new();
    let mut bp_claims: HashMap<(crate::blueprint::BlueprintId, usize), u32> = HashMap::new();
    let mut item_jobs: HashMap<ItemId, u32> = HashMap::new();
    for (jid, job) in sim.jobs.iter() {
        for c in &job.claims {
            match c {
                Claim::StockpileSlot { sp, cell, units } => {
                    let e = slot_claims.entry((*sp, *cell)).or_default();
                    e.0 += 1;
                    e.1 += units;
                }
                Claim::BlueprintSlot { bp, slot } => *bp_claims.entry((*bp, *slot)).or_default() += 1,
                _ => {}
            }
        }
        let mut refs: Vec<ItemId> = job.item_refs().collect();
        refs.sort_by_key(|id| crate::items::slot_index(*id));
        refs.dedup();
        for item in refs {
            if !sim.items.contains(item) {
                push(&mut out, Check::JobItemMissing, format!("job {:?} ({}) refers to dead item {:?}", jid, job.kind.name(), item));
            }
            *item_jobs.entry(item).or_default() += 1;
        }
        let owner_ok = sim
            .movers
            .get(job.assigned_mover)
            .is_some_and(|m| m.current_job == Some(jid));
        if !owner_ok {
            push(&mut out, Check::MoverJobMismatch, format!("job {:?} is not its mover's current job", jid));
        }
    }

    for (mid, m) in sim.movers.iter() {
        if let Some(jid) = m.current_job {
            if sim.jobs.get(jid).map(|j| j.assigned_mover) != Some(mid) {
                push(&mut out, Check::MoverJobMismatch, format!("mover {:?} holds job {:?} that is not assigned to it", mid, jid));
            }
        }
        if let Some(tool) = m.equipped_tool {
            let ok = sim.items.get(tool).is_some_and(|it| {
                it.state == ItemState::Carried && it.reserved_by == Some(mid) && tool_quality(it.item_type).is_some()
            });
            if !ok {
                push(&mut out, Check::EquipmentState, format!("mover {:?} tool {:?}", mid, tool));
            }
        }
        if let Some(cloth) = m.equipped_clothing {
            let ok = sim.items.get(cloth).is_some_and(|it| {
                it.state == ItemState::Carried
                    && it.reserved_by == Some(mid)
                    && clothing_cooling_reduction(it.item_type).is_some()
            });
            if !ok {
                push(&mut out, Check::EquipmentState, format!("mover {:?} clothing {:?}", mid, cloth));
            }
        }
    }

    for (item, jobs) in &item_jobs {
        if *jobs > 1 {
            push(&mut out, Check::ItemClaimedTwice, format!("item {:?} referenced by {} jobs", item, jobs));
        }
    }

    let mut children: HashMap<ItemId, u32> = HashMap::new();
    for (id, it) in sim.items.iter() {
        let Some(parent) = it.contained_in else {
            continue;
        };
        if sim.items.get(parent).is_some_and(|p| p.is_container()) {
            *children.entry(parent).or_default() += 1;
        } else {
            push(&mut out, Check::ContainerContentCount, format!("item {:?} inside missing container {:?}", id, parent));
        }
    }
    for (id, it) in sim.items.iter() {
        let actual = children.get(&id).copied().unwrap_or(0);
        if it.content_count != actual {
            push(
                &mut out,
                Check::ContainerContentCount,
                format!("container {:?}: content_count {} but {} children", id, it.content_count, actual),
            );
        }
    }

    for (id, it) in sim.items.iter() {
        if it.state == ItemState::InStockpile {
            let cell = it.cell();
            let on_active = sim.stockpiles.iter().any(|(_, sp)| {
                sp.slot_index(cell).is_some_and(|i| sp.active_cells[i])
            });
            if !on_active {
                push(&mut out, Check::StoredItemOffStockpile, format!("item {:?} at {}", id, cell));
            }
        }
        if let Some(mover) = it.reserved_by {
            let m = sim.movers.get(mover);
            let by_job = m
                .and_then(|m| m.current_job)
                .and_then(|j| sim.jobs.get(j))
                .is_some_and(|job| job.references_item(id));
            let equipped = m.is_some_and(|m| m.equipped_tool == Some(id) || m.equipped_clothing == Some(id));
            if !by_job && !equipped {
                push(&mut out, Check::ReservationWithoutJob, format!("item {:?} reserved by {:?}", id, mover));
            }
        }
    }

    for (sid, sp) in sim.stockpiles.iter() {
        for i in 0..sp.slot_count() {
            if sp.slot_counts[i] > 0 && !sp.slots[i].is_some_and(|item| sim.items.contains(item)) {
                push(&mut out, Check::SlotCountWithoutItem, format!("stockpile {:?} slot {}", sid, i));
            }
            let cell = sp.slot_cell(i);
            let (claimed, units) = slot_claims.get(&(sid, cell)).copied().unwrap_or((0, 0));
            if sp.reserved_by[i] != claimed {
                push(
                    &mut out,
                    Check::SlotReservationCount,
                    format!("stockpile {:?} slot {}: {} reserved, {} jobs", sid, cell, sp.reserved_by[i], claimed),
                );
            }
            if sp.reserved_units[i] != units {
                push(
                    &mut out,
                    Check::SlotReservedUnits,
                    format!("stockpile {:?} slot {}: {} units reserved, {} claimed", sid, cell, sp.reserved_units[i], units),
                );
            }
            if let Some(t) = sp.slot_types[i].filter(|_| !sp.slot_is_container[i]) {
                if sp.slot_counts[i] > sp.cap_for(t) {
                    push(
                        &mut out,
                        Check::SlotOverCapacity,
                        format!("stockpile {:?} slot {}: {} stored, cap {}", sid, cell, sp.slot_counts[i], sp.cap_for(t)),
                    );
                }
            }
        }
        let expected = sp.compute_free_slot_count(&sim.items);
        if sp.free_slot_count != expected {
            push(
                &mut out,
                Check::FreeSlotCount,
                format!("stockpile {:?}: cached {} recomputed {}", sid, sp.free_slot_count, expected),
            );
        }
    }

    for (bid, bp) in sim.blueprints.iter() {
        for (slot, d) in bp.deliveries.iter().enumerate() {
            let claimed = bp_claims.get(&(bid, slot)).copied().unwrap_or(0);
            if d.reserved_count as u32 > claimed {
                push(
                    &mut out,
                    Check::BlueprintReservationCount,
                    format!("blueprint {:?} slot {}: {} reserved, {} jobs", bid, slot, d.reserved_count, claimed),
                );
            }
        }
    }

    for (key, f) in sim.fixtures.furniture_list() {
        let Some(occupant) = f.occupant else {
            continue;
        };
        let mutual = sim
            .movers
            .get(occupant)
            .and_then(|m| m.current_job)
            .and_then(|j| sim.jobs.get(j))
            .is_some_and(|job| job.claims.contains(&Claim::Furniture(key)));
        if !mutual {
            push(&mut out, Check::FurnitureOccupant, format!("furniture {:?} held by {:?}", key, occupant));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::put_item_in_container;
    use crate::jobs::{start_job, ClearDest, JobKind};
    use crate::movers::spawn_mover;
    use colonysim_logic::config::SimFlags;
    use colonysim_logic::fixtures::FurnitureType;
    use colonysim_logic::items::{ItemType, MaterialType};

    #[test]
    fn test_clean_world_passes() {
        let mut sim = Sim::new(12, 12, 1, 2, SimFlags::deterministic_test());
        spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        sim.stockpiles.create(6, 6, 0, 2, 2).unwrap();
        sim.items.spawn_default(ItemType::Rock, CellPos::new(3, 3, 0), 1).unwrap();
        for _ in 0..5 {
            sim.tick();
            assert!(audit(&sim).is_empty(), "{:?}", audit(&sim));
        }
    }

    #[test]
    fn test_dangling_reservation_is_reported() {
        let mut sim = Sim::new(8, 8, 1, 2, SimFlags::deterministic_test());
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let item = sim.items.spawn_default(ItemType::Rock, CellPos::new(3, 3, 0), 1).unwrap();
        sim.items.get_mut(item).unwrap().reserved_by = Some(m);
        let v = audit(&sim);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].check, Check::ReservationWithoutJob);
    }

    #[test]
    fn test_stale_free_slot_count_is_reported() {
        let mut sim = Sim::new(8, 8, 1, 2, SimFlags::deterministic_test());
        let sp = sim.stockpiles.create(2, 2, 0, 2, 2).unwrap();
        sim.stockpiles.get_mut(sp).unwrap().free_slot_count = 1;
        let v = audit(&sim);
        assert!(v.iter().any(|v| v.check == Check::FreeSlotCount));
    }

    #[test]
    fn test_orphan_occupant_and_equipment_are_reported() {
        let mut sim = Sim::new(8, 8, 1, 2, SimFlags::deterministic_test());
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let bed = sim
            .fixtures
            .spawn_furniture(&mut sim.grid, FurnitureType::Bed, MaterialType::Oak, CellPos::new(4, 4, 0));
        sim.fixtures.with_furniture(bed, |f| f.occupant = Some(m));
        let rock = sim.items.spawn_default(ItemType::Rock, CellPos::new(1, 1, 0), 1).unwrap();
        sim.movers.get_mut(m).unwrap().equipped_tool = Some(rock);
        let checks: Vec<Check> = audit(&sim).into_iter().map(|v| v.check).collect();
        assert!(checks.contains(&Check::FurnitureOccupant));
        assert!(checks.contains(&Check::EquipmentState));
    }

    #[test]
    fn test_overfull_slot_is_reported() {
        let mut sim = Sim::new(8, 8, 1, 2, SimFlags::deterministic_test());
        let sp = sim.stockpiles.create(2, 2, 0, 1, 1).unwrap();
        let rock = sim.items.spawn_default(ItemType::Rock, CellPos::new(2, 2, 0), 4).unwrap();
        let pile = sim.stockpiles.get_mut(sp).unwrap();
        pile.max_stack_size = 5;
        pile.place_item(CellPos::new(2, 2, 0), rock, &mut sim.items);
        assert!(audit(&sim).is_empty(), "{:?}", audit(&sim));

        sim.items.get_mut(rock).unwrap().stack_count = 8;
        let pile = sim.stockpiles.get_mut(sp).unwrap();
        pile.slot_counts[0] = 8;
        pile.recompute_free_slots(&sim.items);
        let checks: Vec<Check> = audit(&sim).into_iter().map(|v| v.check).collect();
        assert_eq!(checks, vec![Check::SlotOverCapacity]);
    }

    #[test]
    fn test_reserved_units_must_match_claims() {
        let mut sim = Sim::new(8, 8, 1, 2, SimFlags::deterministic_test());
        let sp = sim.stockpiles.create(2, 2, 0, 1, 1).unwrap();
        let pile = sim.stockpiles.get_mut(sp).unwrap();
        pile.reserved_units[0] = 3;
        let checks: Vec<Check> = audit(&sim).into_iter().map(|v| v.check).collect();
        assert_eq!(checks, vec![Check::SlotReservedUnits]);
    }

    #[test]
    fn test_item_claimed_by_two_jobs_is_reported() {
        let mut sim = Sim::new(8, 8, 1, 2, SimFlags::deterministic_test());
        let a = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let b = spawn_mover(&mut sim, CellPos::new(6, 6, 0)).unwrap();
        let rock = sim.items.spawn_default(ItemType::Rock, CellPos::new(3, 3, 0), 1).unwrap();
        sim.items.get_mut(rock).unwrap().reserved_by = Some(a);
        let clear_to = |cell| JobKind::Clear {
            item: rock,
            dest: ClearDest::Drop(cell),
        };
        start_job(&mut sim, a, clear_to(CellPos::new(5, 1, 0)), vec![Claim::Item(rock)]).unwrap();
        assert!(audit(&sim).is_empty(), "{:?}", audit(&sim));

        start_job(&mut sim, b, clear_to(CellPos::new(5, 5, 0)), vec![Claim::Item(rock)]).unwrap();
        let checks: Vec<Check> = audit(&sim).into_iter().map(|v| v.check).collect();
        assert_eq!(checks, vec![Check::ItemClaimedTwice]);
    }

    #[test]
    fn test_container_count_mismatch_is_reported() {
        let mut sim = Sim::new(8, 8, 1, 2, SimFlags::deterministic_test());
        let chest = sim.items.spawn_default(ItemType::Basket, CellPos::new(3, 3, 0), 1).unwrap();
        let berries = sim.items.spawn_default(ItemType::Berries, CellPos::new(3, 3, 0), 2).unwrap();
        put_item_in_container(&mut sim.items, berries, chest).unwrap();
        assert!(audit(&sim).is_empty(), "{:?}", audit(&sim));

        sim.items.get_mut(chest).unwrap().content_count = 2;
        let checks: Vec<Check> = audit(&sim).into_iter().map(|v| v.check).collect();
        assert_eq!(checks, vec![Check::ContainerContentCount]);

        sim.items.get_mut(chest).unwrap().content_count = 1;
        let gone = sim.items.spawn_default(ItemType::Crate, CellPos::new(5, 5, 0), 1).unwrap();
        sim.items.delete_item(gone);
        sim.items.get_mut(berries).unwrap().contained_in = Some(gone);
        let v = audit(&sim);
        assert!(v
            .iter()
            .any(|v| v.check == Check::ContainerContentCount && v.detail.contains("missing container")));
    }

    #[test]
    fn test_audit_does_not_mutate() {
        let mut sim = Sim::new(8, 8, 1, 2, SimFlags::deterministic_test());
        let sp = sim.stockpiles.create(2, 2, 0, 2, 2).unwrap();
        sim.stockpiles.get_mut(sp).unwrap().free_slot_count = 0;
        audit(&sim);
        assert_eq!(sim.stockpiles.get(sp).unwrap().free_slot_count, 0);
    }
}
