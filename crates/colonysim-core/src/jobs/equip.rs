//! Picking up clothing and tools to wear or wield.

use colonysim_logic::items::{clothing_cooling_reduction, tool_quality, ItemType, ToolQuality};

use super::common::{clear_carrying, item_site, mark_unreachable, nearest_item, pick_up, safe_drop, walk};
use super::{start_job, Claim, JobId, JobKind, JobRun};
use crate::common::CellPos;
use crate::engine::Sim;
use crate::items::{ItemId, ItemState};
use crate::movers::MoverId;
use crate::path;
use crate::world::Designation;

pub(super) fn run_equip(sim: &mut Sim, id: JobId, mover: MoverId, item: ItemId) -> JobRun {
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
    let Some(carried) = pick_up(sim, id, mover, item, Some(1)) else {
        return JobRun::Cancel;
    };
    let Some(kind) = sim.items.get(carried).map(|it| it.item_type) else {
        return JobRun::Cancel;
    };
    let is_clothing = clothing_cooling_reduction(kind).is_some();
    let old = sim.movers.get_mut(mover).and_then(|m| {
        if is_clothing {
            m.equipped_clothing.replace(carried)
        } else {
            m.equipped_tool.replace(carried)
        }
    });
    if let Some(old) = old {
        safe_drop(sim, mover, old);
    }
    // The worn item stays Carried and reserved; only the job lets go of it.
    clear_carrying(sim, id);
    log::debug!("equipped {}", kind.name());
    JobRun::Done
}

fn start_equip(sim: &mut Sim, mover: MoverId, at: CellPos, item: ItemId, kind: JobKind) -> bool {
    let Some(site) = item_site(sim, item) else {
        return false;
    };
    if !path::is_reachable(sim, at, site) {
        mark_unreachable(sim, item);
        return false;
    }
    if let Some(it) = sim.items.get_mut(item) {
        it.reserved_by = Some(mover);
    }
    start_job(sim, mover, kind, vec![Claim::Item(item)]).is_some()
}

fn is_loose(state: ItemState) -> bool {
    matches!(state, ItemState::OnGround | ItemState::InStockpile | ItemState::InContainer)
}

pub(super) fn give_equip_clothing(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    if sim.movers.get(mover).map_or(true, |m| m.equipped_clothing.is_some()) {
        return false;
    }
    // Warmest first.
    let mut best: Option<(ItemId, f32)> = None;
    for t in [ItemType::LeatherClothing, ItemType::FiberClothing] {
        let Some(item) = nearest_item(sim, at, |_, it| it.item_type == t && is_loose(it.state)) else {
            continue;
        };
        let r = clothing_cooling_reduction(t).unwrap_or(0.0);
        if best.map_or(true, |(_, b)| r > b) {
            best = Some((item, r));
        }
    }
    let Some((item, _)) = best else {
        return false;
    };
    start_equip(sim, mover, at, item, JobKind::EquipClothing { item })
}

/// Qualities the colony's open work currently calls for.
fn needed_qualities(sim: &Sim) -> Vec<ToolQuality> {
    let mut out = Vec::new();
    for (_, d) in sim.grid.designated_cells() {
        let q = match d {
            Designation::Mine | Designation::Channel | Designation::DigRamp => ToolQuality::Digging,
            Designation::Chop => ToolQuality::Cutting,
            _ => continue,
        };
        if !out.contains(&q) {
            out.push(q);
        }
    }
    let carcass = sim
        .items
        .iter()
        .any(|(_, it)| it.item_type == ItemType::Carcass && it.state != ItemState::Carried);
    if carcass && !out.contains(&ToolQuality::Butchering) {
        out.push(ToolQuality::Butchering);
    }
    out
}

pub(super) fn give_equip_tool(sim: &mut Sim, mover: MoverId, at: CellPos) -> bool {
    if sim.movers.get(mover).map_or(true, |m| m.equipped_tool.is_some()) {
        return false;
    }
    for q in needed_qualities(sim) {
        let item = nearest_item(sim, at, |_, it| {
            is_loose(it.state) && tool_quality(it.item_type).is_some_and(|(tq, _)| tq == q)
        });
        if let Some(item) = item {
            if start_equip(sim, mover, at, item, JobKind::EquipTool { item }) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movers::spawn_mover;
    use crate::world;
    use colonysim_logic::config::SimFlags;
    use colonysim_logic::items::MaterialType;

    fn run(sim: &mut Sim, ticks: usize) {
        for _ in 0..ticks {
            sim.tick();
        }
    }

    #[test]
    fn test_equips_clothing() {
        let mut sim = Sim::new(10, 10, 1, 3, SimFlags::deterministic_test());
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let coat = sim.items.spawn_default(ItemType::FiberClothing, CellPos::new(6, 6, 0), 1).unwrap();
        run(&mut sim, 300);
        let mv = sim.movers.get(m).unwrap();
        assert_eq!(mv.equipped_clothing, Some(coat));
        assert!(mv.is_idle());
        let it = sim.items.get(coat).unwrap();
        assert_eq!(it.state, ItemState::Carried);
        assert_eq!(it.reserved_by, Some(m));
    }

    #[test]
    fn test_tool_fetched_for_designation() {
        let mut flags = SimFlags::deterministic_test();
        flags.tool_requirements_enabled = true;
        let mut sim = Sim::new(12, 12, 1, 3, flags);
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let pick = sim.items.spawn_default(ItemType::StonePick, CellPos::new(4, 1, 0), 1).unwrap();
        let wall = CellPos::new(8, 8, 0);
        world::place_cell(&mut sim, wall, world::CellKind::Wall, MaterialType::Granite).unwrap();
        world::designate(&mut sim, wall, Designation::Mine).unwrap();
        run(&mut sim, 1000);
        assert_eq!(sim.movers.get(m).unwrap().equipped_tool, Some(pick));
        assert_eq!(sim.grid.kind(wall), world::CellKind::Air);
    }

    #[test]
    fn test_no_tool_without_work() {
        let mut sim = Sim::new(10, 10, 1, 3, SimFlags::deterministic_test());
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        sim.items.spawn_default(ItemType::StoneAxe, CellPos::new(4, 4, 0), 1).unwrap();
        run(&mut sim, 100);
        assert_eq!(sim.movers.get(m).unwrap().equipped_tool, None);
    }
}
