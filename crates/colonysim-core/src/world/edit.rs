//! Terrain edits that keep items, movers and stockpiles consistent.
//!
//! Every mutating edit cleans up what the old cell kind implied (ladder
//! columns, ramps leaning on it), pushes entities out of a cell that stopped
//! being walkable and marks chunks dirty through the grid. Paths crossing
//! the cell are invalidated at the start of the next tick from the grid's
//! changed-cell list.

use colonysim_logic::items::MaterialType;
use thiserror::Error;

use super::{landing_below, ramp_is_valid, valid_ramp_dirs, walkable_cardinal_neighbor, CellKind, Designation, Vegetation};
use crate::common::{CellPos, Direction};
use crate::engine::Sim;
use crate::items::ItemState;
use crate::movers::remove_mover;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("cell {0} is outside the grid")]
    OutOfBounds(CellPos),
    #[error("ramp at {0} facing {1:?} has no support on its high side")]
    InvalidRamp(CellPos, Direction),
    #[error("no single valid ramp direction at {0}")]
    NoRampDirection(CellPos),
    #[error("cell {0} is not air")]
    NotAir(CellPos),
    #[error("designation {1:?} does not apply to cell {0}")]
    InvalidDesignation(CellPos, Designation),
}

fn check_bounds(sim: &Sim, p: CellPos) -> Result<(), EditError> {
    if sim.grid.in_bounds(p) {
        Ok(())
    } else {
        log::warn!("edit rejected: {} out of bounds", p);
        Err(EditError::OutOfBounds(p))
    }
}

/// Replace the kind and material of one cell.
pub fn place_cell(sim: &mut Sim, p: CellPos, kind: CellKind, material: MaterialType) -> Result<(), EditError> {
    check_bounds(sim, p)?;
    let old = sim.grid.kind(p);
    sim.grid.set_kind_with_material(p, kind, material);
    if old.is_ladder() || kind.is_ladder() {
        sim.grid.recalculate_ladder_column(p.x, p.y);
    }
    after_cell_change(sim, p, old.is_solid());
    Ok(())
}

fn after_cell_change(sim: &mut Sim, p: CellPos, was_solid: bool) {
    if !sim.grid.is_walkable(p) {
        evict_cell(sim, p);
    }
    if sim.grid.designation(p) != Designation::None && !designation_applies(sim, p, sim.grid.designation(p)) {
        sim.grid.set_designation_raw(p, Designation::None);
    }
    if was_solid && !sim.grid.is_solid(p) {
        let above = p.offset(0, 0, 1);
        if sim.grid.in_bounds(above) && !sim.grid.is_walkable(above) {
            evict_cell(sim, above);
        }
        validate_and_cleanup_ramps(sim, p.offset(-1, -1, 0), p.offset(1, 1, 0));
    }
}

/// Push everything out of a cell that can no longer hold it. Items and
/// movers go to a walkable 4-neighbour, else fall down the column; items
/// with nowhere to go are destroyed and movers are removed.
pub fn evict_cell(sim: &mut Sim, p: CellPos) {
    sim.stockpiles.spill_at(p, &mut sim.items);

    let to = walkable_cardinal_neighbor(&sim.grid, p).or_else(|| landing_below(&sim.grid, p));
    // Deleting a container drops its children onto the same cell, so loop.
    for _ in 0..8 {
        let here = sim.items.ground_items_at(p);
        if here.is_empty() {
            break;
        }
        for id in here {
            match to {
                Some(q) => {
                    if let Some(it) = sim.items.get_mut(id) {
                        it.pos = q.center();
                    }
                    crate::items::sync_contents_position(&mut sim.items, id);
                }
                None => {
                    log::debug!("item destroyed: no room around {}", p);
                    sim.items.delete_item(id);
                }
            }
        }
    }

    let movers: Vec<_> = sim
        .movers
        .iter()
        .filter(|(_, m)| m.pos.cell() == p)
        .map(|(id, _)| id)
        .collect();
    for id in movers {
        match to {
            Some(q) => {
                if let Some(m) = sim.movers.get_mut(id) {
                    m.pos = q.center();
                    m.needs_repath = true;
                }
            }
            None => {
                log::warn!("mover removed: trapped at {}", p);
                remove_mover(sim, id);
            }
        }
    }
}

/// Place a ramp. With `dir == None` the direction is picked automatically
/// and the edit is refused unless exactly one direction is valid.
pub fn place_ramp(sim: &mut Sim, p: CellPos, dir: Option<Direction>, material: MaterialType) -> Result<Direction, EditError> {
    check_bounds(sim, p)?;
    let dir = match dir {
        Some(d) => {
            if !ramp_is_valid(&sim.grid, p, d) {
                return Err(EditError::InvalidRamp(p, d));
            }
            d
        }
        None => {
            let dirs = valid_ramp_dirs(&sim.grid, p);
            if dirs.len() != 1 {
                return Err(EditError::NoRampDirection(p));
            }
            dirs[0]
        }
    };
    place_cell(sim, p, CellKind::ramp(dir), material)?;
    Ok(dir)
}

pub fn erase_ramp(sim: &mut Sim, p: CellPos) -> Result<(), EditError> {
    check_bounds(sim, p)?;
    if sim.grid.kind(p).is_ramp() {
        place_cell(sim, p, CellKind::Air, MaterialType::None)?;
    }
    Ok(())
}

pub fn place_ladder(sim: &mut Sim, p: CellPos, material: MaterialType) -> Result<(), EditError> {
    place_cell(sim, p, CellKind::LadderUp, material)
}

pub fn erase_ladder(sim: &mut Sim, p: CellPos) -> Result<(), EditError> {
    check_bounds(sim, p)?;
    if sim.grid.kind(p).is_ladder() {
        place_cell(sim, p, CellKind::Air, MaterialType::None)?;
    }
    Ok(())
}

pub fn place_floor(sim: &mut Sim, p: CellPos, material: MaterialType) -> Result<(), EditError> {
    check_bounds(sim, p)?;
    if sim.grid.kind(p) != CellKind::Air {
        return Err(EditError::NotAir(p));
    }
    sim.grid.set_floor(p, true);
    sim.grid.set_material(p, material);
    Ok(())
}

/// Remove a constructed floor. Whatever stood on it is pushed aside or
/// falls to the level below.
pub fn remove_floor(sim: &mut Sim, p: CellPos) -> Result<(), EditError> {
    check_bounds(sim, p)?;
    if !sim.grid.has_floor(p) {
        return Ok(());
    }
    sim.grid.set_floor(p, false);
    if !sim.grid.is_walkable(p) {
        evict_cell(sim, p);
    }
    Ok(())
}

/// Revert ramps without support on their high side to air, within the
/// inclusive box `min..=max`. Returns how many were reverted.
pub fn validate_and_cleanup_ramps(sim: &mut Sim, min: CellPos, max: CellPos) -> usize {
    let mut reverted = 0;
    for z in min.z.max(0)..=max.z.min(sim.grid.depth - 1) {
        for y in min.y.max(0)..=max.y.min(sim.grid.height - 1) {
            for x in min.x.max(0)..=max.x.min(sim.grid.width - 1) {
                let q = CellPos::new(x, y, z);
                let Some(dir) = sim.grid.kind(q).ramp_dir() else {
                    continue;
                };
                if ramp_is_valid(&sim.grid, q, dir) {
                    continue;
                }
                sim.grid.set_kind_with_material(q, CellKind::Air, MaterialType::None);
                if !sim.grid.is_walkable(q) {
                    evict_cell(sim, q);
                }
                reverted += 1;
            }
        }
    }
    if reverted > 0 {
        log::debug!("reverted {} orphan ramps", reverted);
    }
    reverted
}

// ── Designations ───────────────────────────────────────────────────────

/// Whether a designation makes sense for the cell as it is now.
pub fn designation_applies(sim: &Sim, p: CellPos, d: Designation) -> bool {
    let g = &sim.grid;
    let kind = g.kind(p);
    match d {
        Designation::None => true,
        Designation::Mine => kind == CellKind::Wall,
        Designation::Channel => {
            p.z > 0 && kind == CellKind::Air && g.is_walkable(p) && g.kind(p.offset(0, 0, -1)) == CellKind::Wall
        }
        Designation::DigRamp => kind == CellKind::Wall && !valid_ramp_dirs(g, p).is_empty(),
        Designation::Chop => matches!(kind, CellKind::TreeTrunk | CellKind::TreeFelled),
        Designation::Harvest => {
            kind == CellKind::Bush || (kind == CellKind::Air && g.vegetation(p) >= Vegetation::Tall)
        }
        Designation::Plant => {
            kind == CellKind::Air
                && g.is_walkable(p)
                && !g.has_floor(p)
                && (p.z == 0 || g.material(p.offset(0, 0, -1)) == MaterialType::Dirt)
                && sim.fixtures.furniture_at(p).is_none()
        }
        Designation::Deconstruct => {
            kind == CellKind::Wall
                || kind == CellKind::Door
                || kind.is_ladder()
                || kind.is_ramp()
                || g.has_floor(p)
                || sim.fixtures.furniture_at(p).is_some()
                || sim.fixtures.workshop_at(p).is_some()
        }
    }
}

/// Mark a cell for work. Replacing an existing designation drops any claim
/// on it; the job holding the claim notices and cancels.
pub fn designate(sim: &mut Sim, p: CellPos, d: Designation) -> Result<(), EditError> {
    check_bounds(sim, p)?;
    if !designation_applies(sim, p, d) {
        return Err(EditError::InvalidDesignation(p, d));
    }
    sim.grid.set_designation_raw(p, d);
    Ok(())
}

pub fn undesignate(sim: &mut Sim, p: CellPos) -> Result<(), EditError> {
    check_bounds(sim, p)?;
    sim.grid.set_designation_raw(p, Designation::None);
    Ok(())
}

/// Items resting on `p` that are loose on the ground.
pub fn loose_items_at(sim: &Sim, p: CellPos) -> usize {
    sim.items
        .iter()
        .filter(|(_, it)| it.state == ItemState::OnGround && it.cell() == p)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use colonysim_logic::config::SimFlags;
    use colonysim_logic::items::ItemType;

    fn sim(w: i32, h: i32, d: i32) -> Sim {
        Sim::new(w, h, d, 1, SimFlags::deterministic_test())
    }

    #[test]
    fn test_wall_pushes_item_to_neighbor() {
        let mut s = sim(5, 5, 1);
        let p = CellPos::new(2, 2, 0);
        let id = s.items.spawn_default(ItemType::Red, p, 1).unwrap();
        place_cell(&mut s, p, CellKind::Wall, MaterialType::Granite).unwrap();
        let it = s.items.get(id).unwrap();
        assert_ne!(it.cell(), p);
        assert!(s.grid.is_walkable(it.cell()));
    }

    #[test]
    fn test_removed_floor_drops_items() {
        let mut s = sim(3, 3, 2);
        for x in 0..3 {
            for y in 0..3 {
                if (x, y) != (1, 1) {
                    s.grid.set_kind(CellPos::new(x, y, 1), CellKind::Wall);
                }
            }
        }
        let top = CellPos::new(1, 1, 1);
        place_floor(&mut s, top, MaterialType::Oak).unwrap();
        let id = s.items.spawn_default(ItemType::Blue, top, 1).unwrap();
        remove_floor(&mut s, top).unwrap();
        assert_eq!(s.items.get(id).unwrap().cell(), CellPos::new(1, 1, 0));
        assert_eq!(loose_items_at(&s, CellPos::new(1, 1, 0)), 1);
    }

    #[test]
    fn test_auto_ramp_refuses_ambiguity() {
        let mut s = sim(5, 5, 2);
        let p = CellPos::new(2, 2, 0);
        assert_eq!(place_ramp(&mut s, p, None, MaterialType::Granite), Err(EditError::NoRampDirection(p)));
        s.grid.set_kind(CellPos::new(2, 1, 0), CellKind::Wall);
        assert_eq!(place_ramp(&mut s, p, None, MaterialType::Granite), Ok(Direction::North));
        s.grid.set_kind(CellPos::new(2, 1, 0), CellKind::Wall);
        s.grid.set_kind(CellPos::new(3, 2, 0), CellKind::Wall);
        assert_eq!(erase_ramp(&mut s, p), Ok(()));
        assert_eq!(place_ramp(&mut s, p, None, MaterialType::Granite), Err(EditError::NoRampDirection(p)));
    }

    #[test]
    fn test_orphan_ramp_reverted_when_support_mined() {
        let mut s = sim(5, 5, 2);
        let wall = CellPos::new(3, 2, 0);
        let ramp = CellPos::new(2, 2, 0);
        place_cell(&mut s, wall, CellKind::Wall, MaterialType::Granite).unwrap();
        place_ramp(&mut s, ramp, Some(Direction::East), MaterialType::Granite).unwrap();
        place_cell(&mut s, wall, CellKind::Air, MaterialType::None).unwrap();
        assert_eq!(s.grid.kind(ramp), CellKind::Air);
    }

    #[test]
    fn test_ladder_column_derived() {
        let mut s = sim(3, 3, 3);
        for z in 0..3 {
            place_ladder(&mut s, CellPos::new(1, 1, z), MaterialType::Oak).unwrap();
        }
        assert_eq!(s.grid.kind(CellPos::new(1, 1, 0)), CellKind::LadderUp);
        assert_eq!(s.grid.kind(CellPos::new(1, 1, 1)), CellKind::LadderBoth);
        assert_eq!(s.grid.kind(CellPos::new(1, 1, 2)), CellKind::LadderDown);
        erase_ladder(&mut s, CellPos::new(1, 1, 2)).unwrap();
        assert_eq!(s.grid.kind(CellPos::new(1, 1, 1)), CellKind::LadderDown);
    }

    #[test]
    fn test_designation_validation() {
        let mut s = sim(4, 4, 1);
        let p = CellPos::new(1, 1, 0);
        assert!(designate(&mut s, p, Designation::Mine).is_err());
        s.grid.set_kind_with_material(p, CellKind::Wall, MaterialType::Granite);
        assert!(designate(&mut s, p, Designation::Mine).is_ok());
        place_cell(&mut s, p, CellKind::Air, MaterialType::None).unwrap();
        assert_eq!(s.grid.designation(p), Designation::None, "stale designation cleared");
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut s = sim(2, 2, 1);
        let p = CellPos::new(5, 0, 0);
        assert_eq!(place_cell(&mut s, p, CellKind::Wall, MaterialType::None), Err(EditError::OutOfBounds(p)));
    }
}
