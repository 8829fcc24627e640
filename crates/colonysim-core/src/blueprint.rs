//! Construction blueprints.
//!
//! A blueprint walks through its recipe's stages. Each stage's input slots
//! collect deliveries; the first reservation into a slot locks the chosen
//! alternative until the slot is empty again. When every slot of a stage
//! is delivered a builder works it off, and the last stage applies the
//! result to the world.

use colonysim_logic::constants::jobs::REFUND_CHANCE;
use colonysim_logic::constants::limits::MAX_BLUEPRINTS;
use colonysim_logic::items::{ItemType, MaterialType};
use colonysim_logic::recipes::{
    BuildResult, ConstructionId, ConstructionRecipe, RecipeStage, ResultMaterial, MAX_INPUTS_PER_STAGE, MAX_STAGES,
};
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

use crate::common::{CellPos, Direction, NEIGHBORS_8};
use crate::engine::Sim;
use crate::fixtures::FixtureKey;
use crate::jobs::{cancel_jobs_with_claim, Claim};
use crate::movers::MoverId;
use crate::world::{self, find_safe_drop_cell, CellKind, Grid};

new_key_type! {
    pub struct BlueprintId;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlueprintError {
    #[error("blueprint limit reached")]
    Full,
    #[error("cell {0} is out of bounds")]
    OutOfBounds(CellPos),
    #[error("cell {0} already has a blueprint")]
    Occupied(CellPos),
    #[error("{0} cannot be built at {1}")]
    Invalid(&'static str, CellPos),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageDelivery {
    pub delivered_count: u8,
    pub reserved_count: u8,
    pub delivered_material: MaterialType,
    pub chosen_alternative: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub pos: CellPos,
    pub recipe: ConstructionId,
    pub stage: u8,
    pub deliveries: [StageDelivery; MAX_INPUTS_PER_STAGE],
    /// First material delivered to each stage/slot.
    pub stage_materials: [[MaterialType; MAX_INPUTS_PER_STAGE]; MAX_STAGES],
    /// Every unit delivered so far.
    pub consumed: Vec<(ItemType, MaterialType)>,
    pub progress: f32,
    pub assigned_builder: Option<MoverId>,
    /// High side for ramp blueprints.
    pub ramp_dir: Option<Direction>,
}

impl Blueprint {
    pub fn new(pos: CellPos, recipe: ConstructionId) -> Self {
        Self {
            pos,
            recipe,
            stage: 0,
            deliveries: [StageDelivery::default(); MAX_INPUTS_PER_STAGE],
            stage_materials: [[MaterialType::None; MAX_INPUTS_PER_STAGE]; MAX_STAGES],
            consumed: Vec::new(),
            progress: 0.0,
            assigned_builder: None,
            ramp_dir: None,
        }
    }

    pub fn recipe_def(&self) -> &'static ConstructionRecipe {
        self.recipe.recipe()
    }

    pub fn current_stage(&self) -> Option<&'static RecipeStage> {
        self.recipe_def().stages.get(self.stage as usize)
    }

    /// Units still unclaimed for `slot`.
    pub fn slot_needed(&self, slot: usize) -> u8 {
        let Some(input) = self.current_stage().and_then(|s| s.inputs.get(slot)) else {
            return 0;
        };
        let d = &self.deliveries[slot];
        input.count.saturating_sub(d.delivered_count + d.reserved_count)
    }

    /// Whether `item_type` fits `slot`, honouring a locked alternative.
    pub fn slot_accepts(&self, slot: usize, item_type: ItemType) -> bool {
        let Some(input) = self.current_stage().and_then(|s| s.inputs.get(slot)) else {
            return false;
        };
        match self.deliveries[slot].chosen_alternative {
            Some(chosen) => input.matches_locked(chosen, item_type),
            None => input.accepts(item_type),
        }
    }

    /// Slots that still need material, in slot order.
    pub fn open_slots(&self) -> Vec<usize> {
        let n = self.current_stage().map(|s| s.inputs.len()).unwrap_or(0);
        (0..n).filter(|s| self.slot_needed(*s) > 0).collect()
    }

    pub fn stage_ready(&self) -> bool {
        let Some(stage) = self.current_stage() else {
            return false;
        };
        stage
            .inputs
            .iter()
            .enumerate()
            .all(|(i, input)| self.deliveries[i].delivered_count >= input.count)
    }

    /// Claim one unit of `slot` for `item_type`, locking the alternative.
    pub fn reserve(&mut self, slot: usize, item_type: ItemType) -> bool {
        if self.slot_needed(slot) == 0 || !self.slot_accepts(slot, item_type) {
            return false;
        }
        let Some(input) = self.current_stage().and_then(|s| s.inputs.get(slot)) else {
            return false;
        };
        let d = &mut self.deliveries[slot];
        if d.chosen_alternative.is_none() {
            d.chosen_alternative = input.alternative_index(item_type);
        }
        d.reserved_count += 1;
        true
    }

    pub fn release(&mut self, slot: usize) {
        if let Some(d) = self.deliveries.get_mut(slot) {
            d.reserved_count = d.reserved_count.saturating_sub(1);
            if d.reserved_count == 0 && d.delivered_count == 0 {
                d.chosen_alternative = None;
            }
        }
    }

    /// Consume one reserved unit into `slot`.
    pub fn deliver(&mut self, slot: usize, item_type: ItemType, material: MaterialType) {
        let stage = self.stage as usize;
        let Some(d) = self.deliveries.get_mut(slot) else {
            return;
        };
        d.reserved_count = d.reserved_count.saturating_sub(1);
        if d.delivered_count == 0 {
            d.delivered_material = material;
            if let Some(row) = self.stage_materials.get_mut(stage) {
                row[slot] = material;
            }
        }
        d.delivered_count += 1;
        self.consumed.push((item_type, material));
    }

    /// Move to the next stage. Returns true once the last stage is done.
    pub fn advance_stage(&mut self) -> bool {
        self.stage += 1;
        self.progress = 0.0;
        self.deliveries = [StageDelivery::default(); MAX_INPUTS_PER_STAGE];
        self.stage as usize >= self.recipe_def().stages.len()
    }

    pub fn result_material(&self) -> MaterialType {
        match self.recipe_def().result_material {
            ResultMaterial::Fixed(m) => m,
            ResultMaterial::FromSlot { stage, slot } => self
                .stage_materials
                .get(stage as usize)
                .map(|row| row[slot as usize])
                .unwrap_or_default(),
        }
    }

    pub fn reserved_total(&self) -> u32 {
        self.deliveries.iter().map(|d| d.reserved_count as u32).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlueprintTable {
    pub(crate) prints: SlotMap<BlueprintId, Blueprint>,
}

impl BlueprintTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.prints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prints.is_empty()
    }

    pub fn get(&self, id: BlueprintId) -> Option<&Blueprint> {
        self.prints.get(id)
    }

    pub fn get_mut(&mut self, id: BlueprintId) -> Option<&mut Blueprint> {
        self.prints.get_mut(id)
    }

    pub fn contains(&self, id: BlueprintId) -> bool {
        self.prints.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlueprintId, &Blueprint)> {
        self.prints.iter()
    }

    pub fn ids(&self) -> Vec<BlueprintId> {
        self.prints.keys().collect()
    }

    pub fn at(&self, p: CellPos) -> Option<BlueprintId> {
        self.prints.iter().find(|(_, b)| b.pos == p).map(|(id, _)| id)
    }
}

/// Cells a builder or hauler can work a blueprint from: the cell itself
/// when walkable, else a walkable neighbour, else the cell below.
pub fn work_spots(grid: &Grid, pos: CellPos) -> Vec<CellPos> {
    if grid.is_walkable(pos) {
        return vec![pos];
    }
    let mut spots: Vec<CellPos> = NEIGHBORS_8
        .iter()
        .map(|(dx, dy)| pos.offset(*dx, *dy, 0))
        .filter(|p| grid.is_walkable(*p))
        .collect();
    if spots.is_empty() {
        let below = pos.offset(0, 0, -1);
        if grid.is_walkable(below) {
            spots.push(below);
        }
        spots.extend(
            NEIGHBORS_8
                .iter()
                .map(|(dx, dy)| below.offset(*dx, *dy, 0))
                .filter(|p| grid.is_walkable(*p)),
        );
    }
    spots
}

fn check_site(sim: &Sim, pos: CellPos, recipe: ConstructionId, ramp_dir: Option<Direction>) -> Result<(), BlueprintError> {
    let grid = &sim.grid;
    if !grid.in_bounds(pos) {
        return Err(BlueprintError::OutOfBounds(pos));
    }
    if sim.blueprints.at(pos).is_some() {
        return Err(BlueprintError::Occupied(pos));
    }
    let r = recipe.recipe();
    let air = grid.kind(pos) == CellKind::Air;
    let free = sim.fixtures.furniture_at(pos).is_none() && !grid.is_workshop_block(pos);
    let ok = match r.result {
        BuildResult::Floor => air && pos.z > 0 && !grid.has_floor(pos) && !grid.is_walkable(pos),
        BuildResult::Ramp => {
            air && match ramp_dir {
                Some(d) => world::ramp_is_valid(grid, pos, d),
                None => world::valid_ramp_dirs(grid, pos).len() == 1,
            }
        }
        BuildResult::Workshop(kind) => {
            let d = kind.def();
            (0..d.height).all(|dy| {
                (0..d.width).all(|dx| {
                    let p = pos.offset(dx, dy, 0);
                    grid.kind(p) == CellKind::Air
                        && grid.is_walkable(p)
                        && !grid.is_workshop_block(p)
                        && sim.fixtures.furniture_at(p).is_none()
                })
            })
        }
        _ => air && grid.is_walkable(pos) && free,
    };
    if ok {
        Ok(())
    } else {
        Err(BlueprintError::Invalid(r.name, pos))
    }
}

/// Place a blueprint for `recipe` at `pos`.
pub fn place_blueprint(sim: &mut Sim, pos: CellPos, recipe: ConstructionId) -> Result<BlueprintId, BlueprintError> {
    place_blueprint_dir(sim, pos, recipe, None)
}

/// Place a blueprint; `ramp_dir` fixes the high side of a ramp.
pub fn place_blueprint_dir(
    sim: &mut Sim,
    pos: CellPos,
    recipe: ConstructionId,
    ramp_dir: Option<Direction>,
) -> Result<BlueprintId, BlueprintError> {
    if sim.blueprints.len() >= MAX_BLUEPRINTS {
        log::warn!("blueprint limit ({}) reached", MAX_BLUEPRINTS);
        return Err(BlueprintError::Full);
    }
    check_site(sim, pos, recipe, ramp_dir)?;
    let mut bp = Blueprint::new(pos, recipe);
    bp.ramp_dir = ramp_dir;
    let id = sim.blueprints.prints.insert(bp);
    log::debug!("blueprint {} placed at {}", recipe.recipe().name, pos);
    Ok(id)
}

/// Cancel a blueprint: drop every job working on it and refund what was
/// delivered, each unit with `REFUND_CHANCE`.
pub fn cancel_blueprint(sim: &mut Sim, id: BlueprintId) -> bool {
    if !sim.blueprints.contains(id) {
        return false;
    }
    cancel_jobs_with_claim(sim, |c| match c {
        Claim::BlueprintSlot { bp, .. } | Claim::Blueprint(bp) => *bp == id,
        _ => false,
    });
    let Some(bp) = sim.blueprints.prints.remove(id) else {
        return false;
    };
    let at = find_safe_drop_cell(&sim.grid, bp.pos);
    let mut refunded = 0;
    for (item_type, material) in bp.consumed {
        if sim.rng.chance(REFUND_CHANCE) && sim.items.spawn_item(item_type, at, 1, material).is_some() {
            refunded += 1;
        }
    }
    log::debug!("blueprint at {} cancelled, {} units refunded", bp.pos, refunded);
    true
}

/// Refund a finished construction taken down by deconstruction.
pub fn refund_recipe(sim: &mut Sim, recipe: ConstructionId, material: MaterialType, at: CellPos) -> u32 {
    let at = find_safe_drop_cell(&sim.grid, at);
    let mut refunded = 0;
    for stage in recipe.recipe().stages {
        for input in stage.inputs {
            let item_type = if input.any_building_mat || input.alternatives.is_empty() {
                material.refund_item()
            } else {
                input.alternatives[0]
            };
            for _ in 0..input.count {
                if sim.rng.chance(REFUND_CHANCE) && sim.items.spawn_item(item_type, at, 1, material).is_some() {
                    refunded += 1;
                }
            }
        }
    }
    refunded
}

/// Apply a finished blueprint to the world and remove it.
pub fn complete_blueprint(sim: &mut Sim, id: BlueprintId) {
    let Some(bp) = sim.blueprints.prints.remove(id) else {
        return;
    };
    let material = bp.result_material();
    let pos = bp.pos;
    let result = bp.recipe_def().result;
    let applied = match result {
        BuildResult::Wall => world::place_cell(sim, pos, CellKind::Wall, material),
        BuildResult::Door => world::place_cell(sim, pos, CellKind::Door, material),
        BuildResult::Ladder => world::place_ladder(sim, pos, material),
        BuildResult::Floor => world::place_floor(sim, pos, material),
        BuildResult::Ramp => world::place_ramp(sim, pos, bp.ramp_dir, material).map(|_| ()),
        BuildResult::Furniture(kind) => {
            let key = sim.fixtures.spawn_furniture(&mut sim.grid, kind, material, pos);
            set_built_from(sim, key, bp.recipe);
            sim.grid.mark_dirty(pos);
            Ok(())
        }
        BuildResult::Workshop(kind) => {
            let key = sim.fixtures.spawn_workshop(&mut sim.grid, kind, material, pos);
            sim.fixtures.with_workshop(key, |w| w.built_from = Some(bp.recipe));
            sim.grid.mark_dirty(pos);
            Ok(())
        }
    };
    if let Err(e) = applied {
        log::warn!("{} at {} could not complete: {}", bp.recipe_def().name, pos, e);
        return;
    }
    log::debug!("{} completed at {}", bp.recipe_def().name, pos);
}

fn set_built_from(sim: &mut Sim, key: FixtureKey, recipe: ConstructionId) {
    sim.fixtures.with_furniture(key, |f| f.built_from = Some(recipe));
}

#[cfg(test)]
mod tests {
    use super::*;
    use colonysim_logic::config::SimFlags;

    fn sim() -> Sim {
        Sim::new(8, 8, 2, 1, SimFlags::deterministic_test())
    }

    #[test]
    fn test_alternative_locks_and_unlocks() {
        let mut bp = Blueprint::new(CellPos::new(1, 1, 0), ConstructionId::ReinforcedWall);
        assert!(bp.slot_accepts(0, ItemType::Planks));
        assert!(bp.reserve(0, ItemType::Sticks));
        assert!(!bp.slot_accepts(0, ItemType::Planks));
        assert!(!bp.reserve(0, ItemType::Planks));
        bp.release(0);
        assert_eq!(bp.deliveries[0].chosen_alternative, None);
        assert!(bp.slot_accepts(0, ItemType::Planks));
    }

    #[test]
    fn test_result_material_from_later_stage() {
        let mut bp = Blueprint::new(CellPos::new(1, 1, 0), ConstructionId::ReinforcedWall);
        for _ in 0..2 {
            assert!(bp.reserve(0, ItemType::Sticks));
            bp.deliver(0, ItemType::Sticks, MaterialType::Oak);
        }
        assert!(bp.stage_ready());
        assert!(!bp.advance_stage());
        for _ in 0..2 {
            assert!(bp.reserve(0, ItemType::Block));
            bp.deliver(0, ItemType::Block, MaterialType::Sandstone);
        }
        assert!(bp.reserve(1, ItemType::Clay));
        bp.deliver(1, ItemType::Clay, MaterialType::Clay);
        assert!(bp.stage_ready());
        assert!(bp.advance_stage());
        assert_eq!(bp.result_material(), MaterialType::Sandstone);
        assert_eq!(bp.consumed.len(), 5);
    }

    #[test]
    fn test_stage_ready_after_delivery() {
        let mut bp = Blueprint::new(CellPos::new(1, 1, 0), ConstructionId::Wall);
        let stage = bp.current_stage().unwrap();
        for (slot, input) in stage.inputs.iter().enumerate() {
            let t = if input.any_building_mat { ItemType::Rock } else { input.alternatives[0] };
            for _ in 0..input.count {
                assert!(bp.reserve(slot, t));
                bp.deliver(slot, t, MaterialType::Granite);
            }
        }
        assert!(bp.stage_ready());
        assert_eq!(bp.reserved_total(), 0);
    }

    #[test]
    fn test_place_rejects_duplicate_and_wall() {
        let mut s = sim();
        let p = CellPos::new(3, 3, 0);
        assert!(place_blueprint(&mut s, p, ConstructionId::Wall).is_ok());
        assert_eq!(place_blueprint(&mut s, p, ConstructionId::Wall), Err(BlueprintError::Occupied(p)));
        s.grid.set_kind(CellPos::new(4, 4, 0), CellKind::Wall);
        assert!(matches!(
            place_blueprint(&mut s, CellPos::new(4, 4, 0), ConstructionId::Wall),
            Err(BlueprintError::Invalid(..))
        ));
    }

    #[test]
    fn test_cancel_refunds_some_units() {
        let mut s = sim();
        let p = CellPos::new(3, 3, 0);
        let id = place_blueprint(&mut s, p, ConstructionId::Wall).unwrap();
        {
            let bp = s.blueprints.get_mut(id).unwrap();
            for _ in 0..20 {
                bp.consumed.push((ItemType::Rock, MaterialType::Granite));
            }
        }
        assert!(cancel_blueprint(&mut s, id));
        let units: u32 = s.items.iter().map(|(_, it)| it.stack_count).sum();
        assert!(units > 0 && units <= 20, "refund out of range: {}", units);
        assert!(s.blueprints.is_empty());
    }
}
