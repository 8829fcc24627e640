//! Sparse fixtures - furniture, workshops and animals.
//!
//! These live in a `hecs` world: there are few of them, they carry
//! different component sets, and systems query them by component. Other
//! records refer to a fixture through `FixtureKey`, the entity's bit
//! pattern, which survives save/load because restore spawns at the same
//! handle.

use colonysim_logic::fixtures::{AnimalKind, FurnitureType, WorkshopType};
use colonysim_logic::items::MaterialType;
use colonysim_logic::recipes::ConstructionId;
use hecs::{Entity, World};
use serde::{Deserialize, Serialize};

use crate::common::{CellPos, Vec3};
use crate::movers::MoverId;
use crate::stockpile::StockpileId;
use crate::world::{Grid, FIXTURE_BLOCKED};

/// Persistable reference to a fixture entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FixtureKey(pub u64);

impl FixtureKey {
    pub fn entity(self) -> Option<Entity> {
        Entity::from_bits(self.0)
    }
}

impl From<Entity> for FixtureKey {
    fn from(e: Entity) -> Self {
        FixtureKey(e.to_bits().get())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Furniture {
    pub kind: FurnitureType,
    pub material: MaterialType,
    pub pos: CellPos,
    pub occupant: Option<MoverId>,
    /// Recipe it was built from, for refunds.
    pub built_from: Option<ConstructionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillMode {
    DoForever,
    DoNTimes(u32),
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    /// Index into the workshop recipe table.
    pub recipe: usize,
    pub mode: BillMode,
    pub completed: u32,
}

impl Bill {
    pub fn new(recipe: usize, mode: BillMode) -> Self {
        Self {
            recipe,
            mode,
            completed: 0,
        }
    }

    pub fn is_runnable(&self) -> bool {
        match self.mode {
            BillMode::DoForever => true,
            BillMode::DoNTimes(n) => self.completed < n,
            BillMode::Suspended => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workshop {
    pub kind: WorkshopType,
    pub material: MaterialType,
    /// Top-left footprint cell; crafters work standing here.
    pub origin: CellPos,
    pub bills: Vec<Bill>,
    pub assigned_crafter: Option<MoverId>,
    pub linked_stockpiles: Vec<StockpileId>,
    pub search_radius: i32,
    pub built_from: Option<ConstructionId>,
}

impl Workshop {
    pub fn footprint(&self) -> impl Iterator<Item = CellPos> + '_ {
        let d = self.kind.def();
        (0..d.height).flat_map(move |dy| (0..d.width).map(move |dx| self.origin.offset(dx, dy, 0)))
    }

    pub fn work_tile(&self) -> CellPos {
        self.origin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animal {
    pub kind: AnimalKind,
    pub pos: Vec3,
    pub goal: Option<CellPos>,
    pub wander_timer: f32,
    /// Designated for hunting.
    pub marked: bool,
    /// Hunter that has claimed this animal.
    pub hunted_by: Option<MoverId>,
}

impl Animal {
    pub fn cell(&self) -> CellPos {
        self.pos.cell()
    }
}

/// The fixture world plus lookups over it.
#[derive(Default)]
pub struct Fixtures {
    pub world: World,
}

impl std::fmt::Debug for Fixtures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixtures").field("entities", &self.world.len()).finish()
    }
}

impl Fixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn_furniture(&mut self, grid: &mut Grid, kind: FurnitureType, material: MaterialType, pos: CellPos) -> FixtureKey {
        let e = self.world.spawn((Furniture {
            kind,
            material,
            pos,
            occupant: None,
            built_from: None,
        },));
        apply_furniture_cost(grid, kind, pos);
        e.into()
    }

    pub fn spawn_workshop(&mut self, grid: &mut Grid, kind: WorkshopType, material: MaterialType, origin: CellPos) -> FixtureKey {
        let ws = Workshop {
            kind,
            material,
            origin,
            bills: Vec::new(),
            assigned_crafter: None,
            linked_stockpiles: Vec::new(),
            search_radius: kind.def().search_radius,
            built_from: None,
        };
        for p in ws.footprint() {
            grid.set_workshop_block(p, true);
        }
        self.world.spawn((ws,)).into()
    }

    pub fn spawn_animal(&mut self, kind: AnimalKind, cell: CellPos) -> FixtureKey {
        self.world
            .spawn((Animal {
                kind,
                pos: cell.center(),
                goal: None,
                wander_timer: 0.0,
                marked: false,
                hunted_by: None,
            },))
            .into()
    }

    /// Despawn a fixture and clear its grid footprint.
    pub fn remove(&mut self, grid: &mut Grid, key: FixtureKey) -> bool {
        let Some(e) = key.entity() else {
            return false;
        };
        if let Ok(f) = self.world.get::<&Furniture>(e) {
            grid.set_fixture_cost(f.pos, 0);
        }
        if let Ok(w) = self.world.get::<&Workshop>(e) {
            for p in w.footprint() {
                grid.set_workshop_block(p, false);
            }
        }
        self.world.despawn(e).is_ok()
    }

    pub fn contains(&self, key: FixtureKey) -> bool {
        key.entity().is_some_and(|e| self.world.contains(e))
    }

    pub fn furniture(&self, key: FixtureKey) -> Option<Furniture> {
        let e = key.entity()?;
        self.world.get::<&Furniture>(e).ok().map(|f| (*f).clone())
    }

    pub fn with_furniture<R>(&mut self, key: FixtureKey, f: impl FnOnce(&mut Furniture) -> R) -> Option<R> {
        let e = key.entity()?;
        let mut c = self.world.get::<&mut Furniture>(e).ok()?;
        Some(f(&mut *c))
    }

    pub fn workshop(&self, key: FixtureKey) -> Option<Workshop> {
        let e = key.entity()?;
        self.world.get::<&Workshop>(e).ok().map(|w| (*w).clone())
    }

    pub fn with_workshop<R>(&mut self, key: FixtureKey, f: impl FnOnce(&mut Workshop) -> R) -> Option<R> {
        let e = key.entity()?;
        let mut c = self.world.get::<&mut Workshop>(e).ok()?;
        Some(f(&mut *c))
    }

    pub fn animal(&self, key: FixtureKey) -> Option<Animal> {
        let e = key.entity()?;
        self.world.get::<&Animal>(e).ok().map(|a| (*a).clone())
    }

    pub fn with_animal<R>(&mut self, key: FixtureKey, f: impl FnOnce(&mut Animal) -> R) -> Option<R> {
        let e = key.entity()?;
        let mut c = self.world.get::<&mut Animal>(e).ok()?;
        Some(f(&mut *c))
    }

    /// Furniture entities sorted by key, so callers iterate deterministically.
    pub fn furniture_list(&self) -> Vec<(FixtureKey, Furniture)> {
        let mut v: Vec<(FixtureKey, Furniture)> = self
            .world
            .query::<&Furniture>()
            .iter()
            .map(|(e, f)| (e.into(), f.clone()))
            .collect();
        v.sort_by_key(|(k, _)| *k);
        v
    }

    pub fn workshop_list(&self) -> Vec<(FixtureKey, Workshop)> {
        let mut v: Vec<(FixtureKey, Workshop)> = self
            .world
            .query::<&Workshop>()
            .iter()
            .map(|(e, w)| (e.into(), w.clone()))
            .collect();
        v.sort_by_key(|(k, _)| *k);
        v
    }

    pub fn animal_list(&self) -> Vec<(FixtureKey, Animal)> {
        let mut v: Vec<(FixtureKey, Animal)> = self
            .world
            .query::<&Animal>()
            .iter()
            .map(|(e, a)| (e.into(), a.clone()))
            .collect();
        v.sort_by_key(|(k, _)| *k);
        v
    }

    pub fn furniture_at(&self, p: CellPos) -> Option<FixtureKey> {
        self.furniture_list().into_iter().find(|(_, f)| f.pos == p).map(|(k, _)| k)
    }

    pub fn workshop_at(&self, p: CellPos) -> Option<FixtureKey> {
        self.workshop_list()
            .into_iter()
            .find(|(_, w)| w.footprint().any(|c| c == p))
            .map(|(k, _)| k)
    }

    /// Re-apply every fixture's grid footprint, e.g. after a load.
    pub fn reapply_grid_costs(&self, grid: &mut Grid) {
        for (_, f) in self.furniture_list() {
            apply_furniture_cost(grid, f.kind, f.pos);
        }
        for (_, w) in self.workshop_list() {
            for p in w.footprint() {
                grid.set_workshop_block(p, true);
            }
        }
    }

    /// Release every claim a mover holds on fixtures.
    pub fn release_mover(&mut self, mover: MoverId) {
        for (_, f) in self.world.query_mut::<&mut Furniture>() {
            if f.occupant == Some(mover) {
                f.occupant = None;
            }
        }
        for (_, w) in self.world.query_mut::<&mut Workshop>() {
            if w.assigned_crafter == Some(mover) {
                w.assigned_crafter = None;
            }
        }
        for (_, a) in self.world.query_mut::<&mut Animal>() {
            if a.hunted_by == Some(mover) {
                a.hunted_by = None;
            }
        }
    }
}

fn apply_furniture_cost(grid: &mut Grid, kind: FurnitureType, pos: CellPos) {
    let def = kind.def();
    let cost = if def.blocking { FIXTURE_BLOCKED } else { def.move_cost_penalty };
    grid.set_fixture_cost(pos, cost);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        let mut fx = Fixtures::new();
        let mut grid = Grid::new(4, 4, 1);
        let key = fx.spawn_furniture(&mut grid, FurnitureType::Bed, MaterialType::Oak, CellPos::new(1, 1, 0));
        assert!(fx.contains(key));
        assert_eq!(fx.furniture(key).unwrap().kind, FurnitureType::Bed);
        assert_eq!(fx.furniture_at(CellPos::new(1, 1, 0)), Some(key));
        assert_eq!(grid.fixture_cost(CellPos::new(1, 1, 0)), 4);
    }

    #[test]
    fn test_workshop_footprint_marks_grid() {
        let mut fx = Fixtures::new();
        let mut grid = Grid::new(6, 6, 1);
        let key = fx.spawn_workshop(&mut grid, WorkshopType::Kiln, MaterialType::Clay, CellPos::new(2, 2, 0));
        assert!(grid.is_workshop_block(CellPos::new(3, 3, 0)));
        assert_eq!(fx.workshop_at(CellPos::new(3, 2, 0)), Some(key));
        assert!(fx.remove(&mut grid, key));
        assert!(!grid.is_workshop_block(CellPos::new(3, 3, 0)));
    }

    #[test]
    fn test_bill_modes() {
        let mut bill = Bill::new(0, BillMode::DoNTimes(2));
        assert!(bill.is_runnable());
        bill.completed = 2;
        assert!(!bill.is_runnable());
        assert!(!Bill::new(0, BillMode::Suspended).is_runnable());
    }
}
