//! Save/Load for the whole simulation.
//!
//! A save is a fixed header (magic and format version) followed by one
//! bincode body. Arenas are written as-is so generational ids stay valid
//! across a round trip; fixtures are written per entity and respawned at
//! their old handles. Everything derived (designated-cell index, HPA*
//! graph, fixture costs, spatial indices, stockpile ground cache, mover
//! grid) is rebuilt on load rather than stored.

use std::io::{Read, Write};

use colonysim_logic::balance::BalanceTable;
use colonysim_logic::config::SimFlags;
use colonysim_logic::items::MaterialType;
use colonysim_logic::rng::SimRng;
use hecs::{Entity, EntityBuilder};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use thiserror::Error;

use crate::blueprint::{Blueprint, BlueprintId};
use crate::engine::{Sim, SimClock, SimStats};
use crate::fixtures::{Animal, FixtureKey, Fixtures, Furniture, Workshop};
use crate::items::{Item, ItemId};
use crate::jobs::{Job, JobId};
use crate::layers::LayerState;
use crate::movers::{Mover, MoverId};
use crate::stockpile::{Stockpile, StockpileId};
use crate::world::{CellKind, Designation, Grid, Vegetation};
use crate::zones::GatherZones;

/// "KVAN" when written little-endian.
pub const SAVE_MAGIC: u32 = 0x4E41_564B;
/// Increment when the body layout changes.
pub const SAVE_VERSION: u32 = 3;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("not a save file (magic {0:#010x})")]
    BadMagic(u32),
    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("malformed save: {0}")]
    Format(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SaveHeader {
    magic: u32,
    version: u32,
}

/// Grid arrays in z-major order, plus dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub width: i32,
    pub height: i32,
    pub depth: i32,
    pub chunk_w: i32,
    pub chunk_h: i32,
    pub kinds: Vec<CellKind>,
    pub materials: Vec<MaterialType>,
    pub flags: Vec<u8>,
    pub vegetation: Vec<Vegetation>,
    pub water: Vec<u8>,
    pub fire: Vec<u8>,
    pub smoke: Vec<u8>,
    pub temp: Vec<i16>,
    pub designation: Vec<Designation>,
    pub growth: Vec<u8>,
}

impl From<&Grid> for GridSnapshot {
    fn from(g: &Grid) -> Self {
        Self {
            width: g.width,
            height: g.height,
            depth: g.depth,
            chunk_w: g.chunk_w,
            chunk_h: g.chunk_h,
            kinds: g.kinds.clone(),
            materials: g.materials.clone(),
            flags: g.flags.clone(),
            vegetation: g.vegetation.clone(),
            water: g.water.clone(),
            fire: g.fire.clone(),
            smoke: g.smoke.clone(),
            temp: g.temp.clone(),
            designation: g.designation.clone(),
            growth: g.growth.clone(),
        }
    }
}

impl GridSnapshot {
    fn into_grid(self) -> Result<Grid, SaveError> {
        let mut g = Grid::with_chunks(self.width, self.height, self.depth, self.chunk_w, self.chunk_h);
        if (g.width, g.height, g.depth) != (self.width, self.height, self.depth) {
            return Err(SaveError::Format(format!(
                "grid dimensions {}x{}x{} out of range",
                self.width, self.height, self.depth
            )));
        }
        let n = g.cell_count();
        let lengths = [
            self.kinds.len(),
            self.materials.len(),
            self.flags.len(),
            self.vegetation.len(),
            self.water.len(),
            self.fire.len(),
            self.smoke.len(),
            self.temp.len(),
            self.designation.len(),
            self.growth.len(),
        ];
        if lengths.iter().any(|l| *l != n) {
            return Err(SaveError::Format(format!("grid arrays do not match {} cells", n)));
        }
        g.kinds = self.kinds;
        g.materials = self.materials;
        g.flags = self.flags;
        g.vegetation = self.vegetation;
        g.water = self.water;
        g.fire = self.fire;
        g.smoke = self.smoke;
        g.temp = self.temp;
        g.designation = self.designation;
        g.growth = self.growth;
        Ok(g)
    }
}

/// One fixture entity with whichever components it carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SerializableFixture {
    pub key: u64,
    pub furniture: Option<Furniture>,
    pub workshop: Option<Workshop>,
    pub animal: Option<Animal>,
}

fn serialize_fixtures(fixtures: &Fixtures) -> Vec<SerializableFixture> {
    let mut out: Vec<SerializableFixture> = fixtures
        .world
        .iter()
        .map(|e| {
            let entity = e.entity();
            SerializableFixture {
                key: FixtureKey::from(entity).0,
                furniture: e.get::<&Furniture>().map(|c| (*c).clone()),
                workshop: e.get::<&Workshop>().map(|c| (*c).clone()),
                animal: e.get::<&Animal>().map(|c| (*c).clone()),
            }
        })
        .collect();
    out.sort_by_key(|f| f.key);
    out
}

fn deserialize_fixtures(records: Vec<SerializableFixture>) -> Result<Fixtures, SaveError> {
    let mut fixtures = Fixtures::new();
    for r in records {
        let entity = Entity::from_bits(r.key)
            .ok_or_else(|| SaveError::Format(format!("bad fixture handle {:#x}", r.key)))?;
        let mut builder = EntityBuilder::new();
        if let Some(c) = r.furniture {
            builder.add(c);
        }
        if let Some(c) = r.workshop {
            builder.add(c);
        }
        if let Some(c) = r.animal {
            builder.add(c);
        }
        fixtures.world.spawn_at(entity, builder.build());
    }
    Ok(fixtures)
}

/// Serializable snapshot of the simulation state
#[derive(Serialize, Deserialize)]
pub struct SaveData {
    pub grid: GridSnapshot,
    pub items: SlotMap<ItemId, Item>,
    /// Peak arena slot, kept so the high-water mark survives a reload.
    pub item_high_water: usize,
    pub stockpiles: SlotMap<StockpileId, Stockpile>,
    pub zones: GatherZones,
    pub blueprints: SlotMap<BlueprintId, Blueprint>,
    pub movers: SlotMap<MoverId, Mover>,
    pub mover_order: Vec<MoverId>,
    pub jobs: SlotMap<JobId, Job>,
    pub active_jobs: Vec<JobId>,
    pub fixtures: Vec<SerializableFixture>,
    pub layers: LayerState,
    pub clock: SimClock,
    pub stats: SimStats,
    pub rng: SimRng,
    pub flags: SimFlags,
    pub balance: BalanceTable,
}

/// Save the complete simulation to a writer
pub fn save_sim<W: Write>(mut writer: W, sim: &Sim) -> Result<(), SaveError> {
    let header = SaveHeader {
        magic: SAVE_MAGIC,
        version: SAVE_VERSION,
    };
    let data = SaveData {
        grid: GridSnapshot::from(&sim.grid),
        items: sim.items.items.clone(),
        item_high_water: sim.items.high_water_mark(),
        stockpiles: sim.stockpiles.piles.clone(),
        zones: sim.zones.clone(),
        blueprints: sim.blueprints.prints.clone(),
        movers: sim.movers.movers.clone(),
        mover_order: sim.movers.order.clone(),
        jobs: sim.jobs.jobs.clone(),
        active_jobs: sim.jobs.active.clone(),
        fixtures: serialize_fixtures(&sim.fixtures),
        layers: sim.layers.clone(),
        clock: sim.clock.clone(),
        stats: sim.stats.clone(),
        rng: sim.rng.clone(),
        flags: sim.flags.clone(),
        balance: sim.balance.clone(),
    };
    bincode::serialize_into(&mut writer, &header)?;
    bincode::serialize_into(&mut writer, &data)?;
    writer.flush()?;
    log::info!(
        "saved tick {}: {} movers, {} items, {} jobs",
        sim.clock.tick,
        data.movers.len(),
        data.items.len(),
        data.jobs.len()
    );
    Ok(())
}

/// Load a simulation from a reader and rebuild every derived structure.
pub fn load_sim<R: Read>(mut reader: R) -> Result<Sim, SaveError> {
    let header: SaveHeader = bincode::deserialize_from(&mut reader)?;
    if header.magic != SAVE_MAGIC {
        return Err(SaveError::BadMagic(header.magic));
    }
    if header.version != SAVE_VERSION {
        return Err(SaveError::VersionMismatch {
            expected: SAVE_VERSION,
            found: header.version,
        });
    }
    let data: SaveData = bincode::deserialize_from(&mut reader)?;

    let grid = data.grid.into_grid()?;
    let mut sim = Sim::new(grid.width, grid.height, grid.depth, 0, data.flags);
    sim.grid = grid;
    sim.items.items = data.items;
    sim.items.restore_high_water(data.item_high_water);
    sim.stockpiles.piles = data.stockpiles;
    sim.zones = data.zones;
    sim.blueprints.prints = data.blueprints;
    sim.movers.movers = data.movers;
    sim.movers.order = data.mover_order;
    sim.jobs.jobs = data.jobs;
    sim.jobs.active = data.active_jobs;
    sim.fixtures = deserialize_fixtures(data.fixtures)?;
    sim.layers = data.layers;
    sim.clock = data.clock;
    sim.stats = data.stats;
    sim.rng = data.rng;
    sim.balance = data.balance;

    rebuild_derived(&mut sim);
    log::info!("loaded tick {}: {} movers, {} items", sim.clock.tick, sim.movers.len(), sim.items.len());
    Ok(sim)
}

fn rebuild_derived(sim: &mut Sim) {
    sim.grid.rebuild_designated();
    sim.fixtures.reapply_grid_costs(&mut sim.grid);
    sim.grid.mark_all_dirty();
    // Loading is not an edit; nothing needs path invalidation.
    sim.grid.take_changed_cells();
    let (w, h, d) = (sim.grid.width, sim.grid.height, sim.grid.depth);
    sim.items.rebuild_spatial(w, h, d);
    sim.stockpiles.restore_derived(&sim.items);
    sim.mover_grid.rebuild(&sim.movers);
    let waiting: Vec<MoverId> = sim
        .movers
        .iter()
        .filter(|(_, m)| m.needs_repath)
        .map(|(id, _)| id)
        .collect();
    for id in waiting {
        sim.repath_queue.push(id);
        if let Some(m) = sim.movers.get_mut(id) {
            m.repath_queued = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CellPos;
    use crate::movers::spawn_mover;
    use colonysim_logic::fixtures::{AnimalKind, FurnitureType};
    use colonysim_logic::items::ItemType;

    fn populated() -> Sim {
        let mut sim = Sim::new(16, 16, 2, 42, SimFlags::deterministic_test());
        sim.grid.set_kind(CellPos::new(5, 5, 0), CellKind::Wall);
        sim.grid.set_water(CellPos::new(7, 7, 0), 3);
        spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        spawn_mover(&mut sim, CellPos::new(2, 1, 0)).unwrap();
        sim.stockpiles.create(10, 10, 0, 3, 3).unwrap();
        sim.items.spawn_default(ItemType::Rock, CellPos::new(3, 3, 0), 4).unwrap();
        sim.fixtures
            .spawn_furniture(&mut sim.grid, FurnitureType::Bed, MaterialType::Oak, CellPos::new(12, 2, 0));
        sim.fixtures.spawn_animal(AnimalKind::Rabbit, CellPos::new(8, 12, 0));
        for _ in 0..10 {
            sim.tick();
        }
        sim
    }

    #[test]
    fn test_save_load_roundtrip() {
        let sim = populated();
        let mut buffer = Vec::new();
        save_sim(&mut buffer, &sim).expect("save");
        let loaded = load_sim(&buffer[..]).expect("load");

        assert_eq!(loaded.clock.tick, sim.clock.tick);
        assert_eq!(loaded.movers.ids(), sim.movers.ids());
        assert_eq!(loaded.items.len(), sim.items.len());
        assert_eq!(loaded.grid.kind(CellPos::new(5, 5, 0)), CellKind::Wall);
        assert_eq!(loaded.grid.water(CellPos::new(7, 7, 0)), 3);
        assert_eq!(loaded.rng, sim.rng);
        assert_eq!(loaded.fixtures.furniture_list(), sim.fixtures.furniture_list());
        assert_eq!(loaded.fixtures.animal_list(), sim.fixtures.animal_list());
        assert_eq!(loaded.grid.fixture_cost(CellPos::new(12, 2, 0)), sim.grid.fixture_cost(CellPos::new(12, 2, 0)));
    }

    #[test]
    fn test_item_high_water_survives_reload() {
        let mut sim = populated();
        let extra: Vec<_> = (0..5)
            .filter_map(|i| sim.items.spawn_default(ItemType::Red, CellPos::new(i, 14, 0), 1))
            .collect();
        let mark = sim.items.high_water_mark();
        for id in extra {
            sim.items.delete_item(id);
        }
        let mut buffer = Vec::new();
        save_sim(&mut buffer, &sim).expect("save");
        let loaded = load_sim(&buffer[..]).expect("load");
        assert_eq!(loaded.items.high_water_mark(), mark);
        assert!(loaded.items.len() < mark);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buffer = Vec::new();
        bincode::serialize_into(&mut buffer, &SaveHeader { magic: 0xDEAD_BEEF, version: SAVE_VERSION }).unwrap();
        assert!(matches!(load_sim(&buffer[..]), Err(SaveError::BadMagic(0xDEAD_BEEF))));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut buffer = Vec::new();
        bincode::serialize_into(&mut buffer, &SaveHeader { magic: SAVE_MAGIC, version: 2 }).unwrap();
        match load_sim(&buffer[..]) {
            Err(SaveError::VersionMismatch { expected, found }) => {
                assert_eq!(expected, SAVE_VERSION);
                assert_eq!(found, 2);
            }
            other => panic!("expected version mismatch, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_magic_bytes_spell_kvan() {
        let sim = Sim::new(4, 4, 1, 1, SimFlags::deterministic_test());
        let mut buffer = Vec::new();
        save_sim(&mut buffer, &sim).unwrap();
        assert_eq!(&buffer[..4], b"KVAN");
    }

    #[test]
    fn test_truncated_body_is_an_error() {
        let sim = populated();
        let mut buffer = Vec::new();
        save_sim(&mut buffer, &sim).unwrap();
        buffer.truncate(buffer.len() / 2);
        assert!(load_sim(&buffer[..]).is_err());
    }
}
