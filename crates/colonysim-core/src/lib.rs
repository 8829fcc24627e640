//! ColonySim Core - Voxel Colony Simulation Engine
//!
//! A fixed-timestep simulation of colonists ("movers") living in a 3D voxel
//! world: they path across levels through ladders and ramps, haul items into
//! stockpiles, dig and build, craft at workshops, and look after their own
//! hunger, thirst, energy and body temperature.
//!
//! # Architecture
//!
//! All state lives in one [`engine::Sim`] value. Hot pools (items, movers,
//! jobs, stockpiles, blueprints) are generational `slotmap` arenas so stale
//! ids are detected rather than aliased. Furniture, workshops and animals
//! are `hecs` entities. Every system is a free function taking `&mut Sim`,
//! run in a fixed order by [`engine::Sim::tick`].
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`world`] | Cell grid, chunk dirty tracking, terrain edits |
//! | [`path`] | A*, HPA* over chunk entrances, string pulling |
//! | [`movers`] | Colonists, path following, avoidance, repath budget |
//! | [`items`] | Item pool, stacks, containers, spatial index |
//! | [`stockpile`] | Stockpiles, slot reservations, ground cache |
//! | [`blueprint`] | Multi-stage construction sites |
//! | [`zones`] | Gather zones |
//! | [`fixtures`] | Furniture, workshops, animals (ECS) |
//! | [`jobs`] | Job pool, dispatcher, job drivers |
//! | [`needs`] | Need drain, deprivation, freetime |
//! | [`layers`] | Fluid, fire, temperature, weather, plants, animals |
//! | [`audit`] | Cross-entity consistency checks |
//! | [`persistence`] | Versioned binary save files |
//!
//! # Example
//!
//! ```rust,no_run
//! use colonysim_core::prelude::*;
//!
//! let mut sim = Sim::new(64, 64, 8, 42, SimFlags::default());
//! spawn_mover(&mut sim, CellPos::new(4, 4, 0));
//!
//! loop {
//!     sim.update(1.0 / 60.0);
//! }
//! ```

pub mod audit;
pub mod blueprint;
pub mod common;
pub mod engine;
pub mod fixtures;
pub mod items;
pub mod jobs;
pub mod layers;
pub mod movers;
pub mod needs;
pub mod path;
pub mod persistence;
pub mod stockpile;
pub mod world;
pub mod zones;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::audit::{audit, Check, Violation};
    pub use crate::common::{CellPos, Direction, Vec3};
    pub use crate::engine::{Sim, SimClock, SimStats};
    pub use crate::items::{ItemId, ItemState};
    pub use crate::jobs::{JobId, JobKind};
    pub use crate::movers::{spawn_mover, MoverId};
    pub use crate::persistence::SaveError;
    pub use crate::stockpile::StockpileId;
    pub use crate::world::{CellKind, Grid};
    pub use colonysim_logic::config::SimFlags;
}
