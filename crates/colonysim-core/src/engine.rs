//! Simulation engine - the `Sim` context and its fixed-timestep tick.

use std::io::{Read, Write};

use colonysim_logic::balance::BalanceTable;
use colonysim_logic::config::SimFlags;
use colonysim_logic::constants::{MAX_FRAME_TIME, TICK_DT};
use colonysim_logic::rng::SimRng;
use serde::{Deserialize, Serialize};

use crate::audit::audit;
use crate::blueprint::BlueprintTable;
use crate::fixtures::Fixtures;
use crate::items::ItemPool;
use crate::jobs::{dispatch, step_jobs, JobPool};
use crate::layers::{layers_tick, LayerState};
use crate::movers::{invalidate_paths_through, service_repaths, update_movers, MoverGrid, MoverPool, RepathQueue};
use crate::needs::needs_tick;
use crate::path::Pathfinder;
use crate::persistence::{load_sim, save_sim, SaveError};
use crate::stockpile::StockpileTable;
use crate::world::Grid;
use crate::zones::GatherZones;

/// Tick counter and elapsed game time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimClock {
    pub tick: u64,
    pub game_seconds: f64,
}

impl SimClock {
    /// Game hour `[0, 24)` of the current tick.
    pub fn hour_of_day(&self, balance: &BalanceTable) -> f32 {
        balance.hour_of_day(self.game_seconds)
    }

    pub fn is_night(&self, balance: &BalanceTable) -> bool {
        balance.is_night(self.game_seconds)
    }

    /// Whole game days elapsed.
    pub fn day(&self, balance: &BalanceTable) -> u64 {
        (self.game_seconds / balance.day_length as f64) as u64
    }
}

/// Running counters, for the CLI summary and for tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimStats {
    pub repaths: u64,
    pub path_failures: u64,
    pub jobs_created: u64,
    pub jobs_completed: u64,
    pub jobs_cancelled: u64,
    pub unreachable_marks: u64,
    pub deaths: u64,
}

/// The whole simulation state. Every subsystem takes `&mut Sim`.
pub struct Sim {
    pub grid: Grid,
    pub items: ItemPool,
    pub stockpiles: StockpileTable,
    pub zones: GatherZones,
    pub blueprints: BlueprintTable,
    pub fixtures: Fixtures,
    pub movers: MoverPool,
    pub jobs: JobPool,
    pub pathfinder: Pathfinder,
    pub mover_grid: MoverGrid,
    pub repath_queue: RepathQueue,
    pub layers: LayerState,
    pub clock: SimClock,
    pub stats: SimStats,
    pub rng: SimRng,
    pub flags: SimFlags,
    pub balance: BalanceTable,

    // Fixed-step accumulator (real seconds)
    accumulator: f32,
    time_scale: f32,
}

impl Sim {
    /// An empty world of the given size. Level 0 is open ground.
    pub fn new(width: i32, height: i32, depth: i32, seed: u64, flags: SimFlags) -> Self {
        let mut grid = Grid::new(width, height, depth);
        grid.mark_all_dirty();
        log::debug!("sim created {}x{}x{} seed {}", grid.width, grid.height, grid.depth, seed);
        Self {
            grid,
            items: ItemPool::new(),
            stockpiles: StockpileTable::new(),
            zones: GatherZones::new(),
            blueprints: BlueprintTable::new(),
            fixtures: Fixtures::new(),
            movers: MoverPool::new(),
            jobs: JobPool::default(),
            pathfinder: Pathfinder::new(),
            mover_grid: MoverGrid::new(),
            repath_queue: RepathQueue::default(),
            layers: LayerState::default(),
            clock: SimClock::default(),
            stats: SimStats::default(),
            rng: SimRng::new(seed),
            flags,
            balance: BalanceTable::default(),
            accumulator: 0.0,
            time_scale: 1.0,
        }
    }

    /// Rebuild the ground-item index and the stockpile ground cache that
    /// the work-givers search.
    pub fn rebuild_spatial(&mut self) {
        let (w, h, d) = (self.grid.width, self.grid.height, self.grid.depth);
        self.items.rebuild_spatial(w, h, d);
        self.stockpiles.rebuild_ground_cache(&self.items);
    }

    /// Advance one fixed step of `TICK_DT` game-seconds.
    pub fn tick(&mut self) {
        let dt = TICK_DT;

        // Terrain edits made since the last tick
        let changed = self.grid.take_changed_cells();
        if !changed.is_empty() {
            invalidate_paths_through(self, &changed);
        }

        self.rebuild_spatial();
        self.items.items_tick(dt, &self.balance);

        if self.flags.layers_enabled {
            layers_tick(self, dt);
        }

        // Needs and freetime, then work
        needs_tick(self, dt);
        dispatch(self);
        step_jobs(self, dt);

        // Motion and the repath budget
        update_movers(self, dt);
        service_repaths(self);

        self.clock.tick += 1;
        self.clock.game_seconds += dt as f64;

        if self.flags.runtime_audit {
            for v in audit(self) {
                log::warn!("audit at tick {}: {}", self.clock.tick, v);
            }
        }
    }

    /// Feed real elapsed time and run as many fixed ticks as it covers.
    /// Frame time is capped at `MAX_FRAME_TIME` so a stall cannot spiral.
    /// Returns the number of ticks run.
    pub fn update(&mut self, real_seconds: f32) -> u32 {
        self.accumulator += (real_seconds * self.time_scale).min(MAX_FRAME_TIME * self.time_scale.max(1.0));
        let mut ticks = 0;
        while self.accumulator >= TICK_DT {
            self.tick();
            self.accumulator -= TICK_DT;
            ticks += 1;
        }
        ticks
    }

    /// Run exactly `n` ticks.
    pub fn run_ticks(&mut self, n: u64) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Set the time scale (1.0 = real-time)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Save the simulation to a writer
    pub fn save<W: Write>(&self, writer: W) -> Result<(), SaveError> {
        save_sim(writer, self)
    }

    /// Load a simulation from a reader
    pub fn load<R: Read>(reader: R) -> Result<Self, SaveError> {
        load_sim(reader)
    }
}

impl Default for Sim {
    fn default() -> Self {
        Self::new(32, 32, 4, 0, SimFlags::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CellPos;
    use crate::movers::spawn_mover;

    #[test]
    fn test_engine_creation() {
        let sim = Sim::default();
        assert_eq!(sim.clock.tick, 0);
        assert_eq!(sim.movers.len(), 0);
        assert!(sim.grid.has_dirty_chunks());
    }

    #[test]
    fn test_time_scale() {
        let mut sim = Sim::new(8, 8, 1, 1, SimFlags::deterministic_test());
        sim.set_time_scale(2.0);
        assert_eq!(sim.time_scale(), 2.0);
        sim.set_time_scale(-1.0);
        assert_eq!(sim.time_scale(), 0.0);
        assert_eq!(sim.update(0.1), 0);
    }

    #[test]
    fn test_update_runs_fixed_steps() {
        let mut sim = Sim::new(8, 8, 1, 1, SimFlags::deterministic_test());
        // Six ticks and a bit.
        let ran = sim.update(6.5 * TICK_DT);
        assert_eq!(ran, 6);
        assert_eq!(sim.clock.tick, 6);
        assert!((sim.clock.game_seconds - 6.0 * TICK_DT as f64).abs() < 1e-6);
    }

    #[test]
    fn test_frame_time_is_capped() {
        let mut sim = Sim::new(8, 8, 1, 1, SimFlags::deterministic_test());
        let ran = sim.update(10.0);
        assert!(ran as f32 <= MAX_FRAME_TIME / TICK_DT + 1.0);
    }

    #[test]
    fn test_terrain_edit_invalidates_path() {
        let mut sim = Sim::new(12, 3, 1, 1, SimFlags::deterministic_test());
        let m = spawn_mover(&mut sim, CellPos::new(0, 1, 0)).unwrap();
        sim.movers.get_mut(m).unwrap().goal = CellPos::new(11, 1, 0);
        sim.movers.get_mut(m).unwrap().needs_repath = true;
        sim.tick();
        sim.tick();
        assert!(sim.movers.get(m).unwrap().has_path());
        sim.grid.set_kind(CellPos::new(6, 1, 0), crate::world::CellKind::Wall);
        sim.tick();
        let mv = sim.movers.get(m).unwrap();
        assert!(mv.needs_repath || !mv.remaining_path().any(|p| *p == CellPos::new(6, 1, 0)));
    }
}
