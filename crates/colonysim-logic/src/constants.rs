//! Compile-time limits and timing constants.
//!
//! Plain `const` values with no engine dependency. The core engine and the
//! host binary both read these.

/// Fixed simulation timestep (seconds). 60 ticks per second.
pub const TICK_DT: f32 = 1.0 / 60.0;

/// Upper bound on accumulated real time processed by one `update` call.
/// Prevents a spiral of death after a long stall.
pub const MAX_FRAME_TIME: f32 = 0.25;

pub mod limits {
    pub const MAX_GRID_W: i32 = 512;
    pub const MAX_GRID_H: i32 = 512;
    pub const MAX_GRID_D: i32 = 32;

    pub const MAX_ITEMS: usize = 25_000;
    pub const MAX_MOVERS: usize = 10_000;
    pub const MAX_JOBS: usize = 10_000;
    pub const MAX_STOCKPILES: usize = 64;
    pub const MAX_BLUEPRINTS: usize = 1_000;
    pub const MAX_GATHER_ZONES: usize = 32;

    /// Longest path a mover stores. Longer paths are truncated at the goal end.
    pub const MAX_MOVER_PATH: usize = 1024;

    pub const DEFAULT_CHUNK_W: i32 = 16;
    pub const DEFAULT_CHUNK_H: i32 = 16;
}

pub mod mover {
    /// Walking speed in tiles per second.
    pub const MOVER_SPEED: f32 = 4.0;
    /// Radius inside which other movers push this one away.
    pub const MOVER_AVOID_RADIUS: f32 = 0.6;
    /// Distance at which a waypoint counts as reached.
    pub const ARRIVAL_RADIUS: f32 = 0.05;

    pub const STUCK_CHECK_INTERVAL: f32 = 0.5;
    /// Minimum distance a mover must cover per stuck check to count as progress.
    pub const STUCK_MIN_PROGRESS: f32 = 0.1;
    pub const STUCK_REPATH_TIME: f32 = 2.0;
    /// A waypoint that stays current this long triggers a repath (knot fix).
    pub const KNOT_STUCK_TIME: f32 = 3.0;

    pub const MAX_REPATHS_PER_FRAME: usize = 10;
    pub const REPATH_COOLDOWN_FRAMES: u32 = 30;

    /// Seconds an item is skipped by work-givers after a failed path to it.
    pub const UNREACHABLE_COOLDOWN: f32 = 5.0;

    /// Speed multipliers applied in the motion step.
    pub const HUNGRY_SPEED_MULT: f32 = 0.7;
    pub const COLD_SPEED_MULT: f32 = 0.8;
    pub const CARRY_SPEED_MULT: f32 = 0.9;

    /// Body temperature below which a mover counts as cold.
    pub const HYPOTHERMIA_TEMP: f32 = 35.0;
    pub const NORMAL_BODY_TEMP: f32 = 37.0;
}

pub mod jobs {
    /// Seconds of work to dig one cell without a tool.
    pub const MINE_WORK_TIME: f32 = 3.0;
    pub const CHOP_WORK_TIME: f32 = 4.0;
    pub const HARVEST_WORK_TIME: f32 = 1.5;
    pub const PLANT_WORK_TIME: f32 = 2.0;
    pub const DECONSTRUCT_WORK_TIME: f32 = 2.5;
    pub const BUTCHER_WORK_TIME: f32 = 3.0;
    /// Work speed multiplier granted by a matching tool.
    pub const TOOL_SPEED_BONUS: f32 = 2.0;
    /// Chance each delivered material is refunded on cancel/deconstruct.
    pub const REFUND_CHANCE: f32 = 0.75;
    /// Candidates a work-giver path-checks before giving up for this tick.
    pub const MAX_CANDIDATES_PER_WORKGIVER: usize = 3;
    /// Distance within which a hunter can strike an animal.
    pub const HUNT_STRIKE_RANGE: f32 = 1.5;
    /// Raw meat and hides a butchered carcass yields.
    pub const CARCASS_MEAT_YIELD: u32 = 3;
    pub const CARCASS_HIDE_YIELD: u32 = 1;
    /// Thirst restored by one drink.
    pub const DRINK_THIRST_RESTORE: f32 = 0.6;
    /// Per-tick chance an idle mover with nothing to do picks a stroll goal.
    pub const IDLE_WANDER_CHANCE: f32 = 0.002;
    /// Tiles searched around a blocked cell for a drop spot off stockpiles.
    pub const DROP_SEARCH_RADIUS: i32 = 6;
    /// Tiles searched for standing water to drink.
    pub const WATER_SEARCH_RADIUS: i32 = 24;
    /// First ring radius of the nearest-ground-item search; it doubles until
    /// the nearest matches are settled or the map is covered.
    pub const ITEM_SEARCH_START_RADIUS: i32 = 8;
}

pub mod plants {
    /// Bush growth at which berries can be harvested.
    pub const BERRY_RIPE: u8 = 200;
    pub const BERRY_YIELD: u32 = 3;
    /// Sapling growth at which it becomes a tree.
    pub const SAPLING_MATURE: u8 = 250;
    /// Growth points added per plant update.
    pub const BUSH_GROWTH_STEP: u8 = 4;
    pub const SAPLING_GROWTH_STEP: u8 = 2;
    /// Chance per plant update that grass on a cell grows one stage.
    pub const GRASS_GROW_CHANCE: f32 = 0.05;
    /// Trunk height of a tree grown from a sapling.
    pub const TREE_HEIGHT: i32 = 3;
}

pub mod layers {
    /// Game-seconds between fluid updates.
    pub const FLUID_INTERVAL: f64 = 0.2;
    pub const FIRE_INTERVAL: f64 = 0.5;
    pub const TEMPERATURE_INTERVAL: f64 = 1.0;
    pub const WEATHER_INTERVAL: f64 = 5.0;
    pub const PLANT_INTERVAL: f64 = 2.0;

    pub const WATER_MAX: u8 = 7;
    /// Chance per fluid update that a level-1 puddle dries up.
    pub const EVAPORATION_CHANCE: f32 = 0.02;
    /// Chance per fluid update that a dry cell loses one wetness level.
    pub const DRYING_CHANCE: f32 = 0.01;

    pub const FIRE_MAX: u8 = 7;
    /// Level a newly ignited cell starts at.
    pub const FIRE_IGNITE_LEVEL: u8 = 3;
    pub const FIRE_SPREAD_CHANCE: f32 = 0.15;
    /// Chance per fire update that a burning cell consumes its fuel.
    pub const FIRE_CONSUME_CHANCE: f32 = 0.25;
    pub const SMOKE_FROM_FIRE: u8 = 4;

    /// Degrees added at full fire level.
    pub const FIRE_HEAT: i16 = 40;
    /// Fraction of the gap to the target temperature closed per update.
    pub const TEMPERATURE_RELAX: f32 = 0.2;
    /// Temperature underground cells settle at.
    pub const UNDERGROUND_TEMP: i16 = 12;

    /// Mean ambient temperature of a clear day.
    pub const BASE_AMBIENT: f32 = 15.0;
    /// Half the swing between the coldest and warmest hour.
    pub const DAILY_SWING: f32 = 6.0;
    pub const RAIN_CHILL: f32 = 3.0;
    pub const COLD_SNAP_CHILL: f32 = 20.0;
    pub const RAIN_START_CHANCE: f32 = 0.05;
    pub const COLD_SNAP_START_CHANCE: f32 = 0.01;
    pub const RAIN_STOP_CHANCE: f32 = 0.15;
    pub const COLD_SNAP_STOP_CHANCE: f32 = 0.05;
    /// Chance per weather update that rain wets an exposed cell.
    pub const RAIN_WET_CHANCE: f32 = 0.1;

    /// Chance per plant update that a trampled cell recovers.
    pub const TRAMPLE_RECOVER_CHANCE: f32 = 0.02;
}
