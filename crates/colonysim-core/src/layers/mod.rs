//! Environment simulation layers.
//!
//! Each layer reads and writes the grid (and, for animals, the fixture
//! world) on its own throttle. Animals move every tick; the cellular layers
//! run on game-time intervals, slowest last.
//!
//! | Layer | Interval | Effect |
//! |-------|----------|--------|
//! | animals | every tick | wander inside their radius |
//! | fluid | `FLUID_INTERVAL` | water falls, spreads, wets and evaporates |
//! | fire | `FIRE_INTERVAL` | burns fuel, spreads, smokes |
//! | temperature | `TEMPERATURE_INTERVAL` | cells relax toward ambient plus fire heat |
//! | weather | `WEATHER_INTERVAL` | clear, rain and cold-snap transitions |
//! | plants | `PLANT_INTERVAL` | grass, saplings, bushes, trampling |

pub mod animals;
pub mod fire;
pub mod fluid;
pub mod plants;
pub mod temperature;
pub mod weather;

use colonysim_logic::constants::layers::{
    FIRE_INTERVAL, FLUID_INTERVAL, PLANT_INTERVAL, TEMPERATURE_INTERVAL, WEATHER_INTERVAL,
};
use serde::{Deserialize, Serialize};

pub use fire::ignite;
pub use weather::{Weather, WeatherKind};

use crate::engine::Sim;

/// Weather plus the game time each layer last ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerState {
    pub weather: Weather,
    last_fluid: f64,
    last_fire: f64,
    last_temperature: f64,
    last_weather: f64,
    last_plants: f64,
}

/// Advance every layer whose interval has elapsed.
pub fn layers_tick(sim: &mut Sim, dt: f32) {
    let now = sim.clock.game_seconds;

    // L0: animals (every tick)
    animals::animals_tick(sim, dt);

    // L1: fluid
    if now - sim.layers.last_fluid >= FLUID_INTERVAL {
        fluid::fluid_tick(sim);
        sim.layers.last_fluid = now;
    }

    // L1: fire
    if now - sim.layers.last_fire >= FIRE_INTERVAL {
        fire::fire_tick(sim);
        sim.layers.last_fire = now;
    }

    // L2: temperature
    if now - sim.layers.last_temperature >= TEMPERATURE_INTERVAL {
        temperature::temperature_tick(sim);
        sim.layers.last_temperature = now;
    }

    // L3: weather
    if now - sim.layers.last_weather >= WEATHER_INTERVAL {
        weather::weather_tick(sim);
        sim.layers.last_weather = now;
    }

    // L3: plants
    if now - sim.layers.last_plants >= PLANT_INTERVAL {
        plants::plants_tick(sim);
        sim.layers.last_plants = now;
    }
}
