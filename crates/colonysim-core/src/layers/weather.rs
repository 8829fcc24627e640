//! Weather state and the ambient temperature it implies.

use colonysim_logic::balance::BalanceTable;
use colonysim_logic::constants::layers::{
    BASE_AMBIENT, COLD_SNAP_CHILL, COLD_SNAP_START_CHANCE, COLD_SNAP_STOP_CHANCE, DAILY_SWING, RAIN_CHILL,
    RAIN_START_CHANCE, RAIN_STOP_CHANCE, RAIN_WET_CHANCE,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::common::CellPos;
use crate::engine::Sim;
use crate::world::DEFAULT_TEMP;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeatherKind {
    #[default]
    Clear,
    Rain,
    ColdSnap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub kind: WeatherKind,
    /// Open-air temperature (°C).
    pub ambient: i16,
}

impl Default for Weather {
    fn default() -> Self {
        Self {
            kind: WeatherKind::Clear,
            ambient: DEFAULT_TEMP,
        }
    }
}

/// Ambient temperature for a time of day and weather. Warmest at 15:00.
pub fn ambient_at(balance: &BalanceTable, game_seconds: f64, kind: WeatherKind) -> i16 {
    let hour = balance.hour_of_day(game_seconds);
    let phase = (hour - 9.0) / 24.0 * std::f32::consts::TAU;
    let chill = match kind {
        WeatherKind::Clear => 0.0,
        WeatherKind::Rain => RAIN_CHILL,
        WeatherKind::ColdSnap => COLD_SNAP_CHILL,
    };
    (BASE_AMBIENT + DAILY_SWING * phase.sin() - chill).round() as i16
}

pub fn weather_tick(sim: &mut Sim) {
    let roll: f32 = sim.rng.gen();
    let old = sim.layers.weather.kind;
    let next = match old {
        WeatherKind::Clear if roll < COLD_SNAP_START_CHANCE => WeatherKind::ColdSnap,
        WeatherKind::Clear if roll < COLD_SNAP_START_CHANCE + RAIN_START_CHANCE => WeatherKind::Rain,
        WeatherKind::Rain if roll < RAIN_STOP_CHANCE => WeatherKind::Clear,
        WeatherKind::ColdSnap if roll < COLD_SNAP_STOP_CHANCE => WeatherKind::Clear,
        k => k,
    };
    if next != old {
        log::info!("weather: {:?} -> {:?}", old, next);
    }
    sim.layers.weather.kind = next;
    sim.layers.weather.ambient = ambient_at(&sim.balance, sim.clock.game_seconds, next);

    if next == WeatherKind::Rain {
        rain(sim);
    }
}

/// Wet the highest open cell of each column and douse fire there.
fn rain(sim: &mut Sim) {
    for y in 0..sim.grid.height {
        for x in 0..sim.grid.width {
            let Some(p) = landing_cell(sim, x, y) else {
                continue;
            };
            if sim.rng.gen::<f32>() >= RAIN_WET_CHANCE {
                continue;
            }
            let wet = sim.grid.wetness(p);
            sim.grid.set_wetness(p, (wet + 1).min(3));
            sim.grid.set_fire(p, 0);
        }
    }
}

/// Where rain falling down column (x, y) comes to rest.
fn landing_cell(sim: &Sim, x: i32, y: i32) -> Option<CellPos> {
    let g = &sim.grid;
    for z in (0..g.depth).rev() {
        let p = CellPos::new(x, y, z);
        if g.has_floor(p) {
            return Some(p);
        }
        if g.is_solid(p) {
            let above = p.offset(0, 0, 1);
            return g.in_bounds(above).then_some(above);
        }
    }
    Some(CellPos::new(x, y, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::CellKind;
    use colonysim_logic::config::SimFlags;

    #[test]
    fn test_ambient_follows_the_day() {
        let b = BalanceTable::default();
        let hour = b.game_hours_to_game_seconds(1.0) as f64;
        let afternoon = ambient_at(&b, 15.0 * hour, WeatherKind::Clear);
        let night = ambient_at(&b, 3.0 * hour, WeatherKind::Clear);
        assert!(afternoon > night);
        assert!(ambient_at(&b, 15.0 * hour, WeatherKind::ColdSnap) < afternoon);
    }

    #[test]
    fn test_rain_lands_on_roof_not_below() {
        let mut sim = Sim::new(1, 1, 3, 1, SimFlags::deterministic_test());
        sim.grid.set_kind(CellPos::new(0, 0, 1), CellKind::Wall);
        assert_eq!(landing_cell(&sim, 0, 0), Some(CellPos::new(0, 0, 2)));
        sim.layers.weather.kind = WeatherKind::Rain;
        for _ in 0..200 {
            rain(&mut sim);
        }
        assert!(sim.grid.wetness(CellPos::new(0, 0, 2)) > 0);
        assert_eq!(sim.grid.wetness(CellPos::new(0, 0, 0)), 0);
    }

    #[test]
    fn test_weather_eventually_changes() {
        let mut sim = Sim::new(2, 2, 1, 3, SimFlags::deterministic_test());
        let mut seen_other = false;
        for _ in 0..1000 {
            weather_tick(&mut sim);
            seen_other |= sim.layers.weather.kind != WeatherKind::Clear;
        }
        assert!(seen_other);
    }
}
