//! Time budget balance table.
//!
//! Every rate in the needs model is expressed in game-hours and converted to
//! per-game-second rates through `day_length` (real seconds per 24 game
//! hours). Changing `day_length` never changes how many game-hours a need
//! lasts, only how many seconds those hours take.

use serde::{Deserialize, Serialize};

/// Single source of truth for need budgets and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceTable {
    /// Real seconds per in-game day.
    pub day_length: f32,

    // Budgets (game-hours)
    pub work_hours_per_day: f32,
    pub sleep_hours_in_bed: f32,
    pub sleep_hours_on_ground: f32,
    pub hours_to_starve: f32,
    pub hours_to_dehydrate: f32,
    pub hours_to_exhaust_working: f32,
    pub hours_to_exhaust_idle: f32,
    pub eating_duration_hours: f32,
    pub drinking_duration_hours: f32,
    /// Game-hours at zero hunger or thirst before a mover dies.
    pub starvation_grace_hours: f32,

    // Thresholds (0 = empty, 1 = full)
    pub hunger_seek_threshold: f32,
    pub hunger_critical_threshold: f32,
    pub thirst_seek_threshold: f32,
    pub thirst_critical_threshold: f32,
    pub energy_tired_threshold: f32,
    pub energy_exhausted_threshold: f32,
    pub energy_wake_threshold: f32,

    // Multipliers
    pub carrying_energy_mult: f32,
    pub night_energy_mult: f32,

    // Body temperature (°C per game-hour)
    pub body_temp_cooling_rate_per_gh: f32,
    pub body_temp_warming_rate_per_gh: f32,
    /// Extra effective ambient (°C) at full hunger.
    pub metabolic_heat_bonus: f32,

    // Freetime timeouts (game-hours)
    pub food_seek_timeout_gh: f32,
    pub rest_seek_timeout_gh: f32,
    pub drink_seek_timeout_gh: f32,
    pub freetime_cooldown_gh: f32,
}

impl Default for BalanceTable {
    fn default() -> Self {
        Self {
            day_length: 720.0,
            work_hours_per_day: 14.0,
            sleep_hours_in_bed: 7.0,
            sleep_hours_on_ground: 23.0,
            hours_to_starve: 8.0,
            hours_to_dehydrate: 12.0,
            hours_to_exhaust_working: 16.0,
            hours_to_exhaust_idle: 28.0,
            eating_duration_hours: 0.5,
            drinking_duration_hours: 0.25,
            starvation_grace_hours: 48.0,
            hunger_seek_threshold: 0.3,
            hunger_critical_threshold: 0.1,
            thirst_seek_threshold: 0.3,
            thirst_critical_threshold: 0.1,
            energy_tired_threshold: 0.3,
            energy_exhausted_threshold: 0.1,
            energy_wake_threshold: 0.8,
            carrying_energy_mult: 1.25,
            night_energy_mult: 1.2,
            body_temp_cooling_rate_per_gh: 2.0,
            body_temp_warming_rate_per_gh: 4.0,
            metabolic_heat_bonus: 10.0,
            food_seek_timeout_gh: 2.0,
            rest_seek_timeout_gh: 2.0,
            drink_seek_timeout_gh: 2.0,
            freetime_cooldown_gh: 0.5,
        }
    }
}

impl BalanceTable {
    /// Parse a balance table from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_day_length(mut self, day_length: f32) -> Self {
        self.day_length = day_length;
        self
    }

    /// Convert a duration in game-hours into game-seconds.
    pub fn game_hours_to_game_seconds(&self, game_hours: f32) -> f32 {
        game_hours * (self.day_length / 24.0)
    }

    /// Convert a rate per game-hour into a rate per game-second.
    pub fn rate_per_game_second(&self, rate_per_game_hour: f32) -> f32 {
        rate_per_game_hour * 24.0 / self.day_length
    }

    pub fn hunger_drain_per_gh(&self) -> f32 {
        1.0 / self.hours_to_starve
    }

    pub fn thirst_drain_per_gh(&self) -> f32 {
        1.0 / self.hours_to_dehydrate
    }

    pub fn energy_drain_working_per_gh(&self) -> f32 {
        1.0 / self.hours_to_exhaust_working
    }

    pub fn energy_drain_idle_per_gh(&self) -> f32 {
        1.0 / self.hours_to_exhaust_idle
    }

    /// Energy regained per game-hour sleeping in a bed. A full night in bed
    /// takes an exhausted mover exactly to the wake threshold.
    pub fn bed_recovery_per_gh(&self) -> f32 {
        (self.energy_wake_threshold - self.energy_exhausted_threshold) / self.sleep_hours_in_bed
    }

    pub fn ground_recovery_per_gh(&self) -> f32 {
        (self.energy_wake_threshold - self.energy_exhausted_threshold) / self.sleep_hours_on_ground
    }

    pub fn eating_duration_seconds(&self) -> f32 {
        self.game_hours_to_game_seconds(self.eating_duration_hours)
    }

    pub fn drinking_duration_seconds(&self) -> f32 {
        self.game_hours_to_game_seconds(self.drinking_duration_hours)
    }

    /// Time of day in game-hours `[0, 24)` for an elapsed game-second count.
    pub fn hour_of_day(&self, game_seconds: f64) -> f32 {
        let day = self.day_length as f64;
        ((game_seconds % day) / day * 24.0) as f32
    }

    pub fn is_night(&self, game_seconds: f64) -> bool {
        let hour = self.hour_of_day(game_seconds);
        !(6.0..20.0).contains(&hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starvation_budget_is_day_length_independent() {
        for day_length in [24.0, 60.0, 720.0] {
            let table = BalanceTable::default().with_day_length(day_length);
            let total = table.rate_per_game_second(table.hunger_drain_per_gh())
                * table.game_hours_to_game_seconds(table.hours_to_starve);
            assert!((total - 1.0).abs() < 1e-5, "day_length {}: {}", day_length, total);
        }
    }

    #[test]
    fn test_bed_recovery_spans_exhausted_to_wake() {
        for day_length in [24.0, 60.0, 720.0] {
            let table = BalanceTable::default().with_day_length(day_length);
            let recovered = table.rate_per_game_second(table.bed_recovery_per_gh())
                * table.game_hours_to_game_seconds(table.sleep_hours_in_bed);
            let expected = table.energy_wake_threshold - table.energy_exhausted_threshold;
            assert!((recovered - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_starve_time_at_sixty_second_day() {
        let table = BalanceTable::default().with_day_length(60.0);
        let seconds = table.game_hours_to_game_seconds(table.hours_to_starve);
        assert!((seconds - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_night_detection() {
        let table = BalanceTable::default().with_day_length(24.0);
        assert!(table.is_night(2.0));
        assert!(!table.is_night(12.0));
        assert!(table.is_night(21.5));
    }

    #[test]
    fn test_json_overrides_keep_defaults() {
        let table = BalanceTable::from_json_str(r#"{"day_length": 60.0}"#).unwrap();
        assert_eq!(table.day_length, 60.0);
        assert_eq!(table.hours_to_starve, 8.0);
    }
}
