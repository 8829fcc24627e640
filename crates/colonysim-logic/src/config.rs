//! Runtime flag set.
//!
//! Every toggle the engine consults at tick time lives here. The set is
//! persisted with the world and can be loaded from JSON, with any missing
//! field falling back to its default.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PathAlgorithm {
    AStar,
    #[default]
    Hpa,
}

/// Avoidance and wall-repulsion strengths used by mover steering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringTuning {
    /// Separation strength when the 3x3 block around a mover is open.
    pub avoid_strength_open: f32,
    /// Separation strength near walls.
    pub avoid_strength_closed: f32,
}

impl Default for SteeringTuning {
    fn default() -> Self {
        Self {
            avoid_strength_open: 0.5,
            avoid_strength_closed: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimFlags {
    // Pathing
    pub use_string_pulling: bool,
    pub use_knot_fix: bool,
    pub mover_path_algorithm: PathAlgorithm,
    pub prefer_different_z: bool,

    // Steering
    pub use_wall_repulsion: bool,
    pub wall_repulsion_strength: f32,
    pub use_wall_sliding: bool,
    pub use_mover_avoidance: bool,
    pub use_directional_avoidance: bool,
    pub allow_falling_from_avoidance: bool,
    pub steering: SteeringTuning,

    // Determinism knobs
    pub use_randomized_cooldowns: bool,
    pub use_staggered_updates: bool,

    // Behaviour
    pub endless_mover_mode: bool,
    pub tool_requirements_enabled: bool,
    pub hunger_enabled: bool,
    pub energy_enabled: bool,
    pub thirst_enabled: bool,
    pub body_temp_enabled: bool,

    // Layers
    pub layers_enabled: bool,

    /// Run the state audit after every tick and log violations.
    pub runtime_audit: bool,
}

impl Default for SimFlags {
    fn default() -> Self {
        Self {
            use_string_pulling: false,
            use_knot_fix: true,
            mover_path_algorithm: PathAlgorithm::Hpa,
            prefer_different_z: false,
            use_wall_repulsion: true,
            wall_repulsion_strength: 0.5,
            use_wall_sliding: true,
            use_mover_avoidance: true,
            use_directional_avoidance: true,
            allow_falling_from_avoidance: false,
            steering: SteeringTuning::default(),
            use_randomized_cooldowns: true,
            use_staggered_updates: true,
            endless_mover_mode: false,
            tool_requirements_enabled: false,
            hunger_enabled: true,
            energy_enabled: true,
            thirst_enabled: true,
            body_temp_enabled: true,
            layers_enabled: true,
            runtime_audit: false,
        }
    }
}

impl SimFlags {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Fixed cooldowns and no staggering, no needs or layers. Used by tests
    /// that exercise job flow in isolation.
    pub fn deterministic_test() -> Self {
        Self {
            use_randomized_cooldowns: false,
            use_staggered_updates: false,
            hunger_enabled: false,
            energy_enabled: false,
            thirst_enabled: false,
            body_temp_enabled: false,
            layers_enabled: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let flags = SimFlags::default();
        assert!(!flags.use_string_pulling);
        assert_eq!(flags.mover_path_algorithm, PathAlgorithm::Hpa);
    }

    #[test]
    fn test_partial_json() {
        let flags =
            SimFlags::from_json_str(r#"{"mover_path_algorithm": "AStar", "hunger_enabled": false}"#)
                .unwrap();
        assert_eq!(flags.mover_path_algorithm, PathAlgorithm::AStar);
        assert!(!flags.hunger_enabled);
        assert!(flags.energy_enabled);
    }

    #[test]
    fn test_round_trip_json() {
        let flags = SimFlags::deterministic_test();
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(SimFlags::from_json_str(&json).unwrap(), flags);
    }
}
