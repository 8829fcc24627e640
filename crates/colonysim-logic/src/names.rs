//! Mover name generation.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub given: String,
    pub family: String,
}

impl Name {
    pub fn new(given: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            given: given.into(),
            family: family.into(),
        }
    }

    pub fn full(&self) -> String {
        format!("{} {}", self.given, self.family)
    }
}

/// Generate a random gender and matching name.
pub fn generate_name(rng: &mut impl Rng) -> (Name, Gender) {
    let gender = if rng.gen_bool(0.5) {
        Gender::Female
    } else {
        Gender::Male
    };
    let pool = match gender {
        Gender::Female => FEMALE_NAMES,
        Gender::Male => MALE_NAMES,
    };
    let given = pool[rng.gen_range(0..pool.len())];
    let family = FAMILY_NAMES[rng.gen_range(0..FAMILY_NAMES.len())];
    (Name::new(given, family), gender)
}

static FEMALE_NAMES: &[&str] = &[
    "Asa", "Bera", "Dagny", "Edda", "Frida", "Gunna", "Hilde", "Ida", "Jora", "Kari", "Liv",
    "Moa", "Nanna", "Olva", "Ragna", "Sigrun", "Thora", "Una", "Vigdis", "Yrsa",
];

static MALE_NAMES: &[&str] = &[
    "Arn", "Bjorn", "Dain", "Egil", "Finn", "Gorm", "Hakon", "Ivar", "Kol", "Leif", "Magnus",
    "Njal", "Odd", "Rolf", "Sten", "Tor", "Ulf", "Vidar", "Orm", "Brand",
];

static FAMILY_NAMES: &[&str] = &[
    "Stonehand", "Ashford", "Deepdelver", "Oakenshield", "Coldwater", "Ironfoot", "Brightaxe",
    "Mossbeard", "Hollowell", "Greycliff", "Underhill", "Ravensworth", "Thornbury", "Marshgate",
    "Flintlock", "Kettleburn", "Redfern", "Blackbriar", "Longbarrow", "Saltmarsh",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SimRng;

    #[test]
    fn test_generate_name() {
        let mut rng = SimRng::new(11);
        let (name, _) = generate_name(&mut rng);
        assert!(!name.given.is_empty());
        assert!(!name.family.is_empty());
    }

    #[test]
    fn test_name_variety() {
        let mut rng = SimRng::new(5);
        let names: Vec<Name> = (0..100).map(|_| generate_name(&mut rng).0).collect();

        let unique_given: std::collections::HashSet<_> = names.iter().map(|n| &n.given).collect();
        let unique_family: std::collections::HashSet<_> = names.iter().map(|n| &n.family).collect();

        assert!(unique_given.len() > 10);
        assert!(unique_family.len() > 10);
    }

    #[test]
    fn test_seeded_names_repeat() {
        let a = generate_name(&mut SimRng::new(99));
        let b = generate_name(&mut SimRng::new(99));
        assert_eq!(a, b);
    }
}
