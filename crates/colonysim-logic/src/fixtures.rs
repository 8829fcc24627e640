//! Furniture, workshop and animal definitions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FurnitureType {
    Bed,
    LeafPile,
    Chair,
}

#[derive(Debug, Clone, Copy)]
pub struct FurnitureDef {
    pub name: &'static str,
    /// Blocking furniture makes its cell unwalkable.
    pub blocking: bool,
    /// Extra path cost for walking across the cell (even).
    pub move_cost_penalty: u8,
    /// 0 = rest like on bare ground, 1 = full bed recovery.
    pub rest_rate: f32,
}

impl FurnitureType {
    pub const ALL: [FurnitureType; 3] = [FurnitureType::Bed, FurnitureType::LeafPile, FurnitureType::Chair];

    pub fn def(self) -> &'static FurnitureDef {
        match self {
            FurnitureType::Bed => &FurnitureDef {
                name: "bed",
                blocking: false,
                move_cost_penalty: 4,
                rest_rate: 1.0,
            },
            FurnitureType::LeafPile => &FurnitureDef {
                name: "leaf pile",
                blocking: false,
                move_cost_penalty: 2,
                rest_rate: 0.5,
            },
            FurnitureType::Chair => &FurnitureDef {
                name: "chair",
                blocking: false,
                move_cost_penalty: 2,
                rest_rate: 0.2,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkshopType {
    Campfire,
    Sawmill,
    Kiln,
    Loom,
    Tailor,
    Workbench,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkshopDef {
    pub name: &'static str,
    pub width: i32,
    pub height: i32,
    /// Default radius searched for ingredients when no stockpile is linked.
    pub search_radius: i32,
}

impl WorkshopType {
    pub const ALL: [WorkshopType; 6] = [
        WorkshopType::Campfire,
        WorkshopType::Sawmill,
        WorkshopType::Kiln,
        WorkshopType::Loom,
        WorkshopType::Tailor,
        WorkshopType::Workbench,
    ];

    pub fn def(self) -> &'static WorkshopDef {
        match self {
            WorkshopType::Campfire => &WorkshopDef {
                name: "campfire",
                width: 1,
                height: 1,
                search_radius: 12,
            },
            WorkshopType::Sawmill => &WorkshopDef {
                name: "sawmill",
                width: 2,
                height: 1,
                search_radius: 20,
            },
            WorkshopType::Kiln => &WorkshopDef {
                name: "kiln",
                width: 2,
                height: 2,
                search_radius: 20,
            },
            WorkshopType::Loom => &WorkshopDef {
                name: "loom",
                width: 2,
                height: 1,
                search_radius: 20,
            },
            WorkshopType::Tailor => &WorkshopDef {
                name: "tailor",
                width: 2,
                height: 1,
                search_radius: 20,
            },
            WorkshopType::Workbench => &WorkshopDef {
                name: "workbench",
                width: 1,
                height: 1,
                search_radius: 16,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimalKind {
    Rabbit,
    Deer,
}

#[derive(Debug, Clone, Copy)]
pub struct AnimalDef {
    pub name: &'static str,
    /// Tiles per second.
    pub speed: f32,
    /// Seconds between wander goals.
    pub wander_interval: f32,
    pub wander_radius: i32,
}

impl AnimalKind {
    pub fn def(self) -> &'static AnimalDef {
        match self {
            AnimalKind::Rabbit => &AnimalDef {
                name: "rabbit",
                speed: 2.5,
                wander_interval: 3.0,
                wander_radius: 4,
            },
            AnimalKind::Deer => &AnimalDef {
                name: "deer",
                speed: 2.0,
                wander_interval: 5.0,
                wander_radius: 6,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_penalties_are_even() {
        for f in FurnitureType::ALL {
            assert_eq!(f.def().move_cost_penalty % 2, 0, "{:?}", f);
        }
    }

    #[test]
    fn test_bed_rests_best() {
        let best = FurnitureType::ALL
            .iter()
            .max_by(|a, b| a.def().rest_rate.total_cmp(&b.def().rest_rate))
            .copied();
        assert_eq!(best, Some(FurnitureType::Bed));
    }
}
