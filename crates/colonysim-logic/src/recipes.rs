//! Construction and workshop recipes.
//!
//! A construction recipe has 1-3 stages. Each stage lists up to three input
//! slots; a slot names up to five alternative item types, or accepts any
//! building material. The first delivery into a slot locks the chosen
//! alternative for the rest of that slot.

use serde::{Deserialize, Serialize};

use crate::fixtures::{FurnitureType, WorkshopType};
use crate::items::{flags, ItemType, MaterialType};

pub const MAX_STAGES: usize = 3;
pub const MAX_INPUTS_PER_STAGE: usize = 3;
pub const MAX_ALTERNATIVES: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct RecipeInput {
    pub alternatives: &'static [ItemType],
    /// Accept any item flagged as building material.
    pub any_building_mat: bool,
    pub count: u8,
}

impl RecipeInput {
    pub fn accepts(&self, item_type: ItemType) -> bool {
        if self.any_building_mat {
            item_type.has_flag(flags::BUILDING_MAT)
        } else {
            self.alternatives.contains(&item_type)
        }
    }

    /// Index of `item_type` among the alternatives. Any-building-material
    /// slots use the item type index so the lock still distinguishes types.
    pub fn alternative_index(&self, item_type: ItemType) -> Option<u8> {
        if self.any_building_mat {
            return item_type
                .has_flag(flags::BUILDING_MAT)
                .then_some(item_type as u8);
        }
        self.alternatives
            .iter()
            .position(|t| *t == item_type)
            .map(|i| i as u8)
    }

    /// Whether `item_type` matches an already-locked alternative.
    pub fn matches_locked(&self, chosen: u8, item_type: ItemType) -> bool {
        self.alternative_index(item_type) == Some(chosen)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecipeStage {
    pub inputs: &'static [RecipeInput],
    /// Seconds of build work once every slot is delivered.
    pub work_time: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultMaterial {
    Fixed(MaterialType),
    FromSlot { stage: u8, slot: u8 },
}

/// What a finished blueprint becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildResult {
    Wall,
    Floor,
    Ladder,
    Ramp,
    Door,
    Furniture(FurnitureType),
    Workshop(WorkshopType),
}

#[derive(Debug, Clone, Copy)]
pub struct ConstructionRecipe {
    pub name: &'static str,
    pub stages: &'static [RecipeStage],
    pub result: BuildResult,
    pub result_material: ResultMaterial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstructionId {
    Wall,
    ReinforcedWall,
    Floor,
    Ladder,
    Ramp,
    Door,
    Bed,
    Chair,
    Campfire,
    Sawmill,
    Kiln,
    Loom,
    Tailor,
    Workbench,
}

impl ConstructionId {
    pub const ALL: [ConstructionId; 14] = [
        ConstructionId::Wall,
        ConstructionId::ReinforcedWall,
        ConstructionId::Floor,
        ConstructionId::Ladder,
        ConstructionId::Ramp,
        ConstructionId::Door,
        ConstructionId::Bed,
        ConstructionId::Chair,
        ConstructionId::Campfire,
        ConstructionId::Sawmill,
        ConstructionId::Kiln,
        ConstructionId::Loom,
        ConstructionId::Tailor,
        ConstructionId::Workbench,
    ];

    pub fn recipe(self) -> &'static ConstructionRecipe {
        match self {
            ConstructionId::Wall => &WALL,
            ConstructionId::ReinforcedWall => &REINFORCED_WALL,
            ConstructionId::Floor => &FLOOR,
            ConstructionId::Ladder => &LADDER,
            ConstructionId::Ramp => &RAMP,
            ConstructionId::Door => &DOOR,
            ConstructionId::Bed => &BED,
            ConstructionId::Chair => &CHAIR,
            ConstructionId::Campfire => &CAMPFIRE,
            ConstructionId::Sawmill => &SAWMILL,
            ConstructionId::Kiln => &KILN,
            ConstructionId::Loom => &LOOM,
            ConstructionId::Tailor => &TAILOR,
            ConstructionId::Workbench => &WORKBENCH,
        }
    }

    /// Recipe that produces a given cell result, used for deconstruction refunds.
    pub fn for_result(result: BuildResult) -> Option<ConstructionId> {
        ConstructionId::ALL
            .into_iter()
            .find(|id| id.recipe().result == result)
    }
}

const fn input(alternatives: &'static [ItemType], count: u8) -> RecipeInput {
    RecipeInput {
        alternatives,
        any_building_mat: false,
        count,
    }
}

const fn any_mat(count: u8) -> RecipeInput {
    RecipeInput {
        alternatives: &[],
        any_building_mat: true,
        count,
    }
}

static WALL: ConstructionRecipe = ConstructionRecipe {
    name: "wall",
    stages: &[RecipeStage {
        inputs: &[any_mat(1)],
        work_time: 3.0,
    }],
    result: BuildResult::Wall,
    result_material: ResultMaterial::FromSlot { stage: 0, slot: 0 },
};

static REINFORCED_WALL: ConstructionRecipe = ConstructionRecipe {
    name: "reinforced wall",
    stages: &[
        RecipeStage {
            inputs: &[input(&[ItemType::Sticks, ItemType::Planks], 2)],
            work_time: 2.0,
        },
        RecipeStage {
            inputs: &[
                input(&[ItemType::Rock, ItemType::Block, ItemType::Brick], 2),
                input(&[ItemType::Dirt, ItemType::Clay], 1),
            ],
            work_time: 4.0,
        },
    ],
    result: BuildResult::Wall,
    result_material: ResultMaterial::FromSlot { stage: 1, slot: 0 },
};

static FLOOR: ConstructionRecipe = ConstructionRecipe {
    name: "floor",
    stages: &[RecipeStage {
        inputs: &[input(&[ItemType::Planks, ItemType::Block, ItemType::Brick], 1)],
        work_time: 2.0,
    }],
    result: BuildResult::Floor,
    result_material: ResultMaterial::FromSlot { stage: 0, slot: 0 },
};

static LADDER: ConstructionRecipe = ConstructionRecipe {
    name: "ladder",
    stages: &[RecipeStage {
        inputs: &[input(&[ItemType::Sticks, ItemType::Planks, ItemType::Log], 2)],
        work_time: 2.0,
    }],
    result: BuildResult::Ladder,
    result_material: ResultMaterial::FromSlot { stage: 0, slot: 0 },
};

static RAMP: ConstructionRecipe = ConstructionRecipe {
    name: "ramp",
    stages: &[RecipeStage {
        inputs: &[any_mat(2)],
        work_time: 3.0,
    }],
    result: BuildResult::Ramp,
    result_material: ResultMaterial::FromSlot { stage: 0, slot: 0 },
};

static DOOR: ConstructionRecipe = ConstructionRecipe {
    name: "door",
    stages: &[RecipeStage {
        inputs: &[input(&[ItemType::Planks], 2)],
        work_time: 3.0,
    }],
    result: BuildResult::Door,
    result_material: ResultMaterial::FromSlot { stage: 0, slot: 0 },
};

static BED: ConstructionRecipe = ConstructionRecipe {
    name: "bed",
    stages: &[
        RecipeStage {
            inputs: &[input(&[ItemType::Planks, ItemType::Log], 2)],
            work_time: 2.0,
        },
        RecipeStage {
            inputs: &[input(&[ItemType::Cloth, ItemType::Hide, ItemType::Fiber], 1)],
            work_time: 1.5,
        },
    ],
    result: BuildResult::Furniture(FurnitureType::Bed),
    result_material: ResultMaterial::FromSlot { stage: 0, slot: 0 },
};

static CHAIR: ConstructionRecipe = ConstructionRecipe {
    name: "chair",
    stages: &[RecipeStage {
        inputs: &[input(&[ItemType::Planks], 1)],
        work_time: 1.5,
    }],
    result: BuildResult::Furniture(FurnitureType::Chair),
    result_material: ResultMaterial::FromSlot { stage: 0, slot: 0 },
};

static CAMPFIRE: ConstructionRecipe = ConstructionRecipe {
    name: "campfire",
    stages: &[RecipeStage {
        inputs: &[
            input(&[ItemType::Rock], 2),
            input(&[ItemType::Sticks, ItemType::Log], 1),
        ],
        work_time: 1.0,
    }],
    result: BuildResult::Workshop(WorkshopType::Campfire),
    result_material: ResultMaterial::Fixed(MaterialType::Granite),
};

static SAWMILL: ConstructionRecipe = ConstructionRecipe {
    name: "sawmill",
    stages: &[RecipeStage {
        inputs: &[input(&[ItemType::Log], 2), input(&[ItemType::Rock, ItemType::Block], 1)],
        work_time: 3.0,
    }],
    result: BuildResult::Workshop(WorkshopType::Sawmill),
    result_material: ResultMaterial::FromSlot { stage: 0, slot: 0 },
};

static KILN: ConstructionRecipe = ConstructionRecipe {
    name: "kiln",
    stages: &[RecipeStage {
        inputs: &[input(&[ItemType::Clay, ItemType::Brick], 3)],
        work_time: 3.0,
    }],
    result: BuildResult::Workshop(WorkshopType::Kiln),
    result_material: ResultMaterial::Fixed(MaterialType::Clay),
};

static LOOM: ConstructionRecipe = ConstructionRecipe {
    name: "loom",
    stages: &[RecipeStage {
        inputs: &[input(&[ItemType::Planks, ItemType::Sticks], 2)],
        work_time: 2.0,
    }],
    result: BuildResult::Workshop(WorkshopType::Loom),
    result_material: ResultMaterial::FromSlot { stage: 0, slot: 0 },
};

static TAILOR: ConstructionRecipe = ConstructionRecipe {
    name: "tailor",
    stages: &[RecipeStage {
        inputs: &[input(&[ItemType::Planks], 2)],
        work_time: 2.0,
    }],
    result: BuildResult::Workshop(WorkshopType::Tailor),
    result_material: ResultMaterial::FromSlot { stage: 0, slot: 0 },
};

static WORKBENCH: ConstructionRecipe = ConstructionRecipe {
    name: "workbench",
    stages: &[RecipeStage {
        inputs: &[input(&[ItemType::Log, ItemType::Planks], 1)],
        work_time: 2.0,
    }],
    result: BuildResult::Workshop(WorkshopType::Workbench),
    result_material: ResultMaterial::FromSlot { stage: 0, slot: 0 },
};

// ── Workshop recipes ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct WorkshopRecipe {
    pub name: &'static str,
    pub workshop: WorkshopType,
    pub input: ItemType,
    pub input2: Option<ItemType>,
    pub needs_fuel: bool,
    pub work_time: f32,
    pub output: ItemType,
    pub output_count: u32,
}

pub static WORKSHOP_RECIPES: &[WorkshopRecipe] = &[
    WorkshopRecipe {
        name: "cook meat",
        workshop: WorkshopType::Campfire,
        input: ItemType::RawMeat,
        input2: None,
        needs_fuel: true,
        work_time: 3.0,
        output: ItemType::CookedMeat,
        output_count: 1,
    },
    WorkshopRecipe {
        name: "saw planks",
        workshop: WorkshopType::Sawmill,
        input: ItemType::Log,
        input2: None,
        needs_fuel: false,
        work_time: 4.0,
        output: ItemType::Planks,
        output_count: 4,
    },
    WorkshopRecipe {
        name: "cut blocks",
        workshop: WorkshopType::Sawmill,
        input: ItemType::Rock,
        input2: None,
        needs_fuel: false,
        work_time: 5.0,
        output: ItemType::Block,
        output_count: 1,
    },
    WorkshopRecipe {
        name: "fire bricks",
        workshop: WorkshopType::Kiln,
        input: ItemType::Clay,
        input2: None,
        needs_fuel: true,
        work_time: 6.0,
        output: ItemType::Brick,
        output_count: 2,
    },
    WorkshopRecipe {
        name: "burn charcoal",
        workshop: WorkshopType::Kiln,
        input: ItemType::Log,
        input2: None,
        needs_fuel: false,
        work_time: 6.0,
        output: ItemType::Charcoal,
        output_count: 3,
    },
    WorkshopRecipe {
        name: "fire pot",
        workshop: WorkshopType::Kiln,
        input: ItemType::Clay,
        input2: None,
        needs_fuel: true,
        work_time: 8.0,
        output: ItemType::ClayPot,
        output_count: 1,
    },
    WorkshopRecipe {
        name: "weave cloth",
        workshop: WorkshopType::Loom,
        input: ItemType::Fiber,
        input2: None,
        needs_fuel: false,
        work_time: 4.0,
        output: ItemType::Cloth,
        output_count: 1,
    },
    WorkshopRecipe {
        name: "weave basket",
        workshop: WorkshopType::Loom,
        input: ItemType::Fiber,
        input2: Some(ItemType::Sticks),
        needs_fuel: false,
        work_time: 5.0,
        output: ItemType::Basket,
        output_count: 1,
    },
    WorkshopRecipe {
        name: "sew fiber clothing",
        workshop: WorkshopType::Tailor,
        input: ItemType::Cloth,
        input2: None,
        needs_fuel: false,
        work_time: 6.0,
        output: ItemType::FiberClothing,
        output_count: 1,
    },
    WorkshopRecipe {
        name: "sew leather clothing",
        workshop: WorkshopType::Tailor,
        input: ItemType::Hide,
        input2: None,
        needs_fuel: false,
        work_time: 8.0,
        output: ItemType::LeatherClothing,
        output_count: 1,
    },
    WorkshopRecipe {
        name: "knap pick",
        workshop: WorkshopType::Workbench,
        input: ItemType::Rock,
        input2: Some(ItemType::Sticks),
        needs_fuel: false,
        work_time: 4.0,
        output: ItemType::StonePick,
        output_count: 1,
    },
    WorkshopRecipe {
        name: "knap axe",
        workshop: WorkshopType::Workbench,
        input: ItemType::Rock,
        input2: Some(ItemType::Sticks),
        needs_fuel: false,
        work_time: 4.0,
        output: ItemType::StoneAxe,
        output_count: 1,
    },
    WorkshopRecipe {
        name: "knap knife",
        workshop: WorkshopType::Workbench,
        input: ItemType::Rock,
        input2: None,
        needs_fuel: false,
        work_time: 3.0,
        output: ItemType::StoneKnife,
        output_count: 1,
    },
    WorkshopRecipe {
        name: "build crate",
        workshop: WorkshopType::Workbench,
        input: ItemType::Planks,
        input2: None,
        needs_fuel: false,
        work_time: 4.0,
        output: ItemType::Crate,
        output_count: 1,
    },
];

/// Recipe by index into `WORKSHOP_RECIPES`.
pub fn workshop_recipe(index: usize) -> Option<&'static WorkshopRecipe> {
    WORKSHOP_RECIPES.get(index)
}

/// Indices of the recipes a workshop type can run.
pub fn recipes_for(workshop: WorkshopType) -> impl Iterator<Item = usize> {
    WORKSHOP_RECIPES
        .iter()
        .enumerate()
        .filter(move |(_, r)| r.workshop == workshop)
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipe_shape_limits() {
        for id in ConstructionId::ALL {
            let r = id.recipe();
            assert!(!r.stages.is_empty() && r.stages.len() <= MAX_STAGES, "{}", r.name);
            for stage in r.stages {
                assert!(!stage.inputs.is_empty() && stage.inputs.len() <= MAX_INPUTS_PER_STAGE);
                for inp in stage.inputs {
                    assert!(inp.alternatives.len() <= MAX_ALTERNATIVES);
                    assert!(inp.any_building_mat || !inp.alternatives.is_empty());
                    assert!(inp.count > 0);
                }
            }
            if let ResultMaterial::FromSlot { stage, slot } = r.result_material {
                let s = &r.stages[stage as usize];
                assert!((slot as usize) < s.inputs.len(), "{}", r.name);
            }
        }
    }

    #[test]
    fn test_any_building_mat_accepts_flagged_only() {
        let slot = any_mat(1);
        assert!(slot.accepts(ItemType::Rock));
        assert!(slot.accepts(ItemType::Planks));
        assert!(!slot.accepts(ItemType::Berries));
    }

    #[test]
    fn test_locked_alternative() {
        let slot = input(&[ItemType::Sticks, ItemType::Planks], 2);
        let chosen = slot.alternative_index(ItemType::Planks).unwrap();
        assert!(slot.matches_locked(chosen, ItemType::Planks));
        assert!(!slot.matches_locked(chosen, ItemType::Sticks));
    }

    #[test]
    fn test_every_workshop_has_a_recipe() {
        for w in WorkshopType::ALL {
            assert!(recipes_for(w).next().is_some(), "{:?}", w);
        }
    }

    #[test]
    fn test_result_lookup() {
        assert_eq!(ConstructionId::for_result(BuildResult::Ladder), Some(ConstructionId::Ladder));
        assert_eq!(ConstructionId::for_result(BuildResult::Wall), Some(ConstructionId::Wall));
    }
}
