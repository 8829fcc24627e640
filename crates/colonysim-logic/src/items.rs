//! Item and material definitions.
//!
//! Static tables indexed by enum. The engine never hard-codes per-type
//! behaviour; it asks these tables (stack limits, container capacity,
//! clothing insulation, tool quality, nutrition, spoilage).

use serde::{Deserialize, Serialize};

/// Item flag bits carried by each definition.
pub mod flags {
    pub const STACKABLE: u16 = 1 << 0;
    pub const EDIBLE: u16 = 1 << 1;
    pub const SPOILS: u16 = 1 << 2;
    pub const BUILDING_MAT: u16 = 1 << 3;
    pub const FUEL: u16 = 1 << 4;
    pub const CONTAINER: u16 = 1 << 5;
    pub const CLOTHING: u16 = 1 << 6;
    pub const TOOL: u16 = 1 << 7;
    pub const FLAMMABLE: u16 = 1 << 8;
    pub const LIQUID: u16 = 1 << 9;
    pub const TEXTILE: u16 = 1 << 10;
    pub const SEED: u16 = 1 << 11;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ItemType {
    // Test palette
    Red = 0,
    Green,
    Blue,
    // Raw materials
    Rock,
    Block,
    Log,
    Planks,
    Sticks,
    Dirt,
    Clay,
    Brick,
    Charcoal,
    // Food and drink
    Berries,
    RawMeat,
    CookedMeat,
    Water,
    Seeds,
    // Animal products
    Carcass,
    Hide,
    // Textiles
    Fiber,
    Cloth,
    FiberClothing,
    LeatherClothing,
    // Tools
    StonePick,
    StoneAxe,
    StoneKnife,
    // Containers
    Basket,
    ClayPot,
    Crate,
}

impl ItemType {
    pub const COUNT: usize = 29;

    pub const ALL: [ItemType; ItemType::COUNT] = [
        ItemType::Red,
        ItemType::Green,
        ItemType::Blue,
        ItemType::Rock,
        ItemType::Block,
        ItemType::Log,
        ItemType::Planks,
        ItemType::Sticks,
        ItemType::Dirt,
        ItemType::Clay,
        ItemType::Brick,
        ItemType::Charcoal,
        ItemType::Berries,
        ItemType::RawMeat,
        ItemType::CookedMeat,
        ItemType::Water,
        ItemType::Seeds,
        ItemType::Carcass,
        ItemType::Hide,
        ItemType::Fiber,
        ItemType::Cloth,
        ItemType::FiberClothing,
        ItemType::LeatherClothing,
        ItemType::StonePick,
        ItemType::StoneAxe,
        ItemType::StoneKnife,
        ItemType::Basket,
        ItemType::ClayPot,
        ItemType::Crate,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn def(self) -> &'static ItemDef {
        &ITEM_DEFS[self.index()]
    }

    pub fn name(self) -> &'static str {
        self.def().name
    }

    pub fn has_flag(self, flag: u16) -> bool {
        self.def().flags & flag != 0
    }

    /// Bit used in a container's content-type bloom mask.
    pub fn mask_bit(self) -> u64 {
        1u64 << (self.index() as u64 % 64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MaterialType {
    #[default]
    None = 0,
    Granite,
    Sandstone,
    Oak,
    Pine,
    Birch,
    Dirt,
    Clay,
}

impl MaterialType {
    pub const COUNT: usize = 8;

    pub const ALL: [MaterialType; MaterialType::COUNT] = [
        MaterialType::None,
        MaterialType::Granite,
        MaterialType::Sandstone,
        MaterialType::Oak,
        MaterialType::Pine,
        MaterialType::Birch,
        MaterialType::Dirt,
        MaterialType::Clay,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            MaterialType::None => "none",
            MaterialType::Granite => "granite",
            MaterialType::Sandstone => "sandstone",
            MaterialType::Oak => "oak",
            MaterialType::Pine => "pine",
            MaterialType::Birch => "birch",
            MaterialType::Dirt => "dirt",
            MaterialType::Clay => "clay",
        }
    }

    pub fn is_stone(self) -> bool {
        matches!(self, MaterialType::Granite | MaterialType::Sandstone)
    }

    pub fn is_wood(self) -> bool {
        matches!(self, MaterialType::Oak | MaterialType::Pine | MaterialType::Birch)
    }

    pub fn is_flammable(self) -> bool {
        self.is_wood()
    }

    /// Item dropped when a natural cell of this material is dug out.
    pub fn mined_item(self) -> ItemType {
        match self {
            MaterialType::Dirt => ItemType::Dirt,
            MaterialType::Clay => ItemType::Clay,
            m if m.is_wood() => ItemType::Log,
            _ => ItemType::Rock,
        }
    }

    /// Item refunded when a constructed cell of this material is taken down.
    pub fn refund_item(self) -> ItemType {
        match self {
            m if m.is_stone() => ItemType::Block,
            m if m.is_wood() => ItemType::Planks,
            MaterialType::Clay => ItemType::Brick,
            MaterialType::Dirt => ItemType::Dirt,
            MaterialType::None => ItemType::Rock,
            _ => ItemType::Rock,
        }
    }
}

/// Static per-type definition.
#[derive(Debug, Clone, Copy)]
pub struct ItemDef {
    pub name: &'static str,
    pub flags: u16,
    pub max_stack: u32,
    /// Hunger restored per unit eaten (0-1 scale).
    pub nutrition: f32,
    /// Game-hours until rotten. Zero when the item does not spoil.
    pub spoil_hours: f32,
    pub default_material: MaterialType,
}

use flags::*;

const fn def(
    name: &'static str,
    flags: u16,
    max_stack: u32,
    nutrition: f32,
    spoil_hours: f32,
    default_material: MaterialType,
) -> ItemDef {
    ItemDef {
        name,
        flags,
        max_stack,
        nutrition,
        spoil_hours,
        default_material,
    }
}

const NONE: MaterialType = MaterialType::None;

pub static ITEM_DEFS: [ItemDef; ItemType::COUNT] = [
    def("red", STACKABLE, 10, 0.0, 0.0, NONE),
    def("green", STACKABLE, 10, 0.0, 0.0, NONE),
    def("blue", STACKABLE, 10, 0.0, 0.0, NONE),
    def("rock", STACKABLE | BUILDING_MAT, 10, 0.0, 0.0, MaterialType::Granite),
    def("block", STACKABLE | BUILDING_MAT, 10, 0.0, 0.0, MaterialType::Granite),
    def("log", STACKABLE | BUILDING_MAT | FUEL | FLAMMABLE, 5, 0.0, 0.0, MaterialType::Oak),
    def("planks", STACKABLE | BUILDING_MAT | FUEL | FLAMMABLE, 20, 0.0, 0.0, MaterialType::Oak),
    def("sticks", STACKABLE | FUEL | FLAMMABLE, 20, 0.0, 0.0, MaterialType::Oak),
    def("dirt", STACKABLE | BUILDING_MAT, 10, 0.0, 0.0, MaterialType::Dirt),
    def("clay", STACKABLE, 10, 0.0, 0.0, MaterialType::Clay),
    def("brick", STACKABLE | BUILDING_MAT, 20, 0.0, 0.0, MaterialType::Clay),
    def("charcoal", STACKABLE | FUEL | FLAMMABLE, 20, 0.0, 0.0, NONE),
    def("berries", STACKABLE | EDIBLE | SPOILS | FLAMMABLE, 20, 0.25, 72.0, NONE),
    def("raw meat", STACKABLE | EDIBLE | SPOILS, 10, 0.3, 24.0, NONE),
    def("cooked meat", STACKABLE | EDIBLE | SPOILS, 10, 0.6, 96.0, NONE),
    def("water", STACKABLE | LIQUID, 10, 0.0, 0.0, NONE),
    def("seeds", STACKABLE | SEED, 20, 0.0, 0.0, NONE),
    def("carcass", SPOILS, 1, 0.0, 48.0, NONE),
    def("hide", STACKABLE | TEXTILE | SPOILS, 10, 0.0, 240.0, NONE),
    def("fiber", STACKABLE | TEXTILE | FLAMMABLE, 20, 0.0, 0.0, NONE),
    def("cloth", STACKABLE | TEXTILE | FLAMMABLE, 20, 0.0, 0.0, NONE),
    def("fiber clothing", CLOTHING | FLAMMABLE, 1, 0.0, 0.0, NONE),
    def("leather clothing", CLOTHING, 1, 0.0, 0.0, NONE),
    def("stone pick", TOOL, 1, 0.0, 0.0, MaterialType::Granite),
    def("stone axe", TOOL, 1, 0.0, 0.0, MaterialType::Granite),
    def("stone knife", TOOL, 1, 0.0, 0.0, MaterialType::Granite),
    def("basket", CONTAINER | FLAMMABLE, 1, 0.0, 0.0, NONE),
    def("clay pot", CONTAINER, 1, 0.0, 0.0, MaterialType::Clay),
    def("crate", CONTAINER | FLAMMABLE, 1, 0.0, 0.0, MaterialType::Pine),
];

/// Largest stack a single item record may hold.
pub fn item_max_stack(item_type: ItemType) -> u32 {
    let d = item_type.def();
    if d.flags & STACKABLE == 0 {
        1
    } else {
        d.max_stack
    }
}

pub fn is_stackable(item_type: ItemType) -> bool {
    item_max_stack(item_type) > 1
}

/// Container capacity and environment modifiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerDef {
    /// Maximum number of direct child records.
    pub max_contents: u32,
    /// Multiplier on spoilage speed for direct contents.
    pub spoilage_modifier: f32,
    pub weather_protection: bool,
    pub accepts_liquids: bool,
}

pub fn container_def(item_type: ItemType) -> Option<ContainerDef> {
    match item_type {
        ItemType::Basket => Some(ContainerDef {
            max_contents: 4,
            spoilage_modifier: 0.9,
            weather_protection: false,
            accepts_liquids: false,
        }),
        ItemType::ClayPot => Some(ContainerDef {
            max_contents: 3,
            spoilage_modifier: 0.5,
            weather_protection: true,
            accepts_liquids: true,
        }),
        ItemType::Crate => Some(ContainerDef {
            max_contents: 8,
            spoilage_modifier: 0.75,
            weather_protection: true,
            accepts_liquids: false,
        }),
        _ => None,
    }
}

/// Fraction of cooling that a worn clothing item blocks.
pub fn clothing_cooling_reduction(item_type: ItemType) -> Option<f32> {
    match item_type {
        ItemType::FiberClothing => Some(0.4),
        ItemType::LeatherClothing => Some(0.7),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolQuality {
    Digging,
    Cutting,
    Butchering,
}

/// Quality and level a tool provides. Level scales work speed.
pub fn tool_quality(item_type: ItemType) -> Option<(ToolQuality, u8)> {
    match item_type {
        ItemType::StonePick => Some((ToolQuality::Digging, 1)),
        ItemType::StoneAxe => Some((ToolQuality::Cutting, 1)),
        ItemType::StoneKnife => Some((ToolQuality::Butchering, 1)),
        _ => None,
    }
}

/// Tool types that provide a quality, in preference order.
pub fn tools_with_quality(quality: ToolQuality) -> &'static [ItemType] {
    match quality {
        ToolQuality::Digging => &[ItemType::StonePick],
        ToolQuality::Cutting => &[ItemType::StoneAxe],
        ToolQuality::Butchering => &[ItemType::StoneKnife],
    }
}

/// Whether an item may go into a container of the given type.
pub fn container_accepts(container: ItemType, item_type: ItemType) -> bool {
    let Some(c) = container_def(container) else {
        return false;
    };
    if item_type.has_flag(CONTAINER) {
        // Only crates nest other containers.
        return container == ItemType::Crate && item_type != ItemType::Crate;
    }
    if item_type.has_flag(LIQUID) {
        return c.accepts_liquids;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_enum_order() {
        for (i, t) in ItemType::ALL.iter().enumerate() {
            assert_eq!(t.index(), i, "{:?} out of order", t);
        }
        for (i, m) in MaterialType::ALL.iter().enumerate() {
            assert_eq!(m.index(), i);
        }
    }

    #[test]
    fn test_clothing_never_stacks() {
        for t in ItemType::ALL {
            if t.has_flag(CLOTHING) {
                assert_eq!(item_max_stack(t), 1, "{:?}", t);
            }
        }
    }

    #[test]
    fn test_textile_raws_stack() {
        assert!(is_stackable(ItemType::Fiber));
        assert!(is_stackable(ItemType::Cloth));
        assert!(is_stackable(ItemType::Hide));
    }

    #[test]
    fn test_containers_have_defs() {
        for t in ItemType::ALL {
            assert_eq!(t.has_flag(CONTAINER), container_def(t).is_some(), "{:?}", t);
        }
    }

    #[test]
    fn test_liquids_need_liquid_container() {
        assert!(container_accepts(ItemType::ClayPot, ItemType::Water));
        assert!(!container_accepts(ItemType::Basket, ItemType::Water));
        assert!(container_accepts(ItemType::Crate, ItemType::Basket));
        assert!(!container_accepts(ItemType::Crate, ItemType::Crate));
    }

    #[test]
    fn test_spoiling_items_are_timed() {
        for t in ItemType::ALL {
            if t.has_flag(SPOILS) {
                assert!(t.def().spoil_hours > 0.0, "{:?}", t);
            }
        }
    }
}
