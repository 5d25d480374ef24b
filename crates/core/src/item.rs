//! Item system - tools, materials and craft items carried by players or dropped in the world.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum count for a single material or craft stack.
pub const MAX_STACK: u16 = 99;

/// Tool classes, as seen by punch and dig rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ToolType {
    /// Bare hand or a non-tool item.
    #[default]
    None,
    /// Unique tools with custom behavior.
    Special,
    /// Axe - chops wood
    Axe,
    /// Pick - mines stone
    Pick,
    /// Shovel - digs dirt, sand, gravel
    Shovel,
    /// Shears - collects wool and leaves
    Shear,
    /// Bucket - scoops liquids
    Bucket,
    /// Sword - combat weapon
    Sword,
    /// Spear - long-reach weapon
    Spear,
    /// Club - blunt weapon
    Club,
}

/// Static features of a tool kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToolFeatures {
    /// Class of tool.
    pub tool_type: ToolType,
    /// Material hardness; higher is stronger.
    pub hardness: u16,
}

impl ToolFeatures {
    /// Features of an empty hand.
    pub const HAND: Self = Self {
        tool_type: ToolType::None,
        hardness: 0,
    };
}

/// Look up tool features by tool name (`<material>_<kind>`, e.g. `steel_sword`).
///
/// Unknown names resolve to [`ToolFeatures::HAND`].
pub fn tool_features(name: &str) -> ToolFeatures {
    let Some((material, kind)) = name.split_once('_') else {
        return ToolFeatures::HAND;
    };
    let hardness = match material {
        "wood" => 50,
        "stone" => 100,
        "flint" => 75,
        "steel" => 200,
        "mithril" => 400,
        _ => return ToolFeatures::HAND,
    };
    let tool_type = match kind {
        "pick" => ToolType::Pick,
        "axe" => ToolType::Axe,
        "shovel" => ToolType::Shovel,
        "sword" => ToolType::Sword,
        "spear" => ToolType::Spear,
        "club" => ToolType::Club,
        "shears" => ToolType::Shear,
        "bucket" => ToolType::Bucket,
        _ => ToolType::Special,
    };
    ToolFeatures {
        tool_type,
        hardness,
    }
}

/// Craft item names that can be eaten (and fed to tameable mobs).
const EDIBLE_CRAFT_ITEMS: &[&str] = &[
    "apple",
    "bread",
    "carrot",
    "meat",
    "cooked_meat",
    "fish",
    "cooked_fish",
];

/// An item as held in an inventory slot or carried by a dropped-item entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryItem {
    /// A placeable node.
    Material {
        /// Node content id.
        content: u16,
        /// Stack size.
        count: u16,
    },
    /// A non-placeable crafted item.
    Craft {
        /// Item name.
        name: String,
        /// Stack size.
        count: u16,
    },
    /// A tool with accumulated wear.
    Tool {
        /// Tool name, see [`tool_features`].
        name: String,
        /// Wear (0 = new, 65535 = broken).
        wear: u16,
    },
}

impl InventoryItem {
    /// Convenience constructor for a craft item stack.
    pub fn craft(name: impl Into<String>, count: u16) -> Self {
        Self::Craft {
            name: name.into(),
            count,
        }
    }

    /// Number of items in this stack (tools always count one).
    pub fn count(&self) -> u16 {
        match self {
            Self::Material { count, .. } | Self::Craft { count, .. } => *count,
            Self::Tool { .. } => 1,
        }
    }

    /// Durable items never age out when dropped.
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Tool { .. })
    }

    /// Whether this item can be eaten.
    pub fn is_edible(&self) -> bool {
        match self {
            Self::Craft { name, .. } => EDIBLE_CRAFT_ITEMS.contains(&name.as_str()),
            _ => false,
        }
    }

    /// Node content carried by a material stack.
    pub fn material_content(&self) -> Option<u16> {
        match self {
            Self::Material { content, .. } => Some(*content),
            _ => None,
        }
    }

    /// Features of this item when used as a tool.
    pub fn tool_features(&self) -> ToolFeatures {
        match self {
            Self::Tool { name, .. } => tool_features(name),
            _ => ToolFeatures::HAND,
        }
    }

    /// Whether `other` can be merged into this stack.
    pub fn stacks_with(&self, other: &InventoryItem) -> bool {
        match (self, other) {
            (
                Self::Material { content: a, .. },
                Self::Material { content: b, .. },
            ) => a == b,
            (Self::Craft { name: a, .. }, Self::Craft { name: b, .. }) => a == b,
            _ => false,
        }
    }

    fn set_count(&mut self, value: u16) {
        match self {
            Self::Material { count, .. } | Self::Craft { count, .. } => *count = value,
            Self::Tool { .. } => {}
        }
    }
}

/// Failure to parse an item string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemParseError {
    /// The string held no tokens.
    #[error("empty item string")]
    Empty,
    /// The leading token is not a known item kind.
    #[error("unknown item kind `{0}`")]
    UnknownKind(String),
    /// A required field was missing.
    #[error("item string is missing its {0}")]
    MissingField(&'static str),
    /// A numeric field did not parse.
    #[error("invalid number `{0}` in item string")]
    BadNumber(String),
}

fn parse_number(token: Option<&str>, field: &'static str) -> Result<u16, ItemParseError> {
    let token = token.ok_or(ItemParseError::MissingField(field))?;
    token
        .parse()
        .map_err(|_| ItemParseError::BadNumber(token.to_string()))
}

impl FromStr for InventoryItem {
    type Err = ItemParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split_whitespace();
        let kind = tokens.next().ok_or(ItemParseError::Empty)?;
        match kind {
            "MaterialItem" => {
                let content = parse_number(tokens.next(), "content")?;
                let count = parse_number(tokens.next(), "count")?;
                Ok(Self::Material { content, count })
            }
            "CraftItem" => {
                let name = tokens.next().ok_or(ItemParseError::MissingField("name"))?;
                let count = parse_number(tokens.next(), "count")?;
                Ok(Self::Craft {
                    name: name.to_string(),
                    count,
                })
            }
            "ToolItem" => {
                let name = tokens.next().ok_or(ItemParseError::MissingField("name"))?;
                let wear = parse_number(tokens.next(), "wear")?;
                Ok(Self::Tool {
                    name: name.to_string(),
                    wear,
                })
            }
            other => Err(ItemParseError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for InventoryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Material { content, count } => write!(f, "MaterialItem {content} {count}"),
            Self::Craft { name, count } => write!(f, "CraftItem {name} {count}"),
            Self::Tool { name, wear } => write!(f, "ToolItem {name} {wear}"),
        }
    }
}

/// Inventory operations the simulation needs from a player.
pub trait Inventory {
    /// Item in the selected slot.
    fn wielded(&self) -> Option<&InventoryItem>;

    /// Remove `count` items from the selected slot. Returns false if it held fewer.
    fn consume_wielded(&mut self, count: u16) -> bool;

    /// Store an item, returning whatever did not fit.
    fn add_item(&mut self, item: InventoryItem) -> Option<InventoryItem>;
}

/// Fixed-size slot list with a selected (wielded) slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInventory {
    slots: Vec<Option<InventoryItem>>,
    selected: usize,
}

impl PlayerInventory {
    /// Create an empty inventory with `size` slots.
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
            selected: 0,
        }
    }

    /// Replace the contents of a slot.
    pub fn set_slot(&mut self, index: usize, item: Option<InventoryItem>) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = item;
        }
    }

    /// Borrow a slot.
    pub fn slot(&self, index: usize) -> Option<&InventoryItem> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Change the wielded slot.
    pub fn select(&mut self, index: usize) {
        if index < self.slots.len() {
            self.selected = index;
        }
    }

    /// Iterate over occupied slots.
    pub fn items(&self) -> impl Iterator<Item = &InventoryItem> {
        self.slots.iter().flatten()
    }

    /// Add wear to the wielded tool. A tool worn past the limit breaks and
    /// leaves its slot; returns true when that happens.
    pub fn wear_wielded(&mut self, amount: u16) -> bool {
        let Some(slot) = self.slots.get_mut(self.selected) else {
            return false;
        };
        let Some(InventoryItem::Tool { wear, .. }) = slot.as_mut() else {
            return false;
        };
        match wear.checked_add(amount) {
            Some(next) if next < u16::MAX => {
                *wear = next;
                false
            }
            _ => {
                *slot = None;
                true
            }
        }
    }
}

impl Inventory for PlayerInventory {
    fn wielded(&self) -> Option<&InventoryItem> {
        self.slot(self.selected)
    }

    fn consume_wielded(&mut self, count: u16) -> bool {
        let Some(slot) = self.slots.get_mut(self.selected) else {
            return false;
        };
        let Some(item) = slot.as_mut() else {
            return false;
        };
        let have = item.count();
        if have < count {
            return false;
        }
        if have == count {
            *slot = None;
        } else {
            item.set_count(have - count);
        }
        true
    }

    fn add_item(&mut self, item: InventoryItem) -> Option<InventoryItem> {
        let mut remaining = item;
        for existing in self.slots.iter_mut().flatten() {
            if !existing.stacks_with(&remaining) {
                continue;
            }
            let room = MAX_STACK.saturating_sub(existing.count());
            let moved = room.min(remaining.count());
            existing.set_count(existing.count() + moved);
            let left = remaining.count() - moved;
            if left == 0 {
                return None;
            }
            remaining.set_count(left);
        }
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(remaining);
                None
            }
            None => Some(remaining),
        }
    }
}
