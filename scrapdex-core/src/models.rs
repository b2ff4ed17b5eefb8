//! Data models for game item data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScrapdexError;
use crate::linker::ReferenceIndex;

/// Item rarity, used for a display color and an ordinal sort weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
    #[default]
    Unknown,
}

impl Rarity {
    /// Parse a rarity label case-insensitively. Unrecognized labels map to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "common" => Rarity::Common,
            "uncommon" => Rarity::Uncommon,
            "rare" => Rarity::Rare,
            "epic" => Rarity::Epic,
            "legendary" => Rarity::Legendary,
            _ => Rarity::Unknown,
        }
    }

    /// Sort weight, higher is rarer.
    pub fn ordinal(self) -> u8 {
        match self {
            Rarity::Unknown => 0,
            Rarity::Common => 1,
            Rarity::Uncommon => 2,
            Rarity::Rare => 3,
            Rarity::Epic => 4,
            Rarity::Legendary => 5,
        }
    }

    /// Display color as a hex string.
    pub fn color(self) -> &'static str {
        match self {
            Rarity::Common => "#9ca3af",
            Rarity::Uncommon => "#22c55e",
            Rarity::Rare => "#3b82f6",
            Rarity::Epic => "#a855f7",
            Rarity::Legendary => "#f59e0b",
            Rarity::Unknown => "#6b7280",
        }
    }

    /// ANSI foreground color code for terminal output.
    pub fn ansi(self) -> &'static str {
        match self {
            Rarity::Common => "\x1b[37m",
            Rarity::Uncommon => "\x1b[32m",
            Rarity::Rare => "\x1b[34m",
            Rarity::Epic => "\x1b[35m",
            Rarity::Legendary => "\x1b[33m",
            Rarity::Unknown => "\x1b[90m",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Rarity::Common => "Common",
            Rarity::Uncommon => "Uncommon",
            Rarity::Rare => "Rare",
            Rarity::Epic => "Epic",
            Rarity::Legendary => "Legendary",
            Rarity::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Primary classification of an item. Exactly one per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Quest,
    Project,
    Upgrade,
    #[default]
    Recycle,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Quest,
        Category::Project,
        Category::Upgrade,
        Category::Recycle,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Quest => "Quest Items",
            Category::Project => "Project Items",
            Category::Upgrade => "Upgrade Items",
            Category::Recycle => "Safe to Recycle",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Quest => "quest",
            Category::Project => "project",
            Category::Upgrade => "upgrade",
            Category::Recycle => "recycle",
        };
        f.write_str(name)
    }
}

impl FromStr for Category {
    type Err = ScrapdexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quest" | "quests" => Ok(Category::Quest),
            "project" | "projects" => Ok(Category::Project),
            "upgrade" | "upgrades" => Ok(Category::Upgrade),
            "recycle" | "safe" | "safe-to-recycle" => Ok(Category::Recycle),
            other => Err(ScrapdexError::Parse(format!("Unknown category: {}", other))),
        }
    }
}

/// An (item identifier, quantity) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientRef {
    pub item_id: String,
    pub quantity: u32,
}

impl IngredientRef {
    pub fn new(item_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

/// Canonical item record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rarity: Rarity,
    pub item_type: Option<String>,
    pub weight: f64,
    pub max_stack: u32,
    pub value: u64,
    pub image: Option<String>,
    pub recipe: Vec<IngredientRef>,
    pub recycles_into: Vec<IngredientRef>,
    pub category: Category,
}

impl Item {
    /// Create an item with defaulted numeric fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            rarity: Rarity::Unknown,
            item_type: None,
            weight: 0.0,
            max_stack: 1,
            value: 0,
            image: None,
            recipe: Vec::new(),
            recycles_into: Vec::new(),
            category: Category::Recycle,
        }
    }

    pub fn is_quest_item(&self) -> bool {
        self.category == Category::Quest
    }

    pub fn is_project_item(&self) -> bool {
        self.category == Category::Project
    }

    pub fn is_upgrade_item(&self) -> bool {
        self.category == Category::Upgrade
    }

    pub fn is_safe_to_recycle(&self) -> bool {
        self.category == Category::Recycle
    }
}

/// Quest record; only the name, trader and item-bearing lists are consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub name: String,
    pub trader: Option<String>,
    /// Structured item references (required items, rewards with ids).
    pub item_refs: Vec<IngredientRef>,
    /// Free-text objectives, matched against item names.
    pub objectives: Vec<String>,
}

/// Crafting project: consumes `cost` to yield `yields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub cost: Vec<IngredientRef>,
    pub yields: Vec<IngredientRef>,
}

/// Trader offer: `trader` sells `quantity` of `item_id` for `cost`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trader: String,
    pub item_id: String,
    pub quantity: u32,
    pub cost: Option<IngredientRef>,
}

/// A project that consumes a given item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectUsage {
    pub project: String,
    pub count: u32,
    pub is_upgrade: bool,
}

/// A trader offering a given item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub trader: String,
    pub quantity: u32,
    pub cost: Option<IngredientRef>,
}

/// Raw item document as delivered by a data source.
#[derive(Debug, Clone)]
pub struct RawItem {
    /// File stem of the document, when the source is a per-item file repository.
    pub file_stem: Option<String>,
    pub doc: serde_json::Value,
}

impl RawItem {
    pub fn new(doc: serde_json::Value) -> Self {
        Self { file_stem: None, doc }
    }

    pub fn from_file(file_stem: impl Into<String>, doc: serde_json::Value) -> Self {
        Self {
            file_stem: Some(file_stem.into()),
            doc,
        }
    }
}

/// Processed item list plus reverse lookups, cached as one blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub items: Vec<Item>,
    pub index: ReferenceIndex,
    pub built_at: DateTime<Utc>,
}

impl Catalog {
    pub fn find(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn count(&self, category: Category) -> usize {
        self.items.iter().filter(|item| item.category == category).count()
    }
}

/// One item expanded with its resolved relationships.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDetail {
    pub item: Item,
    pub crafted_from: Vec<IngredientRef>,
    pub recycles_into: Vec<IngredientRef>,
    pub recycled_from: Vec<IngredientRef>,
    pub used_in: Vec<ProjectUsage>,
    pub quests: Vec<String>,
    pub traders: Vec<TradeOffer>,
}
