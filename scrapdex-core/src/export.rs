//! CSV export of the processed item list.

use crate::error::Result;
use crate::models::{Catalog, Item};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct ItemRow<'a> {
    id: &'a str,
    name: &'a str,
    rarity: String,
    category: String,
    value: u64,
    weight: f64,
    max_stack: u32,
    is_quest_item: bool,
    is_project_item: bool,
    is_upgrade_item: bool,
    is_safe_to_recycle: bool,
    used_in: String,
    quests: String,
    rarity_color: &'static str,
}

impl<'a> ItemRow<'a> {
    fn new(item: &'a Item, catalog: &Catalog) -> Self {
        let used_in = catalog
            .index
            .projects_using(&item.id)
            .iter()
            .map(|u| format!("{} x{}", u.project, u.count))
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            id: &item.id,
            name: &item.name,
            rarity: item.rarity.to_string(),
            category: item.category.to_string(),
            value: item.value,
            weight: item.weight,
            max_stack: item.max_stack,
            is_quest_item: item.is_quest_item(),
            is_project_item: item.is_project_item(),
            is_upgrade_item: item.is_upgrade_item(),
            is_safe_to_recycle: item.is_safe_to_recycle(),
            used_in,
            quests: catalog.index.quests_referencing(&item.id).join("; "),
            rarity_color: item.rarity.color(),
        }
    }
}

/// Write one CSV row per item. Returns the number of rows written.
pub fn write_items_csv<W: Write>(catalog: &Catalog, items: &[&Item], writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for item in items {
        csv_writer.serialize(ItemRow::new(item, catalog))?;
    }
    csv_writer.flush()?;
    Ok(items.len())
}
