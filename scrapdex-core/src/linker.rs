//! Cross-referencing between items and the auxiliary datasets.
//!
//! The index is built once per load by scanning each dataset and recording
//! every item it references, so per-item lookups are plain map reads.

use crate::models::{
    IngredientRef, Item, ItemDetail, Project, ProjectUsage, Quest, Trade, TradeOffer,
};
use crate::normalize::{fuzzy_keys, tokens};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimum compact name length for free-text objective matching.
const MIN_TEXT_MATCH_LEN: usize = 4;

/// Resolves external identifiers and names onto canonical item ids.
#[derive(Debug, Default)]
pub struct KeyResolver {
    ids: HashMap<String, String>,
    keys: HashMap<String, String>,
}

impl KeyResolver {
    pub fn new(items: &[Item]) -> Self {
        let mut resolver = Self::default();
        for item in items {
            resolver.ids.entry(item.id.clone()).or_insert_with(|| item.id.clone());
        }
        // Ids register before names so an id key is never shadowed by another item's name.
        for item in items {
            resolver.register(&item.id, &item.id);
        }
        for item in items {
            resolver.register(&item.name, &item.id);
        }
        resolver
    }

    fn register(&mut self, raw: &str, id: &str) {
        for key in fuzzy_keys(raw) {
            match self.keys.get(&key) {
                Some(existing) if existing != id => {
                    tracing::debug!("Fuzzy key '{}' already maps to {}, ignoring {}", key, existing, id);
                }
                Some(_) => {}
                None => {
                    self.keys.insert(key, id.to_string());
                }
            }
        }
    }

    /// Canonical item id for `raw`: exact id first, then any shared fuzzy key.
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        if let Some(id) = self.ids.get(raw) {
            return Some(id.as_str());
        }
        fuzzy_keys(raw)
            .iter()
            .find_map(|key| self.keys.get(key))
            .map(String::as_str)
    }
}

/// Rewrite recipe and recycle references onto canonical item ids where resolvable.
pub fn canonicalize_items(items: &mut [Item]) {
    let resolver = KeyResolver::new(items);
    for item in items.iter_mut() {
        for reference in item.recipe.iter_mut().chain(item.recycles_into.iter_mut()) {
            if let Some(id) = resolver.resolve(&reference.item_id) {
                reference.item_id = id.to_string();
            }
        }
    }
}

/// True when `words` occurs in `text` as a consecutive run of whole words.
fn contains_words(text: &[String], words: &[String]) -> bool {
    !words.is_empty() && text.windows(words.len()).any(|run| run == words)
}

/// True when a project name marks it as an upgrade of a persistent structure.
pub fn is_upgrade_project(name: &str, upgrade_keywords: &[String]) -> bool {
    let lowered = name.to_lowercase();
    upgrade_keywords
        .iter()
        .any(|kw| !kw.is_empty() && lowered.contains(&kw.to_lowercase()))
}

/// Reverse lookups keyed by canonical item id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceIndex {
    pub used_in: HashMap<String, Vec<ProjectUsage>>,
    pub recycled_from: HashMap<String, Vec<IngredientRef>>,
    pub quests: HashMap<String, Vec<String>>,
    pub traders: HashMap<String, Vec<TradeOffer>>,
}

impl ReferenceIndex {
    pub fn build(
        items: &[Item],
        quests: &[Quest],
        projects: &[Project],
        trades: &[Trade],
        upgrade_keywords: &[String],
    ) -> Self {
        let resolver = KeyResolver::new(items);
        let mut index = Self::default();
        let mut unresolved = 0usize;

        for project in projects {
            let is_upgrade = is_upgrade_project(&project.name, upgrade_keywords);
            for cost in &project.cost {
                match resolver.resolve(&cost.item_id) {
                    Some(id) => index.used_in.entry(id.to_string()).or_default().push(ProjectUsage {
                        project: project.name.clone(),
                        count: cost.quantity,
                        is_upgrade,
                    }),
                    None => unresolved += 1,
                }
            }
        }

        for item in items {
            for output in &item.recycles_into {
                match resolver.resolve(&output.item_id) {
                    Some(id) => index
                        .recycled_from
                        .entry(id.to_string())
                        .or_default()
                        .push(IngredientRef::new(item.id.clone(), output.quantity)),
                    None => unresolved += 1,
                }
            }
        }

        let name_words: Vec<(&str, Vec<String>)> = items
            .iter()
            .map(|item| (item.id.as_str(), tokens(&item.name)))
            .filter(|(_, words)| words.concat().len() >= MIN_TEXT_MATCH_LEN)
            .collect();

        for quest in quests {
            for reference in &quest.item_refs {
                match resolver.resolve(&reference.item_id) {
                    Some(id) => index.add_quest(id, &quest.name),
                    None => unresolved += 1,
                }
            }
            for objective in &quest.objectives {
                let text = tokens(objective);
                for (id, words) in &name_words {
                    if contains_words(&text, words) {
                        index.add_quest(id, &quest.name);
                    }
                }
            }
        }

        for trade in trades {
            match resolver.resolve(&trade.item_id) {
                Some(id) => index.traders.entry(id.to_string()).or_default().push(TradeOffer {
                    trader: trade.trader.clone(),
                    quantity: trade.quantity,
                    cost: trade.cost.clone(),
                }),
                None => unresolved += 1,
            }
        }

        if unresolved > 0 {
            tracing::debug!("Dropped {} references to unknown items", unresolved);
        }
        index
    }

    fn add_quest(&mut self, id: &str, quest: &str) {
        let names = self.quests.entry(id.to_string()).or_default();
        if !names.iter().any(|n| n == quest) {
            names.push(quest.to_string());
        }
    }

    pub fn projects_using(&self, id: &str) -> &[ProjectUsage] {
        self.used_in.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn quests_referencing(&self, id: &str) -> &[String] {
        self.quests.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn recycled_from(&self, id: &str) -> &[IngredientRef] {
        self.recycled_from.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn traders_offering(&self, id: &str) -> &[TradeOffer] {
        self.traders.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Expand an item with its resolved relationships.
    pub fn detail(&self, item: &Item) -> ItemDetail {
        ItemDetail {
            item: item.clone(),
            crafted_from: item.recipe.clone(),
            recycles_into: item.recycles_into.clone(),
            recycled_from: self.recycled_from(&item.id).to_vec(),
            used_in: self.projects_using(&item.id).to_vec(),
            quests: self.quests_referencing(&item.id).to_vec(),
            traders: self.traders_offering(&item.id).to_vec(),
        }
    }
}
