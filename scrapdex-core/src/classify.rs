//! Item classification into quest / project / upgrade / safe-to-recycle.

use crate::linker::ReferenceIndex;
use crate::models::{Category, Item};
use rayon::prelude::*;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Order in which categories claim an item. Anything unclaimed is safe to recycle.
    pub precedence: Vec<Category>,
    /// Substrings of an item's name or id that force a quest match.
    pub quest_keywords: Vec<String>,
    pub project_keywords: Vec<String>,
    pub upgrade_keywords: Vec<String>,
    /// Substrings of a project name that mark it as an upgrade.
    pub upgrade_project_keywords: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            precedence: vec![Category::Quest, Category::Project, Category::Upgrade],
            quest_keywords: Vec::new(),
            project_keywords: Vec::new(),
            upgrade_keywords: Vec::new(),
            upgrade_project_keywords: vec![
                "upgrade".to_string(),
                "bench".to_string(),
                "station".to_string(),
                "workshop".to_string(),
            ],
        }
    }
}

impl ClassificationConfig {
    fn keywords(&self, category: Category) -> &[String] {
        match category {
            Category::Quest => &self.quest_keywords,
            Category::Project => &self.project_keywords,
            Category::Upgrade => &self.upgrade_keywords,
            Category::Recycle => &[],
        }
    }
}

fn keyword_hit(item: &Item, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let name = item.name.to_lowercase();
    let id = item.id.to_lowercase();
    keywords.iter().any(|kw| {
        let kw = kw.to_lowercase();
        !kw.is_empty() && (name.contains(&kw) || id.contains(&kw))
    })
}

/// Whether `item` independently satisfies `category`, ignoring precedence.
pub fn matches_category(
    item: &Item,
    category: Category,
    index: &ReferenceIndex,
    config: &ClassificationConfig,
) -> bool {
    let referenced = match category {
        Category::Quest => !index.quests_referencing(&item.id).is_empty(),
        Category::Project => index.projects_using(&item.id).iter().any(|u| !u.is_upgrade),
        Category::Upgrade => index.projects_using(&item.id).iter().any(|u| u.is_upgrade),
        Category::Recycle => false,
    };
    referenced || keyword_hit(item, config.keywords(category))
}

/// Every category `item` satisfies, in precedence order.
pub fn matched_categories(
    item: &Item,
    index: &ReferenceIndex,
    config: &ClassificationConfig,
) -> Vec<Category> {
    config
        .precedence
        .iter()
        .copied()
        .filter(|c| matches_category(item, *c, index, config))
        .collect()
}

/// Primary category: the first match in precedence order, else safe to recycle.
pub fn classify(item: &Item, index: &ReferenceIndex, config: &ClassificationConfig) -> Category {
    config
        .precedence
        .iter()
        .copied()
        .find(|c| matches_category(item, *c, index, config))
        .unwrap_or(Category::Recycle)
}

/// Classify every item in place. Returns how many items matched more than one category.
pub fn classify_all(items: &mut [Item], index: &ReferenceIndex, config: &ClassificationConfig) -> usize {
    items
        .par_iter_mut()
        .map(|item| {
            let matched = matched_categories(item, index, config);
            item.category = matched.first().copied().unwrap_or(Category::Recycle);
            if matched.len() > 1 {
                tracing::debug!(
                    "{} matches {:?}, classified as {}",
                    item.id,
                    matched,
                    item.category
                );
                1
            } else {
                0
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IngredientRef, Project, Quest};

    fn quest(name: &str, item: &str) -> Quest {
        Quest {
            name: name.to_string(),
            trader: None,
            item_refs: vec![IngredientRef::new(item, 1)],
            objectives: Vec::new(),
        }
    }

    fn project(name: &str, item: &str, count: u32) -> Project {
        Project {
            name: name.to_string(),
            cost: vec![IngredientRef::new(item, count)],
            yields: Vec::new(),
        }
    }

    fn build(items: &[Item], quests: &[Quest], projects: &[Project]) -> ReferenceIndex {
        let config = ClassificationConfig::default();
        ReferenceIndex::build(items, quests, projects, &[], &config.upgrade_project_keywords)
    }

    #[test]
    fn test_quest_reference_wins_and_is_never_recyclable() {
        let items = vec![Item::new("battery", "Battery")];
        let quests = vec![quest("Power Up", "battery")];
        let projects = vec![project("Expedition", "battery", 5)];
        let index = build(&items, &quests, &projects);
        let config = ClassificationConfig::default();

        let mut classified = items.clone();
        let overlaps = classify_all(&mut classified, &index, &config);
        assert!(classified[0].is_quest_item());
        assert!(!classified[0].is_safe_to_recycle());
        assert_eq!(overlaps, 1);
    }

    #[test]
    fn test_unreferenced_item_is_safe_to_recycle() {
        let items = vec![Item::new("rusted_gear", "Rusted Gear")];
        let index = build(&items, &[], &[]);
        let category = classify(&items[0], &index, &ClassificationConfig::default());
        assert_eq!(category, Category::Recycle);
    }

    #[test]
    fn test_upgrade_project_marks_upgrade_item() {
        let items = vec![Item::new("wire", "Wire")];
        let projects = vec![project("Bench Upgrade", "wire", 2)];
        let index = build(&items, &[], &projects);
        let category = classify(&items[0], &index, &ClassificationConfig::default());
        assert_eq!(category, Category::Upgrade);
    }

    #[test]
    fn test_precedence_is_configurable() {
        let items = vec![Item::new("wire", "Wire")];
        let projects = vec![
            project("Expedition", "wire", 10),
            project("Bench Upgrade", "wire", 2),
        ];
        let index = build(&items, &[], &projects);

        let default = ClassificationConfig::default();
        assert_eq!(classify(&items[0], &index, &default), Category::Project);

        let upgrade_first = ClassificationConfig {
            precedence: vec![Category::Quest, Category::Upgrade, Category::Project],
            ..ClassificationConfig::default()
        };
        assert_eq!(classify(&items[0], &index, &upgrade_first), Category::Upgrade);
    }

    #[test]
    fn test_keyword_override() {
        let items = vec![Item::new("locked_room_key", "Locked Room Key")];
        let index = build(&items, &[], &[]);
        let config = ClassificationConfig {
            quest_keywords: vec!["KEY".to_string()],
            ..ClassificationConfig::default()
        };
        assert_eq!(classify(&items[0], &index, &config), Category::Quest);
    }
}
