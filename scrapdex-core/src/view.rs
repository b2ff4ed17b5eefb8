//! Navigation and list state for browsing a catalog.
//!
//! `AppState` is only changed through its transition methods, so every view
//! the CLI renders is derivable from the state alone.

use crate::error::{Result, ScrapdexError};
use crate::models::{Catalog, Category, Item};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Number of items shown per category on the dashboard.
pub const DASHBOARD_PREVIEW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    ValueHigh,
    ValueLow,
    Rarity,
    Weight,
}

impl SortKey {
    pub const ALL: [SortKey; 5] = [
        SortKey::Name,
        SortKey::ValueHigh,
        SortKey::ValueLow,
        SortKey::Rarity,
        SortKey::Weight,
    ];

    pub fn compare(self, a: &Item, b: &Item) -> Ordering {
        let primary = match self {
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::ValueHigh => b.value.cmp(&a.value),
            SortKey::ValueLow => a.value.cmp(&b.value),
            SortKey::Rarity => b.rarity.ordinal().cmp(&a.rarity.ordinal()),
            SortKey::Weight => b.weight.total_cmp(&a.weight),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SortKey::Name => "Name",
            SortKey::ValueHigh => "Value (High)",
            SortKey::ValueLow => "Value (Low)",
            SortKey::Rarity => "Rarity",
            SortKey::Weight => "Weight",
        };
        f.write_str(label)
    }
}

impl FromStr for SortKey {
    type Err = ScrapdexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "name" => Ok(SortKey::Name),
            "value" | "value-high" | "value-(high)" => Ok(SortKey::ValueHigh),
            "value-low" | "value-(low)" => Ok(SortKey::ValueLow),
            "rarity" => Ok(SortKey::Rarity),
            "weight" => Ok(SortKey::Weight),
            other => Err(ScrapdexError::Parse(format!("Unknown sort key: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Dashboard,
    Category(Category),
    Detail(String),
}

/// One dashboard row: a category, its size and its most valuable items.
#[derive(Debug, Clone)]
pub struct CategorySummary<'a> {
    pub category: Category,
    pub count: usize,
    pub preview: Vec<&'a Item>,
}

#[derive(Debug, Clone)]
pub struct AppState {
    catalog: Catalog,
    search: String,
    sort: SortKey,
    stack: Vec<View>,
}

impl AppState {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            search: String::new(),
            sort: SortKey::default(),
            stack: vec![View::Dashboard],
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn sort(&self) -> SortKey {
        self.sort
    }

    pub fn current(&self) -> &View {
        self.stack.last().unwrap_or(&View::Dashboard)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Dashboard -> Category. From a detail view this replaces the detail.
    pub fn open_category(&mut self, category: Category) {
        if matches!(self.current(), View::Detail(_)) {
            self.stack.pop();
        }
        if matches!(self.current(), View::Category(_)) {
            self.stack.pop();
        }
        self.stack.push(View::Category(category));
    }

    /// Category -> Detail or Dashboard -> Detail.
    pub fn open_item(&mut self, id: &str) -> Result<()> {
        if self.catalog.find(id).is_none() {
            return Err(ScrapdexError::NotFound(format!("Item {}", id)));
        }
        if matches!(self.current(), View::Detail(_)) {
            self.stack.pop();
        }
        self.stack.push(View::Detail(id.to_string()));
        Ok(())
    }

    /// Return to the previous view. No-op on the dashboard.
    pub fn back(&mut self) -> &View {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
        self.current()
    }

    pub fn home(&mut self) {
        self.stack.truncate(1);
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into().trim().to_string();
    }

    pub fn set_sort(&mut self, sort: SortKey) {
        self.sort = sort;
    }

    pub fn selected_item(&self) -> Option<&Item> {
        match self.current() {
            View::Detail(id) => self.catalog.find(id),
            _ => None,
        }
    }

    fn matches_search(&self, item: &Item) -> bool {
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        item.name.to_lowercase().contains(&needle) || item.id.to_lowercase().contains(&needle)
    }

    /// Items in `category` (or all), filtered by the search string and sorted.
    pub fn items_in(&self, category: Option<Category>) -> Vec<&Item> {
        let mut items: Vec<&Item> = self
            .catalog
            .items
            .iter()
            .filter(|item| category.is_none_or(|c| item.category == c))
            .filter(|item| self.matches_search(item))
            .collect();
        items.sort_by(|a, b| self.sort.compare(a, b));
        items
    }

    /// Items visible in the current view.
    pub fn visible_items(&self) -> Vec<&Item> {
        match self.current() {
            View::Dashboard => self.items_in(None),
            View::Category(category) => self.items_in(Some(*category)),
            View::Detail(_) => self.selected_item().into_iter().collect(),
        }
    }

    /// Per-category counts with the most valuable matching items.
    pub fn dashboard(&self) -> Vec<CategorySummary<'_>> {
        Category::ALL
            .iter()
            .map(|category| {
                let mut items = self.items_in(Some(*category));
                items.sort_by(|a, b| SortKey::ValueHigh.compare(a, b));
                CategorySummary {
                    category: *category,
                    count: items.len(),
                    preview: items.into_iter().take(DASHBOARD_PREVIEW).collect(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::ReferenceIndex;
    use crate::models::Rarity;
    use chrono::Utc;

    fn item(id: &str, name: &str, value: u64, category: Category) -> Item {
        let mut item = Item::new(id, name);
        item.value = value;
        item.category = category;
        item
    }

    fn state() -> AppState {
        let mut legendary = item("zeta", "zeta core", 900, Category::Recycle);
        legendary.rarity = Rarity::Legendary;
        AppState::new(Catalog {
            items: vec![
                item("wire", "Wire", 40, Category::Upgrade),
                item("battery", "battery", 120, Category::Quest),
                item("anvil_i", "Anvil I", 5000, Category::Recycle),
                item("arc_alloy", "ARC Alloy", 120, Category::Project),
                legendary,
            ],
            index: ReferenceIndex::default(),
            built_at: Utc::now(),
        })
    }

    #[test]
    fn test_sort_value_high_is_non_increasing() {
        let mut state = state();
        state.set_sort(SortKey::ValueHigh);
        let values: Vec<u64> = state.visible_items().iter().map(|i| i.value).collect();
        assert!(values.windows(2).all(|w| w[0] >= w[1]), "{:?}", values);
    }

    #[test]
    fn test_sort_name_is_case_insensitive() {
        let state = state();
        let names: Vec<String> = state
            .visible_items()
            .iter()
            .map(|i| i.name.to_lowercase())
            .collect();
        assert!(names.windows(2).all(|w| w[0] <= w[1]), "{:?}", names);
        assert_eq!(names.first().map(String::as_str), Some("anvil i"));
    }

    #[test]
    fn test_sort_rarity_puts_rarest_first() {
        let mut state = state();
        state.set_sort(SortKey::Rarity);
        assert_eq!(state.visible_items()[0].id, "zeta");
    }

    #[test]
    fn test_search_filters_name_and_id() {
        let mut state = state();
        state.set_search("  ALLOY ");
        let ids: Vec<&str> = state.visible_items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["arc_alloy"]);
        state.set_search("anvil_");
        assert_eq!(state.visible_items().len(), 1);
    }

    #[test]
    fn test_navigation_transitions() {
        let mut state = state();
        assert_eq!(state.current(), &View::Dashboard);
        assert_eq!(state.back(), &View::Dashboard);

        state.open_category(Category::Quest);
        assert_eq!(state.current(), &View::Category(Category::Quest));
        assert_eq!(state.visible_items().len(), 1);

        state.open_item("battery").unwrap();
        assert_eq!(state.selected_item().unwrap().id, "battery");
        assert_eq!(state.back(), &View::Category(Category::Quest));
        assert_eq!(state.back(), &View::Dashboard);

        state.open_item("wire").unwrap();
        assert_eq!(state.depth(), 2);
        assert_eq!(state.back(), &View::Dashboard);
    }

    #[test]
    fn test_open_unknown_item_keeps_view() {
        let mut state = state();
        state.open_category(Category::Upgrade);
        assert!(state.open_item("hammer").is_err());
        assert_eq!(state.current(), &View::Category(Category::Upgrade));
    }

    #[test]
    fn test_detail_to_detail_replaces_top() {
        let mut state = state();
        state.open_category(Category::Recycle);
        state.open_item("anvil_i").unwrap();
        state.open_item("zeta").unwrap();
        assert_eq!(state.depth(), 3);
        state.open_category(Category::Project);
        assert_eq!(state.depth(), 2);
        state.home();
        assert_eq!(state.current(), &View::Dashboard);
    }

    #[test]
    fn test_dashboard_counts() {
        let state = state();
        let rows = state.dashboard();
        assert_eq!(rows.len(), 4);
        let recycle = rows.iter().find(|r| r.category == Category::Recycle).unwrap();
        assert_eq!(recycle.count, 2);
        assert_eq!(recycle.preview[0].id, "anvil_i");
    }

    #[test]
    fn test_sort_key_from_str() {
        assert_eq!("Value (High)".parse::<SortKey>().unwrap(), SortKey::ValueHigh);
        assert_eq!("value_low".parse::<SortKey>().unwrap(), SortKey::ValueLow);
        assert!("colour".parse::<SortKey>().is_err());
    }
}
