//! Plain-text rendering of dashboard, item cards and detail views.

use crate::models::{Catalog, IngredientRef, Item, ItemDetail, Rarity};
use crate::view::{AppState, View};
use std::fmt::Write;

const RESET: &str = "\x1b[0m";

/// Rendering options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderConfig {
    /// Color rarity labels with ANSI escapes.
    pub color: bool,
}

impl RenderConfig {
    fn rarity(&self, rarity: Rarity) -> String {
        self.rarity_padded(rarity, 0)
    }

    /// Pad the plain label to `width` before wrapping it in color codes.
    fn rarity_padded(&self, rarity: Rarity, width: usize) -> String {
        let label = format!("{:<width$}", rarity.to_string(), width = width);
        if self.color {
            format!("{}{}{}", rarity.ansi(), label, RESET)
        } else {
            label
        }
    }
}

fn display_name<'a>(catalog: &'a Catalog, id: &'a str) -> &'a str {
    catalog.find(id).map(|i| i.name.as_str()).unwrap_or(id)
}

fn ingredient_line(catalog: &Catalog, reference: &IngredientRef) -> String {
    format!("{} x{}", display_name(catalog, &reference.item_id), reference.quantity)
}

/// One-line card for list views.
pub fn render_card(item: &Item, config: &RenderConfig) -> String {
    format!(
        "{:<28} {} {:>8} value  {:>6.2} kg  stack {:<4} [{}]",
        item.name,
        config.rarity_padded(item.rarity, 10),
        item.value,
        item.weight,
        item.max_stack,
        item.id
    )
}

pub fn render_list(items: &[&Item], config: &RenderConfig) -> String {
    if items.is_empty() {
        return "No items match.\n".to_string();
    }
    let mut out = String::new();
    for item in items {
        let _ = writeln!(out, "{}", render_card(item, config));
    }
    out
}

pub fn render_dashboard(state: &AppState, config: &RenderConfig) -> String {
    let mut out = String::new();
    let catalog = state.catalog();
    let _ = writeln!(
        out,
        "{} items (built {})",
        catalog.items.len(),
        catalog.built_at.format("%Y-%m-%d %H:%M UTC")
    );
    if !state.search().is_empty() {
        let _ = writeln!(out, "Search: \"{}\"", state.search());
    }
    for row in state.dashboard() {
        let _ = writeln!(out, "\n== {} ({}) [{}]", row.category.label(), row.count, row.category);
        for item in row.preview {
            let _ = writeln!(out, "  {}", render_card(item, config));
        }
    }
    out
}

pub fn render_detail(detail: &ItemDetail, catalog: &Catalog, config: &RenderConfig) -> String {
    let item = &detail.item;
    let mut out = String::new();
    let _ = writeln!(out, "{} [{}]", item.name, item.id);
    let _ = writeln!(out, "Rarity:    {}", config.rarity(item.rarity));
    if let Some(item_type) = &item.item_type {
        let _ = writeln!(out, "Type:      {}", item_type);
    }
    let _ = writeln!(out, "Category:  {}", item.category.label());
    let _ = writeln!(out, "Value:     {}", item.value);
    let _ = writeln!(out, "Weight:    {:.2} kg", item.weight);
    let _ = writeln!(out, "Stack:     {}", item.max_stack);
    if let Some(image) = &item.image {
        let _ = writeln!(out, "Image:     {}", image);
    }
    if !item.description.is_empty() {
        let _ = writeln!(out, "\n{}", item.description);
    }

    let mut section = |title: &str, lines: Vec<String>| {
        if lines.is_empty() {
            return;
        }
        let _ = writeln!(out, "\n{}:", title);
        for line in lines {
            let _ = writeln!(out, "  - {}", line);
        }
    };

    section(
        "Crafted from",
        detail.crafted_from.iter().map(|r| ingredient_line(catalog, r)).collect(),
    );
    section(
        "Recycles into",
        detail.recycles_into.iter().map(|r| ingredient_line(catalog, r)).collect(),
    );
    section(
        "Recycled from",
        detail.recycled_from.iter().map(|r| ingredient_line(catalog, r)).collect(),
    );
    section(
        "Used in",
        detail
            .used_in
            .iter()
            .map(|u| {
                let kind = if u.is_upgrade { " (upgrade)" } else { "" };
                format!("{} x{}{}", u.project, u.count, kind)
            })
            .collect(),
    );
    section("Quests", detail.quests.clone());
    section(
        "Traders",
        detail
            .traders
            .iter()
            .map(|t| match &t.cost {
                Some(cost) => format!("{}: x{} for {}", t.trader, t.quantity, ingredient_line(catalog, cost)),
                None => format!("{}: x{}", t.trader, t.quantity),
            })
            .collect(),
    );
    out
}

/// Render whatever the current view is.
pub fn render_view(state: &AppState, config: &RenderConfig) -> String {
    match state.current() {
        View::Dashboard => render_dashboard(state, config),
        View::Category(category) => {
            let items = state.visible_items();
            format!(
                "== {} ({}) sorted by {}\n{}",
                category.label(),
                items.len(),
                state.sort(),
                render_list(&items, config)
            )
        }
        View::Detail(_) => match state.selected_item() {
            Some(item) => {
                let catalog = state.catalog();
                render_detail(&catalog.index.detail(item), catalog, config)
            }
            None => "Item not found.\n".to_string(),
        },
    }
}
