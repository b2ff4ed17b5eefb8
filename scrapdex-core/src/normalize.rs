//! Identifier normalization and raw record normalization.
//!
//! Data sources disagree on casing, punctuation, separators and field names.
//! Everything here is tolerant: malformed fields fall back to defaults and
//! unusable records are skipped rather than reported as errors.

use crate::models::{IngredientRef, Item, Project, Quest, Rarity, RawItem, Trade};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;

lazy_static! {
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

const ROMAN_SUFFIXES: [(&str, &str); 4] = [("i", "1"), ("ii", "2"), ("iii", "3"), ("iv", "4")];

/// Lowercase alphanumeric tokens of a raw identifier or name.
pub fn tokens(raw: &str) -> Vec<String> {
    let lowered = raw.to_lowercase();
    NON_ALNUM
        .split(&lowered)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Candidate match keys for an identifier or display name.
///
/// "Anvil I", "anvil_1" and "ANVIL-1" all produce `anvil1`. Collisions between
/// unrelated names are possible.
pub fn fuzzy_keys(raw: &str) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    let mut toks = tokens(raw);
    if toks.is_empty() {
        return keys;
    }
    keys.insert(toks.concat());

    if let Some(last) = toks.pop() {
        let alternate = ROMAN_SUFFIXES.iter().find_map(|(roman, digit)| {
            if last == *roman {
                Some(*digit)
            } else if last == *digit {
                Some(*roman)
            } else {
                None
            }
        });
        if let Some(alt) = alternate {
            toks.push(alt.to_string());
            keys.insert(toks.concat());
        }
    }
    keys
}

/// True when the candidate key sets of `a` and `b` intersect.
pub fn keys_match(a: &str, b: &str) -> bool {
    let left = fuzzy_keys(a);
    fuzzy_keys(b).iter().any(|k| left.contains(k))
}

/// Title-case a snake/kebab-case identifier for display ("anvil_i" -> "Anvil I").
pub fn title_case_identifier(id: &str) -> String {
    id.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            if ROMAN_SUFFIXES.iter().any(|(roman, _)| *roman == lower) {
                return lower.to_uppercase();
            }
            let mut chars = lower.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Snake-case a display name for use as a fallback identifier.
pub fn snake_case_name(name: &str) -> String {
    tokens(name).join("_")
}

/// First present field among `keys`.
fn field<'a>(doc: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| doc.get(*k))
        .find(|v| !v.is_null())
}

/// A string, or a localized map preferring `en`.
fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() { None } else { Some(s.to_string()) }
        }
        Value::Object(map) => map
            .get("en")
            .and_then(text_value)
            .or_else(|| map.values().find_map(text_value)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field(doc: &Value, keys: &[&str]) -> Option<String> {
    field(doc, keys).and_then(text_value)
}

/// A number or a numeric string.
fn number_value(value: &Value) -> Option<f64> {
    let n: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn number_field(doc: &Value, keys: &[&str]) -> Option<f64> {
    field(doc, keys).and_then(number_value)
}

fn quantity(value: &Value) -> u32 {
    number_value(value)
        .filter(|n| *n >= 0.0)
        .map(|n| n.round() as u32)
        .unwrap_or(1)
}

/// Parse an ingredient list: `{id: qty}` map, list of objects, or list of bare ids.
pub fn parse_ingredients(value: &Value) -> Vec<IngredientRef> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(id, qty)| IngredientRef::new(id.clone(), quantity(qty)))
            .collect(),
        Value::Array(entries) => entries.iter().filter_map(parse_ingredient).collect(),
        _ => Vec::new(),
    }
}

fn parse_ingredient(entry: &Value) -> Option<IngredientRef> {
    match entry {
        Value::String(id) if !id.trim().is_empty() => Some(IngredientRef::new(id.trim(), 1)),
        Value::Object(_) => {
            let id = text_field(entry, &["itemId", "item_id", "item", "id", "name"])?;
            let qty = field(entry, &["quantity", "count", "amount", "qty"])
                .map(quantity)
                .unwrap_or(1);
            Some(IngredientRef::new(id, qty))
        }
        _ => None,
    }
}

fn ingredients_field(doc: &Value, keys: &[&str]) -> Vec<IngredientRef> {
    field(doc, keys).map(parse_ingredients).unwrap_or_default()
}

/// Map a raw item document onto the canonical item shape.
///
/// Returns `None` when no identifier can be derived.
pub fn normalize_item(raw: &RawItem) -> Option<Item> {
    let doc = &raw.doc;
    if !doc.is_object() {
        return None;
    }

    let name = text_field(doc, &["name", "displayName", "title"]);
    let id = text_field(doc, &["id", "itemId", "item_id", "slug"])
        .or_else(|| raw.file_stem.clone())
        .or_else(|| name.as_deref().map(snake_case_name))
        .filter(|id| !id.is_empty())?;
    let name = name.unwrap_or_else(|| title_case_identifier(&id));

    let mut item = Item::new(id, name);
    item.description = text_field(doc, &["description", "desc", "flavorText"]).unwrap_or_default();
    item.rarity = text_field(doc, &["rarity", "tier"])
        .map(|r| Rarity::parse(&r))
        .unwrap_or_default();
    item.item_type = text_field(doc, &["type", "itemType", "item_type", "category"]);
    item.weight = number_field(doc, &["weight", "weightKg", "weight_kg"])
        .filter(|w| *w >= 0.0)
        .unwrap_or(0.0);
    item.max_stack = number_field(doc, &["stackSize", "maxStack", "max_stack", "stack_size"])
        .filter(|s| *s >= 1.0)
        .map(|s| s as u32)
        .unwrap_or(1);
    item.value = number_field(doc, &["value", "sellValue", "sell_value", "price"])
        .filter(|v| *v >= 0.0)
        .map(|v| v.round() as u64)
        .unwrap_or(0);
    item.image = text_field(doc, &["image", "imageFilename", "image_url", "imageUrl", "icon"]);
    item.recipe = ingredients_field(doc, &["recipe", "craftingRecipe", "ingredients"]);
    item.recycles_into = ingredients_field(doc, &["recyclesInto", "recycles_into", "recycle"]);
    Some(item)
}

/// Fill fields missing from `item` with values from a detail document.
pub fn merge_detail(item: &mut Item, detail: &Value) {
    let Some(extra) = normalize_item(&RawItem::from_file(item.id.clone(), detail.clone())) else {
        return;
    };
    if item.description.is_empty() {
        item.description = extra.description;
    }
    if item.rarity == Rarity::Unknown {
        item.rarity = extra.rarity;
    }
    if item.item_type.is_none() {
        item.item_type = extra.item_type;
    }
    if item.weight == 0.0 {
        item.weight = extra.weight;
    }
    if item.max_stack <= 1 {
        item.max_stack = extra.max_stack;
    }
    if item.value == 0 {
        item.value = extra.value;
    }
    if item.image.is_none() {
        item.image = extra.image;
    }
    if item.recipe.is_empty() {
        item.recipe = extra.recipe;
    }
    if item.recycles_into.is_empty() {
        item.recycles_into = extra.recycles_into;
    }
}

/// Normalize a raw quest record.
pub fn normalize_quest(doc: &Value) -> Option<Quest> {
    if !doc.is_object() {
        return None;
    }
    let name = text_field(doc, &["name", "title", "id"])?;
    let trader = text_field(doc, &["trader", "giver", "traderName"]);

    let mut item_refs = ingredients_field(
        doc,
        &["requiredItemIds", "requiredItems", "required_items", "items"],
    );
    let mut objectives = Vec::new();
    if let Some(Value::Array(entries)) = field(doc, &["objectives", "steps"]) {
        for entry in entries {
            match entry {
                Value::Object(_) => {
                    if let Some(reference) = parse_ingredient(entry)
                        .filter(|_| field(entry, &["itemId", "item_id", "item"]).is_some())
                    {
                        item_refs.push(reference);
                    } else if let Some(text) = text_field(entry, &["text", "description", "name"]) {
                        objectives.push(text);
                    }
                }
                other => {
                    if let Some(text) = text_value(other) {
                        objectives.push(text);
                    }
                }
            }
        }
    }

    Some(Quest {
        name,
        trader,
        item_refs,
        objectives,
    })
}

/// Normalize a raw crafting project record.
pub fn normalize_project(doc: &Value) -> Option<Project> {
    if !doc.is_object() {
        return None;
    }
    let name = text_field(doc, &["name", "title", "id"])?;

    let mut cost = ingredients_field(doc, &["cost", "requirements", "ingredients"]);
    if let Some(Value::Array(phases)) = field(doc, &["phases"]) {
        for phase in phases {
            cost.extend(ingredients_field(
                phase,
                &["requirementItemIds", "requirements", "cost"],
            ));
        }
    }
    let yields = ingredients_field(doc, &["yield", "yields", "output", "rewards"]);

    Some(Project { name, cost, yields })
}

/// Normalize a raw trade record.
pub fn normalize_trade(doc: &Value) -> Option<Trade> {
    if !doc.is_object() {
        return None;
    }
    let trader = text_field(doc, &["trader", "traderName", "vendor"])?;
    let item_id = text_field(doc, &["itemId", "item_id", "item", "id"])?;
    let quantity = field(doc, &["quantity", "count", "amount"])
        .map(quantity)
        .unwrap_or(1);
    let cost = field(doc, &["cost", "price"]).and_then(|c| match c {
        Value::Object(_) | Value::String(_) => parse_ingredient(c),
        Value::Number(_) => Some(IngredientRef::new("coins", quantity_of(c))),
        _ => None,
    });

    Some(Trade {
        trader,
        item_id,
        quantity,
        cost,
    })
}

fn quantity_of(value: &Value) -> u32 {
    number_value(value).map(|n| n.max(0.0).round() as u32).unwrap_or(0)
}

/// Normalize every record, skipping the ones that cannot be used.
pub fn normalize_all<T>(docs: &[Value], kind: &str, f: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    let mut skipped = 0;
    let out: Vec<T> = docs
        .iter()
        .filter_map(|doc| {
            let parsed = f(doc);
            if parsed.is_none() {
                skipped += 1;
            }
            parsed
        })
        .collect();
    if skipped > 0 {
        tracing::debug!("Skipped {} unusable {} records", skipped, kind);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fuzzy_keys_share_candidate_for_roman_suffix() {
        let a = fuzzy_keys("Anvil I");
        let b = fuzzy_keys("anvil_1");
        let c = fuzzy_keys("ANVIL-1");
        assert!(a.contains("anvil1"));
        assert!(b.contains("anvil1"));
        assert!(c.contains("anvil1"));
        assert!(keys_match("Anvil I", "anvil_1"));
        assert!(keys_match("anvil_1", "ANVIL-1"));
    }

    #[test]
    fn test_fuzzy_keys_tricky_names() {
        let table = [
            ("Bettina III", "bettina_3", true),
            ("Kettle IV", "kettle-iv", true),
            ("Metal Parts", "metal_parts", true),
            ("ARC Alloy", "arc-alloy", true),
            ("Anvil II", "anvil_1", false),
            ("Wire", "Wires", false),
            ("Rubber Duck", "rubber_duck", true),
        ];
        for (a, b, expected) in table {
            assert_eq!(keys_match(a, b), expected, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_fuzzy_keys_empty_input() {
        assert!(fuzzy_keys("").is_empty());
        assert!(fuzzy_keys(" -_ ").is_empty());
        assert!(!keys_match("", ""));
    }

    #[test]
    fn test_title_case_identifier() {
        assert_eq!(title_case_identifier("anvil_i"), "Anvil I");
        assert_eq!(title_case_identifier("metal-parts"), "Metal Parts");
    }

    #[test]
    fn test_normalize_item_with_aliases() {
        let raw = RawItem::new(json!({
            "itemId": "anvil_i",
            "name": {"en": "Anvil I", "de": "Amboss I"},
            "rarity": "RARE",
            "weightKg": "2.5",
            "stackSize": 1,
            "sellValue": 5000,
            "imageFilename": "anvil.png",
            "recipe": {"metal_parts": 6, "rubber_parts": 2},
            "recyclesInto": [{"itemId": "metal_parts", "quantity": 3}]
        }));
        let item = normalize_item(&raw).unwrap();
        assert_eq!(item.id, "anvil_i");
        assert_eq!(item.name, "Anvil I");
        assert_eq!(item.rarity, Rarity::Rare);
        assert_eq!(item.weight, 2.5);
        assert_eq!(item.value, 5000);
        assert_eq!(item.image.as_deref(), Some("anvil.png"));
        assert_eq!(item.recipe.len(), 2);
        assert_eq!(item.recycles_into, vec![IngredientRef::new("metal_parts", 3)]);
    }

    #[test]
    fn test_normalize_item_id_from_file_stem() {
        let raw = RawItem::from_file("rusted_gear", json!({"value": "bogus"}));
        let item = normalize_item(&raw).unwrap();
        assert_eq!(item.id, "rusted_gear");
        assert_eq!(item.name, "Rusted Gear");
        assert_eq!(item.value, 0);
        assert_eq!(item.max_stack, 1);
        assert_eq!(item.rarity, Rarity::Unknown);
    }

    #[test]
    fn test_normalize_item_rejects_unusable_records() {
        assert!(normalize_item(&RawItem::new(json!("wire"))).is_none());
        assert!(normalize_item(&RawItem::new(json!({"value": 3}))).is_none());
    }

    #[test]
    fn test_normalize_quest_objectives() {
        let quest = normalize_quest(&json!({
            "name": {"en": "A Bad Feeling"},
            "trader": "Celeste",
            "objectives": [
                "Deliver 3 Wires to Celeste",
                {"itemId": "battery", "count": 2},
                {"text": "Find the old radio"}
            ],
            "requiredItemIds": [{"itemId": "fabric", "quantity": 4}]
        }))
        .unwrap();
        assert_eq!(quest.name, "A Bad Feeling");
        assert_eq!(quest.trader.as_deref(), Some("Celeste"));
        assert_eq!(quest.objectives.len(), 2);
        assert!(quest.item_refs.contains(&IngredientRef::new("battery", 2)));
        assert!(quest.item_refs.contains(&IngredientRef::new("fabric", 4)));
    }

    #[test]
    fn test_normalize_project_phases() {
        let project = normalize_project(&json!({
            "name": "Expedition",
            "phases": [
                {"requirementItemIds": [{"itemId": "metal_parts", "quantity": 150}]},
                {"requirementItemIds": [{"itemId": "wire", "quantity": 30}]}
            ]
        }))
        .unwrap();
        assert_eq!(project.cost.len(), 2);
        assert_eq!(project.cost[1], IngredientRef::new("wire", 30));
    }

    #[test]
    fn test_normalize_trade() {
        let trade = normalize_trade(&json!({
            "trader": "Tian Wen",
            "itemId": "anvil_i",
            "quantity": 1,
            "cost": {"itemId": "coins", "quantity": 7000}
        }))
        .unwrap();
        assert_eq!(trade.trader, "Tian Wen");
        assert_eq!(trade.cost, Some(IngredientRef::new("coins", 7000)));
        assert!(normalize_trade(&json!({"itemId": "x"})).is_none());
    }
}
