// 🧮 Consolidation Engine - one line per (location, ingredient, unit)
//
// Groups validated rows, picks a common unit per group, converts what it can
// and leaves the rest as separate lines. Output order is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::converter::{format_quantity, round_by_magnitude, UnitConverter};
use crate::validator::ShoppingRow;

/// One consolidated shopping-list line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedLine {
    pub location: String,
    pub ingredient: String,
    pub quantity: f64,
    pub unit: String,
    pub price: f64,
}

type LineKey = (String, String, String);

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    quantity: f64,
    price: f64,
}

impl Totals {
    fn add(&mut self, quantity: f64, price: f64) {
        self.quantity += quantity;
        self.price += price;
    }
}

/// Rows sharing (location, lowercased ingredient). `ingredient` keeps the
/// casing of the first row seen.
struct Group<'a> {
    location: String,
    ingredient: String,
    rows: Vec<&'a ShoppingRow>,
}

fn round_price(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// CONSOLIDATION ENGINE
// ============================================================================

pub struct ConsolidationEngine {
    converter: UnitConverter,
    enable_unit_conversion: bool,
}

impl ConsolidationEngine {
    pub fn new(converter: UnitConverter, enable_unit_conversion: bool) -> Self {
        ConsolidationEngine {
            converter,
            enable_unit_conversion,
        }
    }

    /// Merge rows into lines sorted by (location, ingredient, unit), plus a
    /// log entry for every group where a conversion merged several rows.
    pub fn consolidate(&self, rows: &[ShoppingRow]) -> (Vec<ConsolidatedLine>, Vec<String>) {
        let mut buckets: BTreeMap<LineKey, Totals> = BTreeMap::new();
        let mut conversion_log = Vec::new();

        for group in group_rows(rows) {
            if !self.enable_unit_conversion || group.rows.len() == 1 {
                aggregate_direct(&group, &group.rows, &mut buckets);
            } else {
                self.aggregate_converted(&group, &mut buckets, &mut conversion_log);
            }
        }

        let lines: Vec<ConsolidatedLine> = buckets
            .into_iter()
            .map(|((location, ingredient, unit), totals)| ConsolidatedLine {
                location,
                ingredient,
                quantity: totals.quantity,
                unit,
                price: round_price(totals.price),
            })
            .collect();

        info!(
            rows = rows.len(),
            lines = lines.len(),
            conversions = conversion_log.len(),
            "consolidated shopping list"
        );
        (lines, conversion_log)
    }

    fn aggregate_converted(
        &self,
        group: &Group<'_>,
        buckets: &mut BTreeMap<LineKey, Totals>,
        conversion_log: &mut Vec<String>,
    ) {
        let units: Vec<&str> = group.rows.iter().map(|row| row.unit.as_str()).collect();
        let best_unit = UnitConverter::find_best_common_unit(&units);
        let ingredient = Some(group.ingredient.as_str());

        let mut converted: Vec<(&ShoppingRow, f64)> = Vec::new();
        let mut leftovers: Vec<&ShoppingRow> = Vec::new();

        for &row in &group.rows {
            let convertible = row.unit == best_unit
                || self.converter.can_convert(&row.unit, &best_unit, ingredient);
            if !convertible {
                leftovers.push(row);
                continue;
            }
            match self
                .converter
                .convert(row.quantity, &row.unit, &best_unit, ingredient)
            {
                Some(quantity) => converted.push((row, quantity)),
                None => {
                    debug!(
                        ingredient = %group.ingredient,
                        unit = %row.unit,
                        "conversion failed after can_convert, keeping original unit"
                    );
                    leftovers.push(row);
                }
            }
        }

        if !converted.is_empty() {
            let key = (
                group.location.clone(),
                group.ingredient.clone(),
                best_unit.clone(),
            );
            let totals = buckets.entry(key).or_default();
            let mut summed = 0.0;
            for (row, quantity) in &converted {
                summed += quantity;
                totals.add(*quantity, row.price);
            }
            totals.quantity = round_by_magnitude(totals.quantity);

            if converted.len() > 1 {
                let parts: Vec<String> = converted
                    .iter()
                    .map(|(row, _)| format!("{} {}", format_quantity(row.quantity), row.unit))
                    .collect();
                let entry = format!(
                    "{}: {} -> {} {}",
                    group.ingredient,
                    parts.join(" + "),
                    format_quantity(round_by_magnitude(summed)),
                    best_unit
                );
                debug!(%entry, "conversion applied");
                conversion_log.push(entry);
            }
        }

        aggregate_direct(group, &leftovers, buckets);
    }
}

impl Default for ConsolidationEngine {
    fn default() -> Self {
        Self::new(UnitConverter::new(), true)
    }
}

/// Group non-done rows by (location, lowercased ingredient), in first-seen order
fn group_rows(rows: &[ShoppingRow]) -> Vec<Group<'_>> {
    let mut groups: Vec<Group<'_>> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for row in rows.iter().filter(|row| !row.done) {
        let key = (row.location.clone(), row.ingredient.to_lowercase());
        match index.get(&key) {
            Some(&position) => groups[position].rows.push(row),
            None => {
                index.insert(key, groups.len());
                groups.push(Group {
                    location: row.location.clone(),
                    ingredient: row.ingredient.clone(),
                    rows: vec![row],
                });
            }
        }
    }
    groups
}

/// Sum rows that share a unit; different units stay separate lines
fn aggregate_direct(
    group: &Group<'_>,
    rows: &[&ShoppingRow],
    buckets: &mut BTreeMap<LineKey, Totals>,
) {
    for row in rows {
        let key = (
            group.location.clone(),
            group.ingredient.clone(),
            row.unit.clone(),
        );
        buckets.entry(key).or_default().add(row.quantity, row.price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(location: &str, ingredient: &str, quantity: f64, unit: &str, price: f64) -> ShoppingRow {
        ShoppingRow {
            location: location.to_string(),
            ingredient: ingredient.to_string(),
            quantity,
            unit: unit.to_string(),
            price,
            done: false,
        }
    }

    #[test]
    fn test_flour_cup_and_ounces_merge() {
        let engine = ConsolidationEngine::default();
        let rows = vec![
            row("Market", "flour", 1.0, "cup", 1.0),
            row("Market", "flour", 4.0, "ounce", 2.0),
        ];

        let (lines, log) = engine.consolidate(&rows);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].location, "Market");
        assert_eq!(lines[0].ingredient, "flour");
        assert_eq!(lines[0].unit, "cup");
        assert!((lines[0].quantity - 1.94).abs() < 0.01);
        assert_eq!(lines[0].price, 3.0);

        assert_eq!(log.len(), 1);
        assert!(log[0].contains("flour"));
        assert_eq!(log[0], "flour: 1 cup + 4 ounce -> 1.94 cup");
        println!("✅ Flour consolidation PASSED: {}", log[0]);
    }

    #[test]
    fn test_same_category_uses_preferred_unit() {
        let engine = ConsolidationEngine::default();
        let rows = vec![
            row("Store", "Milk", 1.0, "quart", 3.0),
            row("Store", "milk", 2.0, "cup", 0.0),
        ];

        let (lines, log) = engine.consolidate(&rows);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].ingredient, "Milk");
        assert_eq!(lines[0].unit, "cup");
        assert!((lines[0].quantity - 6.0).abs() < 0.01);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_non_convertible_rows_stay_separate() {
        let engine = ConsolidationEngine::default();
        let rows = vec![
            row("Market", "garlic", 3.0, "clove", 0.5),
            row("Market", "garlic", 2.0, "ounce", 1.0),
            row("Market", "garlic", 1.0, "clove", 0.25),
        ];

        let (lines, log) = engine.consolidate(&rows);
        // best unit falls back to the first one seen; ounce cannot become clove
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].unit, "clove");
        assert_eq!(lines[0].quantity, 4.0);
        assert_eq!(lines[0].price, 0.75);
        assert_eq!(lines[1].unit, "ounce");
        assert_eq!(lines[1].quantity, 2.0);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_single_row_group_is_untouched() {
        let engine = ConsolidationEngine::default();
        let rows = vec![row("Deli", "ham", 0.333, "pound", 4.0)];
        let (lines, log) = engine.consolidate(&rows);
        assert_eq!(lines[0].quantity, 0.333);
        assert_eq!(lines[0].unit, "pound");
        assert!(log.is_empty());
    }

    #[test]
    fn test_small_totals_keep_their_decimals_in_log() {
        let engine = ConsolidationEngine::default();
        let rows = vec![
            row("Market", "salt", 0.25, "teaspoon", 0.0),
            row("Market", "salt", 0.25, "tablespoon", 0.0),
        ];

        let (lines, log) = engine.consolidate(&rows);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].unit, "cup");
        assert_eq!(lines[0].quantity, 0.021);
        assert_eq!(log.len(), 1);
        assert!(log[0].ends_with("-> 0.021 cup"), "log was {}", log[0]);
        println!("✅ Small totals in log PASSED");
    }

    #[test]
    fn test_conversion_disabled_sums_same_unit_only() {
        let engine = ConsolidationEngine::new(UnitConverter::new(), false);
        let rows = vec![
            row("Market", "sugar", 1.0, "cup", 1.0),
            row("Market", "sugar", 2.0, "cup", 1.0),
            row("Market", "sugar", 8.0, "ounce", 2.0),
        ];

        let (lines, log) = engine.consolidate(&rows);
        assert_eq!(lines.len(), 2);
        assert_eq!((lines[0].unit.as_str(), lines[0].quantity), ("cup", 3.0));
        assert_eq!((lines[1].unit.as_str(), lines[1].quantity), ("ounce", 8.0));
        assert!(log.is_empty());
    }

    #[test]
    fn test_done_rows_never_contribute() {
        let engine = ConsolidationEngine::default();
        let mut bought = row("Market", "eggs", 12.0, "each", 5.0);
        bought.done = true;
        let rows = vec![bought, row("Market", "bread", 1.0, "loaf", 3.0)];

        let (lines, _) = engine.consolidate(&rows);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].ingredient, "bread");
    }

    #[test]
    fn test_locations_group_separately() {
        let engine = ConsolidationEngine::default();
        let rows = vec![
            row("Costco", "butter", 1.0, "pound", 6.0),
            row("Market", "butter", 2.0, "stick", 2.0),
        ];
        let (lines, log) = engine.consolidate(&rows);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].location, "Costco");
        assert_eq!(lines[1].location, "Market");
        assert!(log.is_empty());
    }

    #[test]
    fn test_zero_quantity_group_still_yields_line() {
        let engine = ConsolidationEngine::default();
        let rows = vec![
            row("Market", "salt", 0.0, "teaspoon", 0.0),
            row("Market", "salt", 0.0, "tablespoon", 0.0),
        ];
        let (lines, _) = engine.consolidate(&rows);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].unit, "cup");
        assert_eq!(lines[0].quantity, 0.0);
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let engine = ConsolidationEngine::default();
        let rows = vec![
            row("Market", "onion", 2.0, "each", 1.0),
            row("Bakery", "rolls", 6.0, "each", 4.0),
            row("Market", "carrot", 1.0, "pound", 1.5),
            row("Market", "carrot", 8.0, "ounce", 0.75),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        let (forward, _) = engine.consolidate(&rows);
        let (backward, _) = engine.consolidate(&reversed);

        let keys: Vec<(String, String, String)> = forward
            .iter()
            .map(|l| (l.location.clone(), l.ingredient.clone(), l.unit.clone()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(
            serde_json::to_string(&forward).unwrap(),
            serde_json::to_string(&backward).unwrap()
        );
    }
}
