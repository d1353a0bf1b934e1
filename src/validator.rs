// ✅ Row Validator - repairs loose input rows and records why
//
// Every substituted value leaves a ValidationWarning tagged with the row
// number. Rows with no identifiable ingredient are dropped, not defaulted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::DataDefaults;
use crate::converter::format_quantity;
use crate::error::{Result, ShoppingError};
use crate::units;

// ============================================================================
// FIELD NAMES
// ============================================================================

// Spreadsheet headers first, then API field names
const INGREDIENT_KEYS: &[&str] = &["Ingredient", "ingredient"];
const LOCATION_KEYS: &[&str] = &["Location", "location"];
const QUANTITY_KEYS: &[&str] = &["Qty", "qty", "quantity"];
const UNIT_KEYS: &[&str] = &["Units", "units", "unit"];
const PRICE_KEYS: &[&str] = &["Price", "price"];
const DONE_KEYS: &[&str] = &["Done?", "done"];

const DONE_VALUES: &[&str] = &["1", "true", "yes"];

// ============================================================================
// RAW ROW
// ============================================================================

/// Loosely-typed input row: field name → text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    fields: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.fields.insert(key.to_string(), value.to_string());
    }

    /// First present value among `keys`
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.fields.get(*key))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build from a JSON object. Nulls count as missing; anything that is not
    /// an object is a caller bug and the only hard failure here.
    pub fn from_json(value: &serde_json::Value, row: usize) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| ShoppingError::MalformedRow {
            row,
            reason: format!("expected an object, got {}", json_kind(value)),
        })?;

        let mut raw = RawRow::new();
        for (key, field) in object {
            match field {
                serde_json::Value::Null => {}
                serde_json::Value::String(text) => raw.insert(key, text),
                other => raw.insert(key, &other.to_string()),
            }
        }
        Ok(raw)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut raw = RawRow::new();
        for (key, value) in iter {
            raw.insert(key.as_ref(), value.as_ref());
        }
        raw
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Free-text done flag: "1", "true" or "yes" in any case
pub fn is_done(row: &RawRow) -> bool {
    row.get_any(DONE_KEYS)
        .map(|value| DONE_VALUES.contains(&value.trim().to_lowercase().as_str()))
        .unwrap_or(false)
}

// ============================================================================
// CLEAN ROW + WARNINGS
// ============================================================================

/// A validated row. Units are canonical; quantity and price are never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingRow {
    pub location: String,
    pub ingredient: String,
    pub quantity: f64,
    pub unit: String,
    pub price: f64,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_rows_processed: usize,
    pub rows_skipped: usize,
    pub warnings_count: usize,
    pub warnings: Vec<ValidationWarning>,
}

/// Outcome of reading a numeric field
#[derive(Debug, Clone, PartialEq)]
enum Amount {
    Missing,
    Invalid(String),
    /// Keeps the text as written so the warning shows the exact value
    Negative(String),
    Valid(f64),
}

fn parse_amount(raw: Option<&str>) -> Amount {
    let text = match raw.map(str::trim) {
        None | Some("") => return Amount::Missing,
        Some(text) => text,
    };

    match text.parse::<f64>() {
        Ok(value) if !value.is_finite() => Amount::Invalid(text.to_string()),
        Ok(value) if value < 0.0 => Amount::Negative(text.to_string()),
        Ok(value) => Amount::Valid(value),
        Err(_) => Amount::Invalid(text.to_string()),
    }
}

// ============================================================================
// DATA VALIDATOR
// ============================================================================

/// Owns one run's warnings; create a fresh one per consolidation
pub struct DataValidator {
    defaults: DataDefaults,
    warnings: Vec<ValidationWarning>,
    row_count: usize,
    skipped_rows: usize,
}

impl DataValidator {
    pub fn new(defaults: DataDefaults) -> Self {
        DataValidator {
            defaults,
            warnings: Vec::new(),
            row_count: 0,
            skipped_rows: 0,
        }
    }

    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<ValidationWarning> {
        self.warnings
    }

    fn warn(&mut self, row: usize, message: String) {
        debug!(row, %message, "row repaired");
        self.warnings.push(ValidationWarning { row, message });
    }

    /// Validate and clean one row. `None` means the row was dropped.
    pub fn validate_row(&mut self, row: &RawRow, row_number: usize) -> Option<ShoppingRow> {
        self.row_count += 1;
        let mut critical_missing = false;

        // Ingredient (critical)
        let mut ingredient = row.get_any(INGREDIENT_KEYS).unwrap_or("").trim().to_string();
        if ingredient.is_empty() {
            self.warn(row_number, "Missing ingredient name".to_string());
            ingredient = self.defaults.ingredient.clone();
            critical_missing = true;
        }

        // Location
        let mut location = row.get_any(LOCATION_KEYS).unwrap_or("").trim().to_string();
        if location.is_empty() {
            let message = format!("Missing location, using '{}'", self.defaults.location);
            self.warn(row_number, message);
            location = self.defaults.location.clone();
        }

        let quantity = self.resolve_amount(
            row.get_any(QUANTITY_KEYS),
            "quantity",
            self.defaults.quantity,
            row_number,
        );

        // Units: unknown spellings pass through, only blanks are defaulted
        let raw_unit = row.get_any(UNIT_KEYS).unwrap_or("").trim().to_string();
        let unit = if raw_unit.is_empty() {
            let message = format!("Missing units, using '{}'", self.defaults.units);
            self.warn(row_number, message);
            units::normalize_str(&self.defaults.units)
        } else {
            units::normalize_str(&raw_unit)
        };

        let price =
            self.resolve_amount(row.get_any(PRICE_KEYS), "price", self.defaults.price, row_number);

        let done = is_done(row);

        if critical_missing {
            warn!(row = row_number, "dropping row without an ingredient");
            self.warn(row_number, "Skipping row due to missing critical data".to_string());
            self.skipped_rows += 1;
            return None;
        }

        Some(ShoppingRow {
            location,
            ingredient,
            quantity,
            unit,
            price,
            done,
        })
    }

    fn resolve_amount(
        &mut self,
        raw: Option<&str>,
        field: &str,
        default: f64,
        row_number: usize,
    ) -> f64 {
        match parse_amount(raw) {
            Amount::Valid(value) => value,
            Amount::Missing => {
                let message = format!(
                    "Missing {}, using default ({})",
                    field,
                    format_quantity(default)
                );
                self.warn(row_number, message);
                default
            }
            Amount::Invalid(text) => {
                let message = format!(
                    "Invalid {} '{}', using default ({})",
                    field,
                    text,
                    format_quantity(default)
                );
                self.warn(row_number, message);
                default
            }
            Amount::Negative(text) => {
                let message = format!(
                    "Negative {} ({}), using default ({})",
                    field,
                    text,
                    format_quantity(default)
                );
                self.warn(row_number, message);
                default
            }
        }
    }

    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary {
            total_rows_processed: self.row_count,
            rows_skipped: self.skipped_rows,
            warnings_count: self.warnings.len(),
            warnings: self.warnings.clone(),
        }
    }
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new(DataDefaults::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_row() -> RawRow {
        RawRow::new()
            .with("Ingredient", "Flour")
            .with("Location", "Market")
            .with("Qty", "2")
            .with("Units", "cups")
            .with("Price", "3.50")
            .with("Done?", "False")
    }

    #[test]
    fn test_clean_row_has_no_warnings() {
        let mut validator = DataValidator::default();
        let row = validator.validate_row(&full_row(), 1).unwrap();

        assert_eq!(row.ingredient, "Flour");
        assert_eq!(row.location, "Market");
        assert_eq!(row.quantity, 2.0);
        assert_eq!(row.unit, "cup");
        assert_eq!(row.price, 3.5);
        assert!(!row.done);
        assert!(validator.warnings().is_empty());
    }

    #[test]
    fn test_missing_ingredient_drops_row_with_warnings() {
        let mut validator = DataValidator::default();
        let row = RawRow::new()
            .with("Ingredient", "")
            .with("Qty", "abc")
            .with("Units", "")
            .with("Price", "-5");

        assert!(validator.validate_row(&row, 3).is_none());

        let warnings = validator.warnings();
        assert!(warnings.len() >= 3);
        assert!(warnings.iter().all(|w| w.row == 3));
        assert!(warnings.iter().any(|w| w.message == "Missing ingredient name"));
        assert!(warnings.iter().any(|w| w.message.starts_with("Invalid quantity 'abc'")));
        assert!(warnings.iter().any(|w| w.message.starts_with("Negative price")));
        assert_eq!(
            warnings.last().unwrap().message,
            "Skipping row due to missing critical data"
        );

        let summary = validator.summary();
        assert_eq!(summary.total_rows_processed, 1);
        assert_eq!(summary.rows_skipped, 1);
        assert_eq!(summary.warnings_count, warnings.len());
    }

    #[test]
    fn test_missing_ingredient_drops_even_when_rest_is_valid() {
        let mut validator = DataValidator::default();
        let mut row = full_row();
        row.insert("Ingredient", "   ");
        assert!(validator.validate_row(&row, 7).is_none());
        assert_eq!(validator.warnings().len(), 2);
    }

    #[test]
    fn test_negative_quantity_replaced_by_default() {
        let defaults = DataDefaults {
            quantity: 4.0,
            ..DataDefaults::default()
        };
        let mut validator = DataValidator::new(defaults);
        let mut row = full_row();
        row.insert("Qty", "-2");

        let cleaned = validator.validate_row(&row, 2).unwrap();
        assert_eq!(cleaned.quantity, 4.0);
        assert_eq!(validator.warnings().len(), 1);
        assert_eq!(
            validator.warnings()[0].message,
            "Negative quantity (-2), using default (4)"
        );
    }

    #[test]
    fn test_tiny_negative_reported_as_written() {
        let mut validator = DataValidator::default();
        let mut row = full_row();
        row.insert("Qty", "-0.001");

        let cleaned = validator.validate_row(&row, 1).unwrap();
        assert_eq!(cleaned.quantity, 1.0);
        assert_eq!(
            validator.warnings()[0].message,
            "Negative quantity (-0.001), using default (1)"
        );
        println!("✅ Tiny negative reported as written PASSED");
    }

    #[test]
    fn test_missing_and_invalid_quantity_have_distinct_messages() {
        let mut validator = DataValidator::default();
        let mut missing = full_row();
        missing.insert("Qty", "");
        let mut invalid = full_row();
        invalid.insert("Qty", "a few");
        let mut infinite = full_row();
        infinite.insert("Qty", "inf");

        assert_eq!(validator.validate_row(&missing, 1).unwrap().quantity, 1.0);
        assert_eq!(validator.validate_row(&invalid, 2).unwrap().quantity, 1.0);
        assert_eq!(validator.validate_row(&infinite, 3).unwrap().quantity, 1.0);

        let messages: Vec<&str> = validator.warnings().iter().map(|w| w.message.as_str()).collect();
        assert_eq!(messages[0], "Missing quantity, using default (1)");
        assert_eq!(messages[1], "Invalid quantity 'a few', using default (1)");
        assert_eq!(messages[2], "Invalid quantity 'inf', using default (1)");
    }

    #[test]
    fn test_location_and_units_defaults() {
        let defaults = DataDefaults {
            location: "Pantry".to_string(),
            units: "pcs".to_string(),
            ..DataDefaults::default()
        };
        let mut validator = DataValidator::new(defaults);
        let row = RawRow::new()
            .with("ingredient", "eggs")
            .with("quantity", "12")
            .with("price", "4");

        let cleaned = validator.validate_row(&row, 1).unwrap();
        assert_eq!(cleaned.location, "Pantry");
        assert_eq!(cleaned.unit, "each");
        assert_eq!(validator.warnings().len(), 2);
        assert_eq!(validator.warnings()[0].message, "Missing location, using 'Pantry'");
        assert_eq!(validator.warnings()[1].message, "Missing units, using 'pcs'");
    }

    #[test]
    fn test_unknown_unit_passes_through() {
        let mut validator = DataValidator::default();
        let mut row = full_row();
        row.insert("Units", "Smidge");
        let cleaned = validator.validate_row(&row, 1).unwrap();
        assert_eq!(cleaned.unit, "smidge");
        assert!(validator.warnings().is_empty());
    }

    #[test]
    fn test_done_flag_parsing() {
        for (text, expected) in [("1", true), ("TRUE", true), (" yes ", true), ("no", false), ("", false), ("x", false)] {
            let mut row = full_row();
            row.insert("Done?", text);
            assert_eq!(is_done(&row), expected, "done = {:?}", text);
        }
        assert!(!is_done(&RawRow::new()));
    }

    #[test]
    fn test_empty_row_is_all_fields_missing() {
        let mut validator = DataValidator::default();
        assert!(validator.validate_row(&RawRow::new(), 5).is_none());
        // ingredient, location, quantity, units, price, skip
        assert_eq!(validator.warnings().len(), 6);
    }

    #[test]
    fn test_from_json() {
        let value = serde_json::json!({
            "ingredient": "butter",
            "quantity": 2,
            "units": "sticks",
            "location": null,
            "done": false
        });
        let raw = RawRow::from_json(&value, 1).unwrap();
        assert_eq!(raw.get_any(&["ingredient"]), Some("butter"));
        assert_eq!(raw.get_any(&["quantity"]), Some("2"));
        assert_eq!(raw.get_any(&["done"]), Some("false"));
        assert_eq!(raw.get_any(&["location"]), None);

        let err = RawRow::from_json(&serde_json::json!([1, 2]), 4).unwrap_err();
        assert!(err.to_string().contains("Malformed row 4"));
        assert!(err.to_string().contains("an array"));
    }
}
