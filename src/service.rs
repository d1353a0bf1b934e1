// 🛒 Shopping List Service - validate, then consolidate
//
// The single entry point drivers call (CLI, HTTP, batch). Each run builds its
// own validator and engine, so runs share no state.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{AppConfig, DataDefaults};
use crate::consolidation::{ConsolidatedLine, ConsolidationEngine};
use crate::converter::UnitConverter;
use crate::error::Result;
use crate::validator::{self, DataValidator, RawRow, ValidationSummary, ValidationWarning};

/// Input item as drivers submit it. Every field may be absent; the validator
/// decides what to do about it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShoppingItem {
    pub ingredient: Option<String>,
    pub quantity: Option<f64>,
    #[serde(alias = "unit")]
    pub units: Option<String>,
    pub location: Option<String>,
    pub price: Option<f64>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dish_id: Option<i64>,
}

impl ShoppingItem {
    pub fn new(ingredient: &str, quantity: f64, units: &str, location: &str, price: f64) -> Self {
        ShoppingItem {
            ingredient: Some(ingredient.to_string()),
            quantity: Some(quantity),
            units: Some(units.to_string()),
            location: Some(location.to_string()),
            price: Some(price),
            ..Default::default()
        }
    }

    pub fn to_raw_row(&self) -> RawRow {
        let mut row = RawRow::new();
        if let Some(ingredient) = &self.ingredient {
            row.insert("ingredient", ingredient);
        }
        if let Some(quantity) = self.quantity {
            row.insert("quantity", &quantity.to_string());
        }
        if let Some(units) = &self.units {
            row.insert("units", units);
        }
        if let Some(location) = &self.location {
            row.insert("location", location);
        }
        if let Some(price) = self.price {
            row.insert("price", &price.to_string());
        }
        row.insert("done", if self.done { "true" } else { "false" });
        row
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShoppingListRequest {
    pub items: Vec<ShoppingItem>,
    #[serde(default)]
    pub defaults: Option<DataDefaults>,
    #[serde(default = "default_true")]
    pub enable_unit_conversion: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingListReport {
    pub items: Vec<ConsolidatedLine>,
    pub total_items: usize,
    pub warnings: Vec<ValidationWarning>,
    pub conversion_log: Vec<String>,
    pub conversions_applied: usize,
    pub summary: ValidationSummary,
}

// ============================================================================
// SERVICE
// ============================================================================

#[derive(Debug, Clone)]
pub struct ShoppingListService {
    defaults: DataDefaults,
    converter: UnitConverter,
    enable_unit_conversion: bool,
}

impl ShoppingListService {
    pub fn new(defaults: DataDefaults, converter: UnitConverter, enable_unit_conversion: bool) -> Self {
        ShoppingListService {
            defaults,
            converter,
            enable_unit_conversion,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.defaults.clone(),
            config.conversion.converter(),
            config.conversion.enabled,
        )
    }

    pub fn with_unit_conversion(mut self, enabled: bool) -> Self {
        self.enable_unit_conversion = enabled;
        self
    }

    /// Caller-supplied defaults are checked here; a negative substitute would
    /// leak straight into the output rows.
    pub fn with_defaults(mut self, defaults: DataDefaults) -> Result<Self> {
        defaults.validate()?;
        self.defaults = defaults;
        Ok(self)
    }

    pub fn generate(&self, items: &[ShoppingItem]) -> ShoppingListReport {
        let rows: Vec<RawRow> = items.iter().map(ShoppingItem::to_raw_row).collect();
        self.generate_from_rows(&rows)
    }

    /// JSON objects in, report out. A non-object element is a caller bug.
    pub fn generate_from_json(&self, values: &[serde_json::Value]) -> Result<ShoppingListReport> {
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, value)| RawRow::from_json(value, i + 1))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.generate_from_rows(&rows))
    }

    /// Done rows are skipped before validation; row numbers stay 1-based
    /// positions in `rows`.
    pub fn generate_from_rows(&self, rows: &[RawRow]) -> ShoppingListReport {
        let mut validator = DataValidator::new(self.defaults.clone());
        let mut cleaned = Vec::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            if validator::is_done(row) {
                continue;
            }
            if let Some(valid) = validator.validate_row(row, index + 1) {
                cleaned.push(valid);
            }
        }

        let engine = ConsolidationEngine::new(self.converter.clone(), self.enable_unit_conversion);
        let (lines, conversion_log) = engine.consolidate(&cleaned);
        let summary = validator.summary();

        info!(
            input_rows = rows.len(),
            valid_rows = cleaned.len(),
            lines = lines.len(),
            warnings = summary.warnings_count,
            "shopping list generated"
        );

        ShoppingListReport {
            total_items: lines.len(),
            items: lines,
            warnings: validator.into_warnings(),
            conversions_applied: conversion_log.len(),
            conversion_log,
            summary,
        }
    }
}

impl Default for ShoppingListService {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// One-shot consolidation with the built-in converter. Fails with
/// `ShoppingError::Config` when the given defaults are unusable.
pub fn consolidate(
    items: &[ShoppingItem],
    defaults: Option<DataDefaults>,
    enable_unit_conversion: bool,
) -> Result<ShoppingListReport> {
    let mut service = ShoppingListService::new(
        DataDefaults::default(),
        UnitConverter::new(),
        enable_unit_conversion,
    );
    if let Some(defaults) = defaults {
        service = service.with_defaults(defaults)?;
    }
    Ok(service.generate(items))
}

impl ShoppingListRequest {
    pub fn run(&self, base: &ShoppingListService) -> Result<ShoppingListReport> {
        let mut service = base.clone().with_unit_conversion(self.enable_unit_conversion);
        if let Some(defaults) = &self.defaults {
            service = service.with_defaults(defaults.clone())?;
        }
        Ok(service.generate(&self.items))
    }
}
