// 🗂️ Unit Categorizer - volume / weight / count
// Decides whether two units are directly comparable.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::units;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitCategory {
    Volume,
    Weight,
    Count,
}

impl UnitCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitCategory::Volume => "volume",
            UnitCategory::Weight => "weight",
            UnitCategory::Count => "count",
        }
    }

    /// Unit a consolidated group of this category is reported in
    pub fn preferred_unit(&self) -> &'static str {
        match self {
            UnitCategory::Volume => "cup",
            UnitCategory::Weight => "pound",
            UnitCategory::Count => "each",
        }
    }
}

impl fmt::Display for UnitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// MEMBERSHIP LISTS (canonical names)
// ============================================================================

pub const VOLUME_UNITS: &[&str] = &[
    "teaspoon",
    "tablespoon",
    "fluid ounce",
    "cup",
    "pint",
    "quart",
    "gallon",
    "milliliter",
    "liter",
];

pub const WEIGHT_UNITS: &[&str] = &["ounce", "pound", "gram", "kilogram", "stick"];

pub const COUNT_UNITS: &[&str] = &[
    "each",
    "clove",
    "head",
    "bunch",
    "package",
    "container",
    "bottle",
    "loaf",
];

/// Category of a unit. Normalizes first; anything unlisted counts as `Count`.
pub fn category_of(unit: &str) -> UnitCategory {
    let normalized = units::normalize_str(unit);
    let name = normalized.as_str();

    if VOLUME_UNITS.contains(&name) {
        UnitCategory::Volume
    } else if WEIGHT_UNITS.contains(&name) {
        UnitCategory::Weight
    } else {
        UnitCategory::Count
    }
}

/// True when one side is volume and the other weight
pub fn spans_volume_weight(a: UnitCategory, b: UnitCategory) -> bool {
    matches!(
        (a, b),
        (UnitCategory::Volume, UnitCategory::Weight) | (UnitCategory::Weight, UnitCategory::Volume)
    )
}
