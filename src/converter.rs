// ⚖️ Unit Converter - dimensional conversion + ingredient densities
//
// Same-dimension conversions go through a static factor table (milliliters for
// volume, grams for weight, 1:1 for the count units). Volume↔weight only works
// for ingredients with a density rule, chained through cups and ounces.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::category::{self, UnitCategory};
use crate::units;

// ============================================================================
// DIMENSIONAL TABLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Volume,
    Mass,
    Dimensionless,
}

/// (canonical unit, dimension, size in base units)
/// Volume base: milliliter (US customary). Mass base: gram.
const UNIT_TABLE: &[(&str, Dimension, f64)] = &[
    ("milliliter", Dimension::Volume, 1.0),
    ("liter", Dimension::Volume, 1000.0),
    ("teaspoon", Dimension::Volume, 4.928_921_593_75),
    ("tablespoon", Dimension::Volume, 14.786_764_781_25),
    ("fluid ounce", Dimension::Volume, 29.573_529_562_5),
    ("cup", Dimension::Volume, 236.588_236_5),
    ("pint", Dimension::Volume, 473.176_473),
    ("quart", Dimension::Volume, 946.352_946),
    ("gallon", Dimension::Volume, 3_785.411_784),
    ("gram", Dimension::Mass, 1.0),
    ("kilogram", Dimension::Mass, 1000.0),
    ("ounce", Dimension::Mass, 28.349_523_125),
    ("pound", Dimension::Mass, 453.592_37),
    // A stick of butter is 4 oz
    ("stick", Dimension::Mass, 113.398_092_5),
    ("each", Dimension::Dimensionless, 1.0),
    ("clove", Dimension::Dimensionless, 1.0),
    ("head", Dimension::Dimensionless, 1.0),
    ("bunch", Dimension::Dimensionless, 1.0),
    ("package", Dimension::Dimensionless, 1.0),
    ("container", Dimension::Dimensionless, 1.0),
    ("bottle", Dimension::Dimensionless, 1.0),
    ("loaf", Dimension::Dimensionless, 1.0),
];

fn lookup(unit: &str) -> Option<(Dimension, f64)> {
    UNIT_TABLE
        .iter()
        .find(|(name, _, _)| *name == unit)
        .map(|(_, dimension, size)| (*dimension, *size))
}

/// Multiplier taking one `from` into `to`, if both share a dimension
fn dimensional_factor(from: &str, to: &str) -> Option<f64> {
    let (from_dim, from_size) = lookup(from)?;
    let (to_dim, to_size) = lookup(to)?;
    if from_dim != to_dim {
        return None;
    }
    Some(from_size / to_size)
}

// ============================================================================
// DENSITY RULES
// ============================================================================

/// Ingredient-specific volume→weight ratio, expressed as ounces per cup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityRule {
    /// Substring matched case-insensitively against the ingredient name
    #[serde(alias = "ingredient")]
    pub ingredient_key: String,

    /// Ounces of weight in one cup of volume
    #[serde(alias = "ounces_per_cup")]
    pub density_factor: f64,
}

impl DensityRule {
    pub fn new(ingredient_key: &str, density_factor: f64) -> Self {
        DensityRule {
            ingredient_key: ingredient_key.to_lowercase(),
            density_factor,
        }
    }

    /// Volume side of the rule
    pub const VOLUME_UNIT: &'static str = "cup";
    /// Weight side of the rule
    pub const WEIGHT_UNIT: &'static str = "ounce";

    pub fn matches(&self, ingredient: &str) -> bool {
        !self.ingredient_key.is_empty()
            && ingredient
                .to_lowercase()
                .contains(&self.ingredient_key.to_lowercase())
    }
}

/// Built-in density table
pub fn default_density_rules() -> Vec<DensityRule> {
    vec![
        DensityRule::new("sugar", 7.05),
        DensityRule::new("flour", 4.25),
        DensityRule::new("butter", 8.0),
    ]
}

// ============================================================================
// ROUNDING / FORMATTING
// ============================================================================

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

fn magnitude_places(value: f64) -> usize {
    if value < 0.01 {
        4
    } else if value < 0.1 {
        3
    } else {
        2
    }
}

/// Keep more decimals as values shrink so teaspoon-sized amounts survive
pub fn round_by_magnitude(value: f64) -> f64 {
    round_to(value, magnitude_places(value) as i32)
}

/// Compact display: `2`, `1.5`, `0.94`, `0.021`, `0.004`. Uses the same
/// magnitude steps as `round_by_magnitude`, so a rounded value prints in full.
pub fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let fixed = format!("{:.*}", magnitude_places(value.abs()), value);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

// ============================================================================
// UNIT CONVERTER
// ============================================================================

#[derive(Debug, Clone)]
pub struct UnitConverter {
    density_rules: Vec<DensityRule>,
}

impl UnitConverter {
    /// Converter with the built-in density table
    pub fn new() -> Self {
        UnitConverter {
            density_rules: default_density_rules(),
        }
    }

    /// Built-in rules first, then `extra` (first match wins)
    pub fn with_extra_rules(extra: &[DensityRule]) -> Self {
        let mut density_rules = default_density_rules();
        density_rules.extend(extra.iter().cloned());
        UnitConverter { density_rules }
    }

    pub fn density_rules(&self) -> &[DensityRule] {
        &self.density_rules
    }

    /// Convert `quantity` between units, or `None` when it cannot be done.
    ///
    /// Identical units (after normalization) return the quantity untouched;
    /// every other result is rounded by magnitude.
    pub fn convert(
        &self,
        quantity: f64,
        from_unit: &str,
        to_unit: &str,
        ingredient: Option<&str>,
    ) -> Option<f64> {
        let from = units::normalize_str(from_unit);
        let to = units::normalize_str(to_unit);

        if from == to {
            return Some(quantity);
        }

        let factor = self.conversion_factor(&from, &to, ingredient)?;
        let result = quantity * factor;
        if !result.is_finite() {
            return None;
        }
        Some(round_by_magnitude(result))
    }

    /// Whether `convert` would succeed for these units and ingredient
    pub fn can_convert(&self, from_unit: &str, to_unit: &str, ingredient: Option<&str>) -> bool {
        self.convert(1.0, from_unit, to_unit, ingredient).is_some()
    }

    /// Shared decision path for `convert` and `can_convert`.
    /// Both units must already be normalized.
    fn conversion_factor(&self, from: &str, to: &str, ingredient: Option<&str>) -> Option<f64> {
        if let Some(name) = ingredient.filter(|n| !n.trim().is_empty()) {
            if let Some(factor) = self.density_factor(from, to, name) {
                return Some(factor);
            }
        }
        dimensional_factor(from, to)
    }

    fn density_factor(&self, from: &str, to: &str, ingredient: &str) -> Option<f64> {
        let from_category = category::category_of(from);
        let to_category = category::category_of(to);
        if !category::spans_volume_weight(from_category, to_category) {
            return None;
        }

        for rule in self.density_rules.iter().filter(|r| r.matches(ingredient)) {
            if rule.density_factor <= 0.0 || !rule.density_factor.is_finite() {
                continue;
            }

            let factor = if from_category == UnitCategory::Volume {
                // source → cups → ounces (via density) → target
                dimensional_factor(from, DensityRule::VOLUME_UNIT).and_then(|to_cups| {
                    dimensional_factor(DensityRule::WEIGHT_UNIT, to)
                        .map(|from_ounces| to_cups * rule.density_factor * from_ounces)
                })
            } else {
                // source → ounces → cups (via density) → target
                dimensional_factor(from, DensityRule::WEIGHT_UNIT).and_then(|to_ounces| {
                    dimensional_factor(DensityRule::VOLUME_UNIT, to)
                        .map(|from_cups| to_ounces / rule.density_factor * from_cups)
                })
            };

            if let Some(factor) = factor {
                trace!(
                    ingredient,
                    rule = %rule.ingredient_key,
                    from,
                    to,
                    factor,
                    "density conversion"
                );
                return Some(factor);
            }
        }

        None
    }

    /// Pick the unit a group of rows should be reported in.
    ///
    /// One distinct unit → that unit. One shared category → the category's
    /// preferred unit. Mixed categories → the first unit as given.
    pub fn find_best_common_unit<S: AsRef<str>>(units_list: &[S]) -> String {
        let Some(first) = units_list.first() else {
            return units::DEFAULT_UNIT.to_string();
        };

        let mut unique: Vec<String> = Vec::new();
        for unit in units_list {
            let normalized = units::normalize_str(unit.as_ref());
            if !unique.contains(&normalized) {
                unique.push(normalized);
            }
        }

        if unique.len() == 1 {
            return unique.remove(0);
        }

        let first_category = category::category_of(&unique[0]);
        if unique
            .iter()
            .all(|unit| category::category_of(unit) == first_category)
        {
            return first_category.preferred_unit().to_string();
        }

        // Mixed categories: input-order dependent, kept for compatibility
        first.as_ref().to_string()
    }
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self::new()
    }
}
