// 📏 Unit Vocabulary - spelling variants → canonical unit names
// Pure lookup table, no state. Unknown units pass through untouched.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

/// Unit used when the caller gives nothing at all
pub const DEFAULT_UNIT: &str = "each";

// ============================================================================
// ALIAS TABLE
// ============================================================================

/// (alias, canonical) pairs. Keys are lowercase; lookups lowercase first.
const UNIT_ALIASES: &[(&str, &str)] = &[
    // Volume - small
    ("tsp", "teaspoon"),
    ("tsps", "teaspoon"),
    ("ts", "teaspoon"),
    ("t", "teaspoon"),
    ("teaspoons", "teaspoon"),
    ("tbsp", "tablespoon"),
    ("tbsps", "tablespoon"),
    ("tbs", "tablespoon"),
    ("tablespoons", "tablespoon"),
    ("fl oz", "fluid ounce"),
    ("fl. oz", "fluid ounce"),
    ("fl_oz", "fluid ounce"),
    ("floz", "fluid ounce"),
    ("fluid oz", "fluid ounce"),
    ("fluid_ounce", "fluid ounce"),
    ("fluid ounces", "fluid ounce"),
    // Volume - medium
    ("c", "cup"),
    ("cups", "cup"),
    // Volume - large
    ("pt", "pint"),
    ("pints", "pint"),
    ("qt", "quart"),
    ("quarts", "quart"),
    ("gal", "gallon"),
    ("gallons", "gallon"),
    // Volume - metric
    ("ml", "milliliter"),
    ("mls", "milliliter"),
    ("milliliters", "milliliter"),
    ("millilitre", "milliliter"),
    ("l", "liter"),
    ("liters", "liter"),
    ("litre", "liter"),
    ("litres", "liter"),
    // Weight - imperial
    ("oz", "ounce"),
    ("ozs", "ounce"),
    ("ounces", "ounce"),
    ("lb", "pound"),
    ("lbs", "pound"),
    ("pounds", "pound"),
    // Weight - metric
    ("g", "gram"),
    ("grams", "gram"),
    ("kg", "kilogram"),
    ("kgs", "kilogram"),
    ("kilograms", "kilogram"),
    // Count
    ("ea", "each"),
    ("pc", "each"),
    ("pcs", "each"),
    ("piece", "each"),
    ("pieces", "each"),
    // Produce
    ("heads", "head"),
    ("bunches", "bunch"),
    ("cloves", "clove"),
    ("sprigs", "sprig"),
    ("stalks", "stalk"),
    // Containers
    ("cans", "can"),
    ("packages", "package"),
    ("pkg", "package"),
    ("pkgs", "package"),
    ("containers", "container"),
    ("bottles", "bottle"),
    ("loaves", "loaf"),
    // Other
    ("pinches", "pinch"),
    ("dashes", "dash"),
    ("slices", "slice"),
    ("sticks", "stick"),
];

/// Canonical names that have no alias pointing at them but are still first-class
const EXTRA_CANONICAL: &[&str] = &["head", "bunch", "clove", "sprig", "stalk", "can", "package",
    "container", "bottle", "loaf", "pinch", "dash", "slice", "stick", "each"];

static ALIAS_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| UNIT_ALIASES.iter().copied().collect());

static CANONICAL_SET: LazyLock<BTreeSet<&'static str>> = LazyLock::new(|| {
    UNIT_ALIASES
        .iter()
        .map(|(_, canonical)| *canonical)
        .chain(EXTRA_CANONICAL.iter().copied())
        .collect()
});

// ============================================================================
// LOOKUPS
// ============================================================================

/// Normalize a unit spelling to its canonical form.
///
/// Empty or missing input becomes `"each"`. Unknown spellings come back
/// trimmed and lowercased so custom units ("smidge") survive.
pub fn normalize(raw: Option<&str>) -> String {
    let trimmed = match raw {
        Some(value) => value.trim().to_lowercase(),
        None => return DEFAULT_UNIT.to_string(),
    };

    if trimmed.is_empty() {
        return DEFAULT_UNIT.to_string();
    }

    if let Some(canonical) = ALIAS_MAP.get(trimmed.as_str()) {
        return (*canonical).to_string();
    }

    // Already canonical, or a custom unit we keep verbatim
    trimmed
}

/// Shorthand for the common non-optional case
pub fn normalize_str(raw: &str) -> String {
    normalize(Some(raw))
}

/// Sorted list of every canonical unit name
pub fn canonical_units() -> Vec<&'static str> {
    CANONICAL_SET.iter().copied().collect()
}

pub fn is_canonical(unit: &str) -> bool {
    CANONICAL_SET.contains(unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve_to_same_canonical() {
        assert_eq!(normalize_str("lbs"), "pound");
        assert_eq!(normalize_str("pound"), "pound");
        assert_eq!(normalize_str("lbs"), normalize_str("pound"));
        assert_eq!(normalize_str("  TBSP "), "tablespoon");
        assert_eq!(normalize_str("Fl Oz"), "fluid ounce");
        assert_eq!(normalize_str("Cloves"), "clove");
    }

    #[test]
    fn test_missing_unit_is_each() {
        assert_eq!(normalize(None), "each");
        assert_eq!(normalize(Some("")), "each");
        assert_eq!(normalize(Some("   ")), "each");
    }

    #[test]
    fn test_unknown_unit_passes_through() {
        assert_eq!(normalize_str("smidge"), "smidge");
        assert_eq!(normalize_str(" Handful "), "handful");
        assert_ne!(normalize_str("smidge"), "each");
    }

    #[test]
    fn test_uppercase_single_letters_lowercase_first() {
        // "T" and "t" collapse once lowercased
        assert_eq!(normalize_str("T"), "teaspoon");
        assert_eq!(normalize_str("C"), "cup");
        assert_eq!(normalize_str("L"), "liter");
    }

    #[test]
    fn test_canonical_units_sorted_and_closed() {
        let units = canonical_units();
        let mut sorted = units.clone();
        sorted.sort();
        assert_eq!(units, sorted);

        for unit in &units {
            assert!(is_canonical(unit));
            assert_eq!(normalize_str(unit), *unit, "{} should be a fixed point", unit);
        }
        assert!(units.contains(&"cup"));
        assert!(units.contains(&"each"));
        assert!(!units.contains(&"lbs"));
    }
}
