// 📝 Ingredient Parser - free text → structured ingredient entries
//
// The IngredientParser trait is the boundary: anything that turns recipe text
// into ParsedIngredient values plugs in behind it (an LLM client, a web
// scraper). LineParser is the deterministic implementation that ships here.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::converter::{format_quantity, UnitConverter};
use crate::units;

// ============================================================================
// CORE TYPES
// ============================================================================

/// One ingredient pulled out of free text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedIngredient {
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub matched_id: Option<i64>,

    // Set by align_to_existing when the stored ingredient uses another unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_unit: Option<String>,
}

impl ParsedIngredient {
    pub fn new(name: &str) -> Self {
        ParsedIngredient {
            name: name.to_string(),
            quantity: None,
            unit: None,
            notes: String::new(),
            matched_id: None,
            converted_quantity: None,
            converted_unit: None,
        }
    }

    /// Builder pattern: quantity and unit together
    pub fn with_amount(mut self, quantity: f64, unit: &str) -> Self {
        self.quantity = Some(quantity);
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_string();
        self
    }

    pub fn with_match(mut self, id: i64) -> Self {
        self.matched_id = Some(id);
        self
    }
}

/// Stored ingredient a parser may match against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingIngredient {
    pub id: i64,
    pub name: String,
    pub unit: String,
}

// ============================================================================
// PARSER TRAIT
// ============================================================================

/// Turns free text into ingredients. Implementations may be slow or fail
/// (network, quota); the engine only runs after this returns.
pub trait IngredientParser: Send + Sync {
    fn parse(&self, text: &str, existing: &[ExistingIngredient]) -> Result<Vec<ParsedIngredient>>;

    fn name(&self) -> &str;
}

/// Parse, merge duplicates, then attach conversions for matched ingredients
pub fn parse_ingredients(
    parser: &dyn IngredientParser,
    text: &str,
    existing: &[ExistingIngredient],
    converter: &UnitConverter,
) -> Result<Vec<ParsedIngredient>> {
    let parsed = parser.parse(text, existing)?;
    debug!(parser = parser.name(), count = parsed.len(), "parsed ingredient text");
    Ok(align_to_existing(dedupe_parsed(parsed), existing, converter))
}

// ============================================================================
// LINE PARSER
// ============================================================================

const BULLETS: &[char] = &['-', '*', '•'];
const TO_TASTE: &str = "to taste";

/// One ingredient per line: `[qty] [unit] name[, notes]`
#[derive(Debug, Clone, Default)]
pub struct LineParser;

impl LineParser {
    pub fn new() -> Self {
        LineParser
    }

    /// Parse a single line; `None` for blanks and section headers
    pub fn parse_line(&self, line: &str) -> Option<ParsedIngredient> {
        let line = line.trim().trim_start_matches(BULLETS).trim();
        if line.is_empty() || line.ends_with(':') {
            return None;
        }

        let (main, mut notes) = match line.split_once(',') {
            Some((main, notes)) => (main.trim().to_string(), notes.trim().to_string()),
            None => (line.to_string(), String::new()),
        };

        let mut main = main;
        let mut to_taste = false;
        if let Some(stripped) = strip_suffix_ignore_case(&main, TO_TASTE) {
            main = stripped.trim().to_string();
            to_taste = true;
        }

        let tokens: Vec<&str> = main.split_whitespace().collect();
        let (quantity, mut rest) = read_quantity(&tokens);

        let mut unit = None;
        if quantity.is_some() {
            let (found, used) = read_unit(rest);
            rest = &rest[used..];
            unit = Some(found.unwrap_or_else(|| units::DEFAULT_UNIT.to_string()));
            if rest.first().map(|t| t.eq_ignore_ascii_case("of")) == Some(true) {
                rest = &rest[1..];
            }
        }

        let name = rest.join(" ").to_lowercase();
        if name.is_empty() {
            return None;
        }

        if to_taste {
            notes = join_notes(&notes, TO_TASTE);
        }

        Some(ParsedIngredient {
            name,
            quantity,
            unit,
            notes,
            matched_id: None,
            converted_quantity: None,
            converted_unit: None,
        })
    }
}

impl IngredientParser for LineParser {
    fn parse(&self, text: &str, existing: &[ExistingIngredient]) -> Result<Vec<ParsedIngredient>> {
        let mut parsed: Vec<ParsedIngredient> = text.lines().filter_map(|l| self.parse_line(l)).collect();
        for ingredient in &mut parsed {
            ingredient.matched_id = match_existing(&ingredient.name, existing);
        }
        Ok(parsed)
    }

    fn name(&self) -> &str {
        "line"
    }
}

fn strip_suffix_ignore_case<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let split = text.len().checked_sub(suffix.len())?;
    if !text.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = text.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

fn join_notes(existing: &str, extra: &str) -> String {
    if existing.is_empty() {
        extra.to_string()
    } else {
        format!("{}; {}", existing, extra)
    }
}

fn unicode_fraction(c: char) -> Option<f64> {
    match c {
        '½' => Some(0.5),
        '⅓' => Some(1.0 / 3.0),
        '⅔' => Some(2.0 / 3.0),
        '¼' => Some(0.25),
        '¾' => Some(0.75),
        '⅛' => Some(0.125),
        _ => None,
    }
}

/// `2`, `0.5`, `1/2`, `½`, `1½`
fn parse_number(token: &str) -> Option<f64> {
    if let Some((numerator, denominator)) = token.split_once('/') {
        let numerator: f64 = numerator.parse().ok()?;
        let denominator: f64 = denominator.parse().ok()?;
        return (denominator != 0.0).then(|| numerator / denominator);
    }

    let last = token.chars().last()?;
    if let Some(fraction) = unicode_fraction(last) {
        let whole = &token[..token.len() - last.len_utf8()];
        let whole: f64 = if whole.is_empty() { 0.0 } else { whole.parse().ok()? };
        return Some(whole + fraction);
    }

    token
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

fn is_fraction(token: &str) -> bool {
    token.contains('/') || (token.chars().count() == 1 && token.chars().all(|c| unicode_fraction(c).is_some()))
}

/// Leading quantity, including mixed numbers like `1 1/2`
fn read_quantity<'a, 'b>(tokens: &'b [&'a str]) -> (Option<f64>, &'b [&'a str]) {
    let Some(first) = tokens.first().and_then(|t| parse_number(t)) else {
        return (None, tokens);
    };

    if first.fract() == 0.0 {
        if let Some(second) = tokens.get(1).filter(|t| is_fraction(t)) {
            if let Some(fraction) = parse_number(second) {
                return (Some(first + fraction), &tokens[2..]);
            }
        }
    }
    (Some(first), &tokens[1..])
}

/// Recognized unit at the front of `tokens` and how many tokens it used.
/// Two-word units ("fl oz") are tried first.
fn read_unit(tokens: &[&str]) -> (Option<String>, usize) {
    for width in [2, 1] {
        if tokens.len() <= width {
            // leave at least one token for the name
            continue;
        }
        let candidate = tokens[..width].join(" ").trim_end_matches('.').to_string();
        let normalized = units::normalize_str(&candidate);
        if units::is_canonical(&normalized) {
            return (Some(normalized), width);
        }
    }
    (None, 0)
}

/// Id of a stored ingredient with the same name, ignoring case and a plural `s`
fn match_existing(name: &str, existing: &[ExistingIngredient]) -> Option<i64> {
    let singular = name.strip_suffix('s').unwrap_or(name);
    existing
        .iter()
        .find(|e| {
            let stored = e.name.trim().to_lowercase();
            stored == name || stored == singular || stored.strip_suffix('s') == Some(name)
        })
        .map(|e| e.id)
}

// ============================================================================
// DEDUP + ALIGNMENT
// ============================================================================

/// Merge entries sharing a lowercased name. Quantities are summed only when
/// every entry has one and they all share a unit; otherwise they move to notes.
pub fn dedupe_parsed(parsed: Vec<ParsedIngredient>) -> Vec<ParsedIngredient> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<ParsedIngredient>> = HashMap::new();

    for ingredient in parsed {
        let key = ingredient.name.trim().to_lowercase();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(ingredient);
    }

    let mut merged = Vec::with_capacity(order.len());
    for key in order {
        let Some(mut items) = groups.remove(&key) else {
            continue;
        };
        if items.len() == 1 {
            merged.extend(items.pop());
            continue;
        }
        merged.push(merge_group(&items));
    }
    merged
}

fn merge_group(items: &[ParsedIngredient]) -> ParsedIngredient {
    let mut combined = ParsedIngredient::new(&items[0].name);
    combined.matched_id = items.iter().find_map(|i| i.matched_id);

    let mut amounts = Vec::new();
    let mut notes = Vec::new();
    for item in items {
        match (item.quantity, &item.unit) {
            (Some(q), Some(u)) => amounts.push(format!("{} {}", format_quantity(q), u)),
            (Some(q), None) => amounts.push(format_quantity(q)),
            _ => {}
        }
        if !item.notes.is_empty() {
            notes.push(item.notes.clone());
        }
    }

    let mut unit_set: Vec<&String> = items.iter().filter_map(|i| i.unit.as_ref()).collect();
    unit_set.dedup();
    let all_quantified = items.iter().all(|i| i.quantity.is_some());

    if unit_set.len() == 1 && all_quantified {
        combined.quantity = Some(items.iter().filter_map(|i| i.quantity).sum());
        combined.unit = Some(unit_set[0].clone());
    } else if !amounts.is_empty() {
        combined.notes = amounts.join(" + ");
    }

    if !notes.is_empty() {
        combined.notes = join_notes(&combined.notes, &notes.join("; "));
    }
    combined
}

/// Normalize names and units; for entries matched to a stored ingredient
/// with another unit, attach the quantity in the stored unit when possible.
pub fn align_to_existing(
    parsed: Vec<ParsedIngredient>,
    existing: &[ExistingIngredient],
    converter: &UnitConverter,
) -> Vec<ParsedIngredient> {
    let by_id: HashMap<i64, &ExistingIngredient> = existing.iter().map(|e| (e.id, e)).collect();

    parsed
        .into_iter()
        .map(|mut ingredient| {
            ingredient.name = ingredient.name.trim().to_lowercase();
            ingredient.unit = Some(units::normalize(ingredient.unit.as_deref()));

            let parent = ingredient.matched_id.and_then(|id| by_id.get(&id));
            if let (Some(parent), Some(quantity), Some(unit)) =
                (parent, ingredient.quantity, ingredient.unit.as_deref())
            {
                let parent_unit = units::normalize_str(&parent.unit);
                if unit != parent_unit {
                    if let Some(converted) =
                        converter.convert(quantity, unit, &parent_unit, Some(&ingredient.name))
                    {
                        ingredient.converted_quantity = Some(converted);
                        ingredient.converted_unit = Some(parent_unit);
                    }
                }
            }
            ingredient
        })
        .collect()
}
