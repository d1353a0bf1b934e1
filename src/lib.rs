// Shopping List Engine - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod units;          // Unit vocabulary + aliases
pub mod category;       // volume / weight / count
pub mod converter;      // dimensional + density conversion
pub mod validator;      // row repair with warnings
pub mod consolidation;  // grouping + best common unit
pub mod service;        // outward consolidate() boundary
pub mod config;
pub mod error;
pub mod parser;
pub mod db;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use category::{category_of, UnitCategory};
pub use config::{AppConfig, ConversionSettings, DataDefaults, ServerSettings, StorageSettings};
pub use consolidation::{ConsolidatedLine, ConsolidationEngine};
pub use converter::{format_quantity, DensityRule, UnitConverter};
pub use db::{
    Dish, CourseType, Event, ImportStats, Ingredient, ItemFilter, MasterRow, NewDish,
    ShoppingItemUpdate, ShoppingListItem,
    setup_database, open_database, load_master_csv, import_master_rows,
    write_shopping_list_csv, write_master_csv, insert_event, get_events_for_entity,
};
pub use error::{Result, ShoppingError};
pub use parser::{
    align_to_existing, dedupe_parsed, parse_ingredients,
    ExistingIngredient, IngredientParser, LineParser, ParsedIngredient,
};
pub use service::{consolidate, ShoppingItem, ShoppingListReport, ShoppingListRequest, ShoppingListService};
pub use units::{canonical_units, normalize};
pub use validator::{DataValidator, RawRow, ShoppingRow, ValidationSummary, ValidationWarning};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
