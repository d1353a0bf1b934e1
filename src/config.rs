// ⚙️ Configuration - immutable values handed to each engine run
// Loaded from an optional TOML file; every section has defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::converter::{DensityRule, UnitConverter};
use crate::error::{Result, ShoppingError};

// ============================================================================
// DATA DEFAULTS
// ============================================================================

/// Values substituted when a row is missing or has an invalid field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataDefaults {
    pub quantity: f64,
    pub price: f64,
    pub location: String,
    pub units: String,
    pub ingredient: String,
}

impl Default for DataDefaults {
    fn default() -> Self {
        DataDefaults {
            quantity: 1.0,
            price: 0.0,
            location: "Unknown".to_string(),
            units: "each".to_string(),
            ingredient: "Unknown Item".to_string(),
        }
    }
}

impl DataDefaults {
    pub fn validate(&self) -> Result<()> {
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(ShoppingError::Config(format!(
                "default quantity must be a non-negative number, got {}",
                self.quantity
            )));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ShoppingError::Config(format!(
                "default price must be a non-negative number, got {}",
                self.price
            )));
        }
        for (name, value) in [
            ("location", &self.location),
            ("units", &self.units),
            ("ingredient", &self.ingredient),
        ] {
            if value.trim().is_empty() {
                return Err(ShoppingError::Config(format!("default {} must not be empty", name)));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    pub enabled: bool,

    /// Extra density rules, consulted after the built-in sugar/flour/butter table
    pub densities: Vec<DensityRule>,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        ConversionSettings {
            enabled: true,
            densities: Vec::new(),
        }
    }
}

impl ConversionSettings {
    pub fn converter(&self) -> UnitConverter {
        UnitConverter::with_extra_rules(&self.densities)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            database_path: PathBuf::from("shopping.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub defaults: DataDefaults,
    pub conversion: ConversionSettings,
    pub storage: StorageSettings,
    pub server: ServerSettings,
}

impl AppConfig {
    pub fn from_toml(input: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(input).map_err(|e| ShoppingError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file, or fall back to defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                let config = Self::from_toml(&content)?;
                info!(path = %path.display(), "loaded configuration");
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.defaults.validate()?;
        for rule in &self.conversion.densities {
            if rule.ingredient_key.trim().is_empty() {
                return Err(ShoppingError::Config(
                    "density rule ingredient must not be empty".to_string(),
                ));
            }
            if !rule.density_factor.is_finite() || rule.density_factor <= 0.0 {
                return Err(ShoppingError::Config(format!(
                    "density for '{}' must be positive, got {}",
                    rule.ingredient_key, rule.density_factor
                )));
            }
        }
        Ok(())
    }
}
