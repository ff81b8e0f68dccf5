use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Static description of a tradable currency pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSpec {
    /// Compact identifier, e.g. `EURUSD`.
    pub symbol: String,
    pub base_price: f64,
    /// Typical spread as a fraction of price (0.0002 = 2 pips on a major).
    #[serde(default = "default_typical_spread")]
    pub typical_spread: f64,
    /// Quote precision: 5 for majors, 3 for yen pairs.
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    /// Smallest order increment in base units.
    #[serde(default = "default_lot_step")]
    pub lot_step: f64,
}

fn default_typical_spread() -> f64 {
    0.0002
}

fn default_decimals() -> u32 {
    5
}

fn default_lot_step() -> f64 {
    1.0
}

impl SymbolSpec {
    pub fn round_price(&self, price: f64) -> f64 {
        let scale = 10f64.powi(self.decimals as i32);
        (price * scale).round() / scale
    }

    /// Round a quantity down to the lot step.
    pub fn round_quantity(&self, quantity: f64) -> f64 {
        (quantity / self.lot_step).floor() * self.lot_step
    }
}

/// `[[symbol]]` tables in a TOML file override the built-in registry.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolFileConfig {
    #[serde(rename = "symbol")]
    pub symbols: Vec<SymbolSpec>,
}

/// Fixed set of tradable symbols, loaded once at start.
#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    specs: HashMap<String, SymbolSpec>,
    order: Vec<String>,
}

impl SymbolRegistry {
    /// The ten majors with conventional base prices.
    pub fn builtin() -> Self {
        let defaults: &[(&str, f64, u32)] = &[
            ("EURUSD", 1.0850, 5),
            ("GBPUSD", 1.2650, 5),
            ("USDJPY", 150.25, 3),
            ("AUDUSD", 0.6420, 5),
            ("USDCAD", 1.3750, 5),
            ("USDCHF", 0.8890, 5),
            ("NZDUSD", 0.5980, 5),
            ("EURGBP", 0.8580, 5),
            ("EURJPY", 163.15, 3),
            ("GBPJPY", 190.25, 3),
        ];

        let specs = defaults.iter().map(|&(symbol, base_price, decimals)| SymbolSpec {
            symbol: symbol.to_string(),
            base_price,
            typical_spread: default_typical_spread(),
            decimals,
            lot_step: default_lot_step(),
        });
        Self::from_specs(specs)
    }

    /// Load the registry from a TOML file. Fatal at construction time.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: SymbolFileConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad symbols file '{path}': {e}")))?;
        if file.symbols.is_empty() {
            return Err(Error::Config(format!("symbols file '{path}' is empty")));
        }
        Ok(Self::from_specs(file.symbols))
    }

    fn from_specs(specs: impl IntoIterator<Item = SymbolSpec>) -> Self {
        let mut map = HashMap::new();
        let mut order = Vec::new();
        for spec in specs {
            if map.insert(spec.symbol.clone(), spec.clone()).is_none() {
                order.push(spec.symbol);
            }
        }
        Self { specs: map, order }
    }

    pub fn get(&self, symbol: &str) -> Result<&SymbolSpec> {
        self.specs
            .get(symbol)
            .ok_or_else(|| Error::UnknownSymbol(symbol.to_string()))
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.specs.contains_key(symbol)
    }

    /// Symbols in registration order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Specs in registration order.
    pub fn specs(&self) -> impl Iterator<Item = &SymbolSpec> {
        self.order.iter().filter_map(|s| self.specs.get(s))
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_the_majors() {
        let registry = SymbolRegistry::builtin();
        assert_eq!(registry.len(), 10);
        let eurusd = registry.get("EURUSD").unwrap();
        assert_eq!(eurusd.base_price, 1.0850);
        assert_eq!(eurusd.decimals, 5);
        let usdjpy = registry.get("USDJPY").unwrap();
        assert_eq!(usdjpy.decimals, 3);
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        let registry = SymbolRegistry::builtin();
        let err = registry.get("XAUXAG").unwrap_err();
        assert!(matches!(err, Error::UnknownSymbol(_)));
    }

    #[test]
    fn price_rounding_respects_decimals() {
        let registry = SymbolRegistry::builtin();
        let eurusd = registry.get("EURUSD").unwrap();
        assert_eq!(eurusd.round_price(1.085_004_9), 1.085);
        let usdjpy = registry.get("USDJPY").unwrap();
        assert_eq!(usdjpy.round_price(150.2549), 150.255);
    }

    #[test]
    fn quantity_rounds_down_to_lot_step() {
        let spec = SymbolSpec {
            symbol: "EURUSD".into(),
            base_price: 1.0850,
            typical_spread: 0.0002,
            decimals: 5,
            lot_step: 1.0,
        };
        assert_eq!(spec.round_quantity(9216.8), 9216.0);
    }

    #[test]
    fn file_config_parses_with_defaults() {
        let toml_src = r#"
            [[symbol]]
            symbol = "EURUSD"
            base_price = 1.0850

            [[symbol]]
            symbol = "USDJPY"
            base_price = 150.25
            decimals = 3
        "#;
        let file: SymbolFileConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(file.symbols.len(), 2);
        assert_eq!(file.symbols[0].decimals, 5);
        assert_eq!(file.symbols[0].lot_step, 1.0);
        assert_eq!(file.symbols[1].decimals, 3);
    }
}
