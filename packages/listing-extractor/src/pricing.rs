//! Per-token pricing and cost accounting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;
use crate::types::usage::TokenUsage;

/// USD price per token for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    /// Price per prompt token
    pub input: f64,
    /// Price per completion token
    pub output: f64,
}

impl ModelPrice {
    pub fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }

    /// Build from the per-million-token prices providers publish.
    pub fn per_million(input: f64, output: f64) -> Self {
        Self::new(input / 1_000_000.0, output / 1_000_000.0)
    }

    fn validate(&self, model: &str) -> Result<(), ConfigError> {
        for (label, price) in [("input", self.input), ("output", self.output)] {
            if !price.is_finite() || price < 0.0 {
                return Err(ConfigError::InvalidPricing {
                    model: model.to_string(),
                    reason: format!("{} price must be a non-negative number, got {}", label, price),
                });
            }
        }
        Ok(())
    }
}

/// Model id → per-token prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    prices: BTreeMap<String, ModelPrice>,
}

impl Default for PricingTable {
    /// Prices for the models in the built-in catalog.
    fn default() -> Self {
        Self::empty()
            .with_price("gpt-4o-mini", ModelPrice::per_million(0.15, 0.60))
            .with_price("gpt-4o-2024-08-06", ModelPrice::per_million(2.50, 10.00))
            .with_price("gemini-1.5-flash", ModelPrice::per_million(0.075, 0.30))
            .with_price("Llama3.1 8B", ModelPrice::new(0.0, 0.0))
            .with_price("Groq Llama3.1 70b", ModelPrice::per_million(0.59, 0.79))
    }
}

impl PricingTable {
    /// A table with no entries.
    pub fn empty() -> Self {
        Self {
            prices: BTreeMap::new(),
        }
    }

    /// Add or replace a model's price.
    pub fn with_price(mut self, model: impl Into<String>, price: ModelPrice) -> Self {
        self.prices.insert(model.into(), price);
        self
    }

    /// Parse `{"model": {"input": f, "output": f}}`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let table: PricingTable = serde_json::from_str(json).map_err(|e| ConfigError::Load {
            path: "<pricing json>".to_string(),
            reason: e.to_string(),
        })?;
        table.validate()?;
        Ok(table)
    }

    /// Load a pricing file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&contents).map_err(|e| match e {
            ConfigError::Load { reason, .. } => ConfigError::Load {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Overlay `other` on top of this table; entries in `other` win.
    pub fn merge(mut self, other: PricingTable) -> Self {
        self.prices.extend(other.prices);
        self
    }

    /// Look up a model's price.
    pub fn get(&self, model: &str) -> Option<&ModelPrice> {
        self.prices.get(model)
    }

    /// Models with a price, sorted.
    pub fn models(&self) -> impl Iterator<Item = (&str, &ModelPrice)> {
        self.prices.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.prices
            .iter()
            .try_for_each(|(model, price)| price.validate(model))
    }
}

/// Turns token usage into money.
#[derive(Debug, Clone, Default)]
pub struct CostAccountant {
    table: PricingTable,
}

impl CostAccountant {
    pub fn new(table: PricingTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PricingTable {
        &self.table
    }

    /// Fail unless `model` has a price. Run before any call that would need one.
    pub fn ensure_priced(&self, model: &str) -> Result<&ModelPrice, ConfigError> {
        self.table
            .get(model)
            .ok_or_else(|| ConfigError::MissingPricing {
                model: model.to_string(),
            })
    }

    /// `input_tokens × input price + output_tokens × output price`.
    pub fn price(&self, usage: TokenUsage, model: &str) -> Result<f64, ConfigError> {
        let price = self.ensure_priced(model)?;
        Ok(usage.input_tokens as f64 * price.input + usage.output_tokens as f64 * price.output)
    }
}
