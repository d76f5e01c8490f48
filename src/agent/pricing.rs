//! Token pricing for catalog descriptors.
//!
//! Rates are kept per 1K tokens (the unit providers publish) and exposed per
//! token, which is what [`ModelDescriptor`](super::types::ModelDescriptor)
//! carries. Lookup is by longest matching prefix so dated snapshots such as
//! `gpt-4o-2024-08-06` inherit their family's price. Unknown models cost 0.
//!
//! Pricing must be manually updated when providers change their rates.

use std::collections::HashMap;
use std::sync::Arc;

/// Pricing for one model family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// Input (prompt) cost in USD per 1K tokens.
    pub input_price_per_1k: f64,

    /// Output (completion) cost in USD per 1K tokens.
    pub output_price_per_1k: f64,
}

impl ModelPricing {
    pub const FREE: ModelPricing = ModelPricing {
        input_price_per_1k: 0.0,
        output_price_per_1k: 0.0,
    };

    pub fn input_per_token(&self) -> f64 {
        self.input_price_per_1k / 1000.0
    }

    pub fn output_per_token(&self) -> f64 {
        self.output_price_per_1k / 1000.0
    }
}

/// Shared, cheaply cloneable price list.
#[derive(Debug, Clone)]
pub struct PricingTable {
    prices: Arc<HashMap<String, ModelPricing>>,
}

const DEFAULT_PRICES: &[(&str, f64, f64)] = &[
    // OpenAI
    ("gpt-4o-mini", 0.00015, 0.0006),
    ("gpt-4o", 0.0025, 0.01),
    ("gpt-4-turbo", 0.01, 0.03),
    ("gpt-4", 0.03, 0.06),
    ("gpt-3.5-turbo", 0.0005, 0.0015),
    // Anthropic
    ("claude-3-opus", 0.015, 0.075),
    ("claude-3-5-sonnet", 0.003, 0.015),
    ("claude-3-sonnet", 0.003, 0.015),
    ("claude-3-5-haiku", 0.0008, 0.004),
    ("claude-3-haiku", 0.00025, 0.00125),
];

impl PricingTable {
    /// Table preloaded with current public rates.
    pub fn new() -> Self {
        let prices = DEFAULT_PRICES
            .iter()
            .map(|(name, input, output)| {
                (
                    name.to_string(),
                    ModelPricing {
                        input_price_per_1k: *input,
                        output_price_per_1k: *output,
                    },
                )
            })
            .collect();
        Self {
            prices: Arc::new(prices),
        }
    }

    /// Table with no entries; every model is free. Used for local backends.
    pub fn empty() -> Self {
        Self {
            prices: Arc::new(HashMap::new()),
        }
    }

    /// Copy of this table with an extra (or replaced) entry.
    pub fn with_price(&self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        let mut prices = (*self.prices).clone();
        prices.insert(model.into(), pricing);
        Self {
            prices: Arc::new(prices),
        }
    }

    /// Longest-prefix lookup.
    pub fn get_pricing(&self, model: &str) -> Option<ModelPricing> {
        let model = model.to_lowercase();
        self.prices
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, pricing)| *pricing)
    }

    pub fn has_pricing(&self, model: &str) -> bool {
        self.get_pricing(model).is_some()
    }

    /// `(input, output)` USD per token; `(0, 0)` for unknown models.
    pub fn per_token(&self, model: &str) -> (f64, f64) {
        let pricing = self.get_pricing(model).unwrap_or(ModelPricing::FREE);
        (pricing.input_per_token(), pricing.output_per_token())
    }

    /// Estimated USD cost of a call, or `None` if the model is unpriced.
    pub fn estimate_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> Option<f64> {
        self.get_pricing(model).map(|pricing| {
            (input_tokens as f64 / 1000.0) * pricing.input_price_per_1k
                + (output_tokens as f64 / 1000.0) * pricing.output_price_per_1k
        })
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new()
    }
}
