//! Built-in pricing table for supported generation models.
//!
//! Prices are in USD per 1 million tokens. Each model has an input and
//! output price. A model's settings may override them with
//! `input_price_per_m` / `output_price_per_m`.

use querysmith_core::NanoUsd;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub const FREE: ModelPricing = ModelPricing {
        input_per_m: 0.0,
        output_per_m: 0.0,
    };

    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given token counts.
    ///
    /// Rates are converted to nano-dollars first so the token math is integer.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> NanoUsd {
        let input_rate = NanoUsd::from_usd(self.input_per_m).0 as u128;
        let output_rate = NanoUsd::from_usd(self.output_per_m).0 as u128;
        let total = (input_tokens as u128 * input_rate + output_tokens as u128 * output_rate) / 1_000_000;
        NanoUsd(u64::try_from(total).unwrap_or(u64::MAX))
    }

    /// Pricing from settings overrides, falling back to the built-in table.
    pub fn resolve(model: &str, settings: &HashMap<String, String>) -> Self {
        let base = lookup(model).unwrap_or(Self::FREE);
        let read = |key: &str| settings.get(key).and_then(|v| v.trim().parse::<f64>().ok());
        Self {
            input_per_m: read("input_price_per_m").unwrap_or(base.input_per_m),
            output_per_m: read("output_price_per_m").unwrap_or(base.output_per_m),
        }
    }
}

const TABLE: &[(&str, f64, f64)] = &[
    // OpenAI / Azure OpenAI
    ("gpt-4o-mini", 0.15, 0.6),
    ("gpt-4o", 2.5, 10.0),
    ("gpt-4.1-nano", 0.1, 0.4),
    ("gpt-4.1-mini", 0.4, 1.6),
    ("gpt-4.1", 2.0, 8.0),
    ("gpt-4-turbo", 10.0, 30.0),
    ("gpt-35-turbo", 0.5, 1.5),
    ("gpt-3.5-turbo", 0.5, 1.5),
    ("o3-mini", 1.1, 4.4),
    ("o1-mini", 3.0, 12.0),
    ("o1", 15.0, 60.0),
    ("text-embedding-3-small", 0.02, 0.0),
    ("text-embedding-3-large", 0.13, 0.0),
    // Google
    ("gemini-2.0-flash", 0.1, 0.4),
    ("gemini-2.0-pro", 1.25, 10.0),
    ("gemini-1.5-pro", 1.25, 5.0),
    ("gemini-1.5-flash", 0.075, 0.3),
];

/// Look up built-in pricing for a model.
///
/// Tries an exact match, then strips a provider prefix (`openai/gpt-4o` →
/// `gpt-4o`), then takes the longest table entry the name starts with
/// (`gpt-4o-mini-2024-07-18` matches `gpt-4o-mini`).
pub fn lookup(model: &str) -> Option<ModelPricing> {
    let name = model.rsplit('/').next().unwrap_or(model);
    TABLE
        .iter()
        .find(|(m, _, _)| *m == name)
        .or_else(|| {
            TABLE
                .iter()
                .filter(|(m, _, _)| name.starts_with(m))
                .max_by_key(|(m, _, _)| m.len())
        })
        .map(|(_, input, output)| ModelPricing::new(*input, *output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_is_exact_in_nano_usd() {
        let p = ModelPricing::new(2.5, 10.0);
        // 1000 * 2.5/1M + 500 * 10/1M = 0.0025 + 0.005
        assert_eq!(p.cost(1000, 500), NanoUsd(7_500_000));
    }

    #[test]
    fn prefix_and_provider_matching() {
        assert_eq!(lookup("gpt-4o-mini-2024-07-18"), Some(ModelPricing::new(0.15, 0.6)));
        assert_eq!(lookup("openai/gpt-4o"), Some(ModelPricing::new(2.5, 10.0)));
        assert_eq!(lookup("gemini-1.5-flash-002"), Some(ModelPricing::new(0.075, 0.3)));
        assert!(lookup("llama3").is_none());
    }

    #[test]
    fn settings_override_builtin() {
        let settings = HashMap::from([("output_price_per_m".to_string(), "20".to_string())]);
        let p = ModelPricing::resolve("gpt-4o", &settings);
        assert_eq!(p, ModelPricing::new(2.5, 20.0));
        assert_eq!(ModelPricing::resolve("unknown", &HashMap::new()), ModelPricing::FREE);
    }
}
