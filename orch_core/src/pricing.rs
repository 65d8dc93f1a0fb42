//! Per-model price tables used by backends to compute their own cost.

use crate::types::{RequestKind, TokenUsage};
use serde::{Deserialize, Serialize};

/// USD per 1,000 tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64
}

impl ModelPrice {
    pub const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k
        }
    }

    pub const fn free() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Price table of one backend.
///
/// Lookups try an exact model match, then the longest listed prefix of the
/// model name (so dated snapshots such as `gpt-4o-2024-08-06` price as
/// `gpt-4o`), then the default tier. Unknown models never fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    models: Vec<(String, ModelPrice)>,
    default_tier: ModelPrice,
    image_per_call: f64,
    audio_per_call: f64,
    embedding_per_million: f64
}

impl PriceTable {
    pub fn new(default_tier: ModelPrice) -> Self {
        Self {
            models: Vec::new(),
            default_tier,
            image_per_call: 0.0,
            audio_per_call: 0.0,
            embedding_per_million: 0.0
        }
    }

    /// Table for locally hosted backends.
    pub fn free() -> Self {
        Self::new(ModelPrice::free())
    }

    pub fn with_model(mut self, model: impl Into<String>, price: ModelPrice) -> Self {
        self.models.push((model.into(), price));
        self
    }

    pub fn with_image_per_call(mut self, usd: f64) -> Self {
        self.image_per_call = usd;
        self
    }

    pub fn with_audio_per_call(mut self, usd: f64) -> Self {
        self.audio_per_call = usd;
        self
    }

    pub fn with_embedding_per_million(mut self, usd: f64) -> Self {
        self.embedding_per_million = usd;
        self
    }

    pub fn price_for(&self, model: &str) -> ModelPrice {
        if let Some((_, price)) = self.models.iter().find(|(name, _)| name == model) {
            return *price;
        }
        self.models
            .iter()
            .filter(|(name, _)| model.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, price)| *price)
            .unwrap_or(self.default_tier)
    }

    /// Token-rated cost for text operations.
    pub fn token_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let price = self.price_for(model);
        (input_tokens as f64 / 1000.0) * price.input_per_1k
            + (output_tokens as f64 / 1000.0) * price.output_per_1k
    }

    /// Cost of one successful call of the given kind.
    pub fn cost(&self, model: &str, kind: RequestKind, usage: &TokenUsage) -> f64 {
        match kind {
            RequestKind::TextCompletion | RequestKind::Chat => {
                self.token_cost(model, usage.input_tokens, usage.output_tokens)
            }
            RequestKind::Image => self.image_per_call,
            RequestKind::Transcription | RequestKind::Speech => self.audio_per_call,
            RequestKind::Embedding => {
                usage.total_tokens as f64 / 1_000_000.0 * self.embedding_per_million
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PriceTable {
        PriceTable::new(ModelPrice::new(0.0005, 0.0015))
            .with_model("gpt-4o", ModelPrice::new(0.0025, 0.010))
            .with_model("gpt-4", ModelPrice::new(0.03, 0.06))
            .with_image_per_call(0.04)
            .with_embedding_per_million(0.02)
    }

    #[test]
    fn test_exact_and_prefix_lookup() {
        let table = table();
        assert_eq!(table.price_for("gpt-4").input_per_1k, 0.03);
        assert_eq!(table.price_for("gpt-4o-2024-08-06").input_per_1k, 0.0025);
        assert_eq!(table.price_for("mystery-model").input_per_1k, 0.0005);
    }

    #[test]
    fn test_cost_by_kind() {
        let table = table();
        let usage = TokenUsage::new(1000, 2000);
        let chat = table.cost("gpt-4o", RequestKind::Chat, &usage);
        assert!((chat - 0.0225).abs() < 1e-9);

        let image = table.cost("dall-e-3", RequestKind::Image, &TokenUsage::default());
        assert!((image - 0.04).abs() < 1e-9);

        let embed = table.cost(
            "text-embedding-3-small",
            RequestKind::Embedding,
            &TokenUsage::new(500_000, 0)
        );
        assert!((embed - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_free_table_costs_nothing() {
        let usage = TokenUsage::new(10_000, 10_000);
        assert_eq!(PriceTable::free().cost("llama3", RequestKind::Chat, &usage), 0.0);
    }
}
