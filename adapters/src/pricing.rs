//! Price tables of the built-in backends, USD per 1,000 tokens.

use orch_core::{ModelPrice, PriceTable};

pub fn openai_prices() -> PriceTable {
    PriceTable::new(ModelPrice::new(0.0005, 0.0015))
        .with_model("gpt-4o", ModelPrice::new(0.0025, 0.010))
        .with_model("gpt-4-turbo", ModelPrice::new(0.01, 0.03))
        .with_model("gpt-4", ModelPrice::new(0.03, 0.06))
        .with_model("gpt-3.5-turbo", ModelPrice::new(0.0005, 0.0015))
        .with_image_per_call(0.04)
        .with_audio_per_call(0.006)
        .with_embedding_per_million(0.02)
}

pub fn anthropic_prices() -> PriceTable {
    PriceTable::new(ModelPrice::new(0.003, 0.015))
        .with_model("claude-3-opus", ModelPrice::new(0.015, 0.075))
        .with_model("claude-3-sonnet", ModelPrice::new(0.003, 0.015))
        .with_model("claude-3-haiku", ModelPrice::new(0.00025, 0.00125))
}

/// Locally hosted models cost nothing per call.
pub fn ollama_prices() -> PriceTable {
    PriceTable::free()
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::{RequestKind, TokenUsage};

    #[test]
    fn test_dated_model_names_use_family_price() {
        let cost = anthropic_prices().cost(
            "claude-3-opus-20240229",
            RequestKind::Chat,
            &TokenUsage::new(1000, 1000)
        );
        assert!((cost - 0.09).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_models_use_default_tier() {
        let usage = TokenUsage::new(2000, 0);
        let unknown = openai_prices().cost("o9-preview", RequestKind::TextCompletion, &usage);
        let budget = openai_prices().cost("gpt-3.5-turbo", RequestKind::TextCompletion, &usage);
        assert_eq!(unknown, budget);
    }
}
