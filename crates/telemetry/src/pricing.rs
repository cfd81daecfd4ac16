//! Price estimates for completion calls.
//!
//! Prices are USD per 1K tokens, from the provider's published table.
//! The calculator is pure arithmetic on token counts.

use chatstack_core::{Model, Result};
use serde::Serialize;

/// Per-thousand-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelPricing {
    /// Price per 1K input tokens in USD.
    pub input_per_k: f64,
    /// Price per 1K output tokens in USD.
    pub output_per_k: f64,
}

impl ModelPricing {
    /// Published prices for `model`.
    pub fn for_model(model: Model) -> Self {
        match model {
            Model::Gpt35Turbo => Self {
                input_per_k: 0.002,
                output_per_k: 0.002,
            },
            Model::Gpt4 => Self {
                input_per_k: 0.03,
                output_per_k: 0.06,
            },
            Model::Gpt4TurboPreview => Self {
                input_per_k: 0.01,
                output_per_k: 0.03,
            },
        }
    }
}

/// Estimated cost in USD of a call to `model`.
///
/// Fails with `UnsupportedModel` for identifiers without a price.
pub fn price(model: &str, input_tokens: usize, output_tokens: usize) -> Result<f64> {
    let model: Model = model.parse()?;
    Ok(price_for(model, input_tokens, output_tokens))
}

/// Estimated cost in USD of a call to an already-parsed model.
pub fn price_for(model: Model, input_tokens: usize, output_tokens: usize) -> f64 {
    let input = input_tokens as f64;
    let output = output_tokens as f64;
    match model {
        // Flat rate: input and output billed alike.
        Model::Gpt35Turbo => 0.002 * (input + output) / 1000.0,
        Model::Gpt4 | Model::Gpt4TurboPreview => {
            let p = ModelPricing::for_model(model);
            (p.input_per_k * input + p.output_per_k * output) / 1000.0
        }
    }
}
