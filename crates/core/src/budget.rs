//! Token budget parameters.

use crate::error::{Error, Result};
use crate::model::Model;

pub const DEFAULT_MIN_RESPONSE_TOKENS: usize = 200;
pub const DEFAULT_MAX_RESPONSE_TOKENS: u32 = 400;
pub const DEFAULT_MAX_HISTORY_MESSAGES: usize = 10;
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

/// Immutable budgeting parameters for one session.
///
/// The context window is derived from the model, so an unsupported model
/// identifier is rejected here rather than at the first request.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetConfig {
    model: Model,
    max_model_context_tokens: usize,
    min_response_tokens: usize,
    max_response_tokens: u32,
    max_history_messages: usize,
    temperature: f32,
}

impl BudgetConfig {
    /// Budget for `model` with default limits.
    pub fn new(model: &str) -> Result<Self> {
        Ok(Self::for_model(model.parse()?))
    }

    /// Budget for an already-parsed model with default limits.
    pub fn for_model(model: Model) -> Self {
        Self {
            model,
            max_model_context_tokens: model.context_window(),
            min_response_tokens: DEFAULT_MIN_RESPONSE_TOKENS,
            max_response_tokens: DEFAULT_MAX_RESPONSE_TOKENS,
            max_history_messages: DEFAULT_MAX_HISTORY_MESSAGES,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Tokens held back from the input for the response.
    pub fn with_min_response_tokens(mut self, tokens: usize) -> Self {
        self.min_response_tokens = tokens;
        self
    }

    /// Cap on generated tokens, passed to the provider.
    pub fn with_max_response_tokens(mut self, tokens: u32) -> Self {
        self.max_response_tokens = tokens;
        self
    }

    /// How many of the most recent user/assistant turns are considered.
    pub fn with_max_history_messages(mut self, count: usize) -> Self {
        self.max_history_messages = count;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Check the limits are coherent.
    pub fn validate(&self) -> Result<()> {
        if self.min_response_tokens >= self.max_model_context_tokens {
            return Err(Error::config(format!(
                "min_response_tokens ({}) must be below the {} context window ({})",
                self.min_response_tokens, self.model, self.max_model_context_tokens
            )));
        }
        if self.max_response_tokens == 0 {
            return Err(Error::config("max_response_tokens must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::config("temperature must be between 0.0 and 2.0"));
        }
        Ok(())
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn max_model_context_tokens(&self) -> usize {
        self.max_model_context_tokens
    }

    pub fn min_response_tokens(&self) -> usize {
        self.min_response_tokens
    }

    pub fn max_response_tokens(&self) -> u32 {
        self.max_response_tokens
    }

    pub fn max_history_messages(&self) -> usize {
        self.max_history_messages
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Largest input the assembler may produce.
    pub fn max_input_tokens(&self) -> usize {
        self.max_model_context_tokens.saturating_sub(self.min_response_tokens)
    }
}
