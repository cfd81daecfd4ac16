//! The record handed back to callers for each exchange step.

use chatstack_core::{ChatTurn, Usage};
use std::sync::Arc;

/// One response record.
///
/// Batch mode produces a single final record. Streaming produces one
/// partial record per content increment followed by one final record.
/// `response_tokens` and `price` are only meaningful when `is_final`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// Complete text (final) or text accumulated so far (partial)
    pub text: String,

    /// The fragment this record adds; empty on the final record
    pub delta: String,

    pub model: String,

    pub temperature: f32,

    /// The exact turns sent, in submission order
    pub inputs: Vec<Arc<ChatTurn>>,

    /// Summed input turn cost plus the per-request overhead
    pub input_tokens: usize,

    /// Token count of the assistant turn
    pub response_tokens: usize,

    /// Estimated cost in USD
    pub price: f64,

    /// Usage as reported by the provider, when it reports any
    pub usage: Option<Usage>,

    pub is_final: bool,
}

impl ChatResponse {
    pub(crate) fn partial(
        model: &str,
        temperature: f32,
        inputs: &[Arc<ChatTurn>],
        input_tokens: usize,
        text: String,
        delta: String,
    ) -> Self {
        Self {
            text,
            delta,
            model: model.to_string(),
            temperature,
            inputs: inputs.to_vec(),
            input_tokens,
            response_tokens: 0,
            price: 0.0,
            usage: None,
            is_final: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn finished(
        model: &str,
        temperature: f32,
        inputs: Vec<Arc<ChatTurn>>,
        input_tokens: usize,
        text: String,
        response_tokens: usize,
        price: f64,
        usage: Option<Usage>,
    ) -> Self {
        Self {
            text,
            delta: String::new(),
            model: model.to_string(),
            temperature,
            inputs,
            input_tokens,
            response_tokens,
            price,
            usage,
            is_final: true,
        }
    }

    /// Input plus response tokens.
    pub fn total_tokens(&self) -> usize {
        self.input_tokens + self.response_tokens
    }
}
