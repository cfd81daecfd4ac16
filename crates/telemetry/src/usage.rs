//! Running token and cost totals for a session.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Cumulative usage across the completed exchanges of one session.
///
/// Only finished exchanges are recorded; a failed or abandoned stream
/// contributes nothing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CostSummary {
    /// Completed exchanges.
    pub exchanges: u64,
    /// Total input tokens, request overhead included.
    pub input_tokens: u64,
    /// Total response tokens.
    pub response_tokens: u64,
    /// Total estimated cost in USD.
    pub total_cost: f64,
    /// When the last exchange was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_exchange_at: Option<DateTime<Utc>>,
}

impl CostSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished exchange.
    pub fn record(&mut self, input_tokens: usize, response_tokens: usize, cost: f64) {
        self.exchanges += 1;
        self.input_tokens += input_tokens as u64;
        self.response_tokens += response_tokens as u64;
        self.total_cost += cost;
        self.last_exchange_at = Some(Utc::now());
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.response_tokens
    }
}
