//! Cost estimation for chatstack.
//!
//! Provides the per-model pricing calculator and the running totals a
//! session keeps across completed exchanges.

pub mod pricing;
pub mod usage;

pub use pricing::{ModelPricing, price, price_for};
pub use usage::CostSummary;
