//! # chatstack core
//!
//! Domain types, traits, and error definitions for chatstack, a client
//! library that keeps a rolling chat conversation inside a model's token
//! budget. This crate makes no HTTP calls and only uses tokio for the
//! channel type that carries streamed chunks; it defines the model the
//! other crates implement against.
//!
//! ## Layout
//!
//! - [`message`]: token-costed chat turns
//! - [`tokenizer`]: the token counting seam (cl100k_base and a heuristic)
//! - [`model`] / [`budget`]: supported models and the budget parameters
//! - [`provider`]: the completion backend trait and its wire types
//! - [`error`]: the error taxonomy shared by every crate

pub mod budget;
pub mod error;
pub mod message;
pub mod model;
pub mod provider;
pub mod tokenizer;

// Re-export key types at crate root for ergonomics
pub use budget::BudgetConfig;
pub use error::{Error, ProviderError, Result};
pub use message::{ChatTurn, MESSAGE_OVERHEAD_TOKENS, REQUEST_OVERHEAD_TOKENS, Role, TurnKind};
pub use model::Model;
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use tokenizer::{Cl100kTokenizer, HeuristicTokenizer, Tokenizer};
