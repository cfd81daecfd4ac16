//! Token counting.
//!
//! Token accounting is only meaningful when it matches the provider's own
//! encoding, so the default tokenizer wraps the `cl100k_base` BPE used by
//! GPT-3.5 and GPT-4. A character heuristic is kept for offline use.

use crate::error::{Error, Result};
use tiktoken_rs::CoreBPE;

/// Maps text to a token count under a fixed encoding.
///
/// Implementations must be deterministic: the same text always yields the
/// same count.
pub trait Tokenizer: Send + Sync {
    /// Number of tokens `text` encodes to.
    fn count_tokens(&self, text: &str) -> usize;

    /// A short name for logs.
    fn name(&self) -> &str;
}

/// The `cl100k_base` byte-pair encoding.
pub struct Cl100kTokenizer {
    bpe: CoreBPE,
}

impl Cl100kTokenizer {
    /// Load the encoder tables.
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(Self { bpe })
    }

    /// Encode `text` into token ids.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe
            .encode_with_special_tokens(text)
            .into_iter()
            .map(|id| id as u32)
            .collect()
    }
}

impl Tokenizer for Cl100kTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn name(&self) -> &str {
        "cl100k_base"
    }
}

impl std::fmt::Debug for Cl100kTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cl100kTokenizer").finish_non_exhaustive()
    }
}

/// Character-based estimate: ~4 bytes per token, rounded up.
///
/// Accurate within ~10% for BPE tokenizers on English text.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl Tokenizer for HeuristicTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}
