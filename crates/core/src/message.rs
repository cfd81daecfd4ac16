//! Chat turn domain types.
//!
//! A [`ChatTurn`] is one role-tagged message whose token cost is computed
//! when it is built and never changes afterwards. Every budgeting decision
//! downstream sums these precomputed costs.

use crate::tokenizer::Tokenizer;
use serde::Serialize;

/// Bookkeeping tokens the provider adds around every message.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Tokens the provider adds once per completion request.
pub const REQUEST_OVERHEAD_TOKENS: usize = 2;

/// The role a turn is submitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions and retrieved material
    System,
    /// The end user
    User,
    /// The model
    Assistant,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a turn is, independent of the role it is sent under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnKind {
    System,
    User,
    Assistant,
    /// Retrieved material, labelled with `prefix` and optionally the
    /// `source` it came from.
    Context {
        prefix: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
}

/// A single token-costed message.
///
/// Fields are private: a turn is immutable once built, and can only be
/// built through a constructor that runs the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    kind: TurnKind,
    text: String,
    token_count: usize,
}

impl ChatTurn {
    /// Create a system turn.
    pub fn system(text: impl Into<String>, tokenizer: &dyn Tokenizer) -> Self {
        Self::build(TurnKind::System, text.into(), tokenizer)
    }

    /// Create a user turn.
    pub fn user(text: impl Into<String>, tokenizer: &dyn Tokenizer) -> Self {
        Self::build(TurnKind::User, text.into(), tokenizer)
    }

    /// Create an assistant turn.
    pub fn assistant(text: impl Into<String>, tokenizer: &dyn Tokenizer) -> Self {
        Self::build(TurnKind::Assistant, text.into(), tokenizer)
    }

    /// Create a retrieved-context turn, sent as `"{prefix}: {text}"`.
    pub fn context(
        prefix: impl Into<String>,
        text: impl Into<String>,
        tokenizer: &dyn Tokenizer,
    ) -> Self {
        let kind = TurnKind::Context {
            prefix: prefix.into(),
            source: None,
        };
        Self::build(kind, text.into(), tokenizer)
    }

    /// Attach the URL a context snippet was retrieved from.
    ///
    /// The source is metadata only; it is neither sent nor counted.
    pub fn with_source(mut self, url: impl Into<String>) -> Self {
        if let TurnKind::Context { source, .. } = &mut self.kind {
            *source = Some(url.into());
        }
        self
    }

    fn build(kind: TurnKind, text: String, tokenizer: &dyn Tokenizer) -> Self {
        let role = Self::role_of(&kind);
        let payload = match &kind {
            TurnKind::Context { prefix, .. } => format!("{role}\n{prefix}: {text}"),
            _ => format!("{role}\n{text}"),
        };
        let token_count = tokenizer.count_tokens(&payload) + MESSAGE_OVERHEAD_TOKENS;
        tracing::trace!(role = %role, tokens = token_count, "computed turn tokens");
        Self {
            kind,
            text,
            token_count,
        }
    }

    fn role_of(kind: &TurnKind) -> Role {
        match kind {
            TurnKind::System | TurnKind::Context { .. } => Role::System,
            TurnKind::User => Role::User,
            TurnKind::Assistant => Role::Assistant,
        }
    }

    /// The role this turn is submitted under.
    pub fn role(&self) -> Role {
        Self::role_of(&self.kind)
    }

    pub fn kind(&self) -> &TurnKind {
        &self.kind
    }

    /// The raw text, without any context prefix.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The literal content sent to the model.
    pub fn content(&self) -> String {
        match &self.kind {
            TurnKind::Context { prefix, .. } => format!("{prefix}: {}", self.text),
            _ => self.text.clone(),
        }
    }

    /// Precomputed cost of this turn, overhead included.
    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// The context label, for context turns.
    pub fn prefix(&self) -> Option<&str> {
        match &self.kind {
            TurnKind::Context { prefix, .. } => Some(prefix),
            _ => None,
        }
    }

    /// The retrieval source, for context turns that have one.
    pub fn source(&self) -> Option<&str> {
        match &self.kind {
            TurnKind::Context { source, .. } => source.as_deref(),
            _ => None,
        }
    }

    pub fn is_context(&self) -> bool {
        matches!(self.kind, TurnKind::Context { .. })
    }

    /// User and assistant turns are the only ones stored in history.
    pub fn is_conversation(&self) -> bool {
        matches!(self.kind, TurnKind::User | TurnKind::Assistant)
    }
}
