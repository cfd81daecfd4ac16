//! Context assembly: the bounded message list sent on each request.
//!
//! Three layers, in submission order:
//!
//! | Layer | Source | Trim Strategy |
//! |-------|--------|---------------|
//! | 1. System | Session system turn | Never trimmed |
//! | 2. Dynamic Context | Caller-supplied retrieved material | Stops at the first turn that does not fit |
//! | 3. Conversation History | Most recent user/assistant turns | Count window, never token-trimmed |
//!
//! The system turn and the history window are budgeted first; dynamic
//! context gets whatever input budget remains.
//!
//! # Determinism
//!
//! Identical inputs always produce identical outputs. The assembler holds
//! only its `BudgetConfig` and never mutates anything.

use chatstack_core::{BudgetConfig, ChatTurn, REQUEST_OVERHEAD_TOKENS};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

// ── Types ─────────────────────────────────────────────────────────────────

/// The assembled request, ready for a provider call.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// `[system] + admitted dynamic context + chronological history`.
    pub messages: Vec<Arc<ChatTurn>>,
    /// Assembly metadata (token counts, drops, utilization).
    pub metadata: AssemblyMetadata,
}

impl AssembledContext {
    /// Input tokens the provider will bill, request overhead included.
    pub fn input_tokens(&self) -> usize {
        self.metadata.input_tokens()
    }
}

/// Detailed metadata about the assembly process.
#[derive(Debug, Clone, Serialize)]
pub struct AssemblyMetadata {
    /// Summed token count of the assembled messages.
    pub total_tokens: usize,
    /// Model context window minus the response reserve.
    pub max_input_tokens: usize,
    /// `total_tokens` as a percentage of `max_input_tokens`.
    pub utilization_pct: f32,
    /// Per-layer statistics.
    pub per_layer: Vec<LayerStats>,
    /// Items left out of each layer.
    pub drops: Vec<DropInfo>,
}

impl AssemblyMetadata {
    pub fn input_tokens(&self) -> usize {
        self.total_tokens + REQUEST_OVERHEAD_TOKENS
    }

    /// True when the system turn and history window alone overflow the
    /// input budget.
    pub fn over_budget(&self) -> bool {
        self.total_tokens > self.max_input_tokens
    }

    pub fn layer(&self, name: &str) -> Option<&LayerStats> {
        self.per_layer.iter().find(|l| l.name == name)
    }
}

/// Statistics for a single context layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerStats {
    /// Layer name.
    pub name: String,
    /// Tokens consumed by this layer.
    pub tokens: usize,
    /// Items included after budget enforcement.
    pub items_included: usize,
    /// Items offered to the layer.
    pub items_total: usize,
}

/// Items a layer left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropInfo {
    /// Which layer.
    pub layer: String,
    /// Number of items dropped.
    pub items_dropped: usize,
    /// Tokens of dropped content.
    pub tokens_dropped: usize,
    /// Reason for dropping.
    pub reason: String,
}

pub const SYSTEM_LAYER: &str = "system";
pub const DYNAMIC_CONTEXT_LAYER: &str = "dynamic_context";
pub const HISTORY_LAYER: &str = "conversation_history";

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Stateless apart from its budget.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    budget: BudgetConfig,
}

impl ContextAssembler {
    pub fn new(budget: BudgetConfig) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> &BudgetConfig {
        &self.budget
    }

    /// Build the message list for one request.
    ///
    /// `history` is walked newest-first; only the first
    /// `max_history_messages` turns are used. `dynamic_context` is walked
    /// in caller order (most relevant first).
    ///
    /// # Algorithm
    ///
    /// 1. `max_input = window - min_response_tokens`
    /// 2. Take the history window and sum its cost
    /// 3. Dynamic budget = `max_input - history - system`, nothing if negative
    /// 4. Admit dynamic context until the first turn that overflows
    /// 5. Emit system, admitted context, then history oldest-first
    pub fn assemble<'a, I>(
        &self,
        system: &Arc<ChatTurn>,
        history: I,
        dynamic_context: Option<&[Arc<ChatTurn>]>,
    ) -> AssembledContext
    where
        I: IntoIterator<Item = &'a Arc<ChatTurn>>,
    {
        let max_input = self.budget.max_input_tokens();
        let mut drops: Vec<DropInfo> = Vec::new();

        // ── Layer 3 first: it is budgeted before dynamic context ──
        let (history_window, hist_stats, hist_drop) =
            Self::select_history_layer(history, self.budget.max_history_messages());
        if let Some(d) = hist_drop {
            drops.push(d);
        }

        // ── Layer 1: System ──
        let system_tokens = system.token_count();
        let system_stats = LayerStats {
            name: SYSTEM_LAYER.into(),
            tokens: system_tokens,
            items_included: 1,
            items_total: 1,
        };

        let reserved = hist_stats.tokens + system_tokens;
        if reserved > max_input {
            warn!(
                history_tokens = hist_stats.tokens,
                system_tokens,
                max_input_tokens = max_input,
                "History window exceeds the input budget; sending it untrimmed"
            );
        }

        // ── Layer 2: Dynamic Context ──
        let dynamic_budget = max_input.checked_sub(reserved);
        let (admitted, dyn_stats, dyn_drop) =
            Self::select_dynamic_layer(dynamic_context.unwrap_or_default(), dynamic_budget);
        if let Some(d) = dyn_drop {
            drops.push(d);
        }

        let mut messages = Vec::with_capacity(1 + admitted.len() + history_window.len());
        messages.push(Arc::clone(system));
        messages.extend(admitted);
        messages.extend(history_window);

        let total_tokens = system_stats.tokens + dyn_stats.tokens + hist_stats.tokens;
        let utilization_pct = if max_input > 0 {
            (total_tokens as f32 / max_input as f32) * 100.0
        } else {
            0.0
        };

        debug!(
            total_tokens,
            max_input_tokens = max_input,
            context_included = dyn_stats.items_included,
            context_offered = dyn_stats.items_total,
            history_included = hist_stats.items_included,
            "Assembled request context"
        );

        AssembledContext {
            messages,
            metadata: AssemblyMetadata {
                total_tokens,
                max_input_tokens: max_input,
                utilization_pct,
                per_layer: vec![system_stats, dyn_stats, hist_stats],
                drops,
            },
        }
    }

    // ── Private layer selectors ───────────────────────────────────────────

    /// Returns the window in chronological order.
    fn select_history_layer<'a, I>(
        history: I,
        limit: usize,
    ) -> (Vec<Arc<ChatTurn>>, LayerStats, Option<DropInfo>)
    where
        I: IntoIterator<Item = &'a Arc<ChatTurn>>,
    {
        let mut window = Vec::new();
        let mut used = 0;
        let mut dropped = 0;
        let mut dropped_tokens = 0;

        for turn in history {
            if window.len() < limit {
                used += turn.token_count();
                window.push(Arc::clone(turn));
            } else {
                dropped += 1;
                dropped_tokens += turn.token_count();
            }
        }

        window.reverse();

        let included = window.len();
        (
            window,
            LayerStats {
                name: HISTORY_LAYER.into(),
                tokens: used,
                items_included: included,
                items_total: included + dropped,
            },
            Self::maybe_drop(
                HISTORY_LAYER,
                dropped,
                dropped_tokens,
                "Older turns outside the history window",
            ),
        )
    }

    /// `budget` is `None` when system + history already overflow.
    fn select_dynamic_layer(
        context: &[Arc<ChatTurn>],
        budget: Option<usize>,
    ) -> (Vec<Arc<ChatTurn>>, LayerStats, Option<DropInfo>) {
        let mut remaining = budget.unwrap_or(0);
        let mut admitted = Vec::new();
        let mut used = 0;

        for turn in context {
            let cost = turn.token_count();
            if cost > remaining {
                break;
            }
            remaining -= cost;
            used += cost;
            admitted.push(Arc::clone(turn));
        }

        let rest = &context[admitted.len()..];
        let reason = if budget.is_none() {
            "No budget left after system turn and history"
        } else {
            "Input budget exhausted"
        };

        let stats = LayerStats {
            name: DYNAMIC_CONTEXT_LAYER.into(),
            tokens: used,
            items_included: admitted.len(),
            items_total: context.len(),
        };

        (
            admitted,
            stats,
            Self::maybe_drop(
                DYNAMIC_CONTEXT_LAYER,
                rest.len(),
                rest.iter().map(|t| t.token_count()).sum(),
                reason,
            ),
        )
    }

    fn maybe_drop(layer: &str, count: usize, tokens: usize, reason: &str) -> Option<DropInfo> {
        if count > 0 {
            Some(DropInfo {
                layer: layer.into(),
                items_dropped: count,
                tokens_dropped: tokens,
                reason: reason.into(),
            })
        } else {
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
