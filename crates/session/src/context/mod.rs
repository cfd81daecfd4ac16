//! Request context: stored history and the per-request assembler.

pub mod assembler;
pub mod history;

pub use assembler::{
    AssembledContext, AssemblyMetadata, ContextAssembler, DropInfo, LayerStats,
    DYNAMIC_CONTEXT_LAYER, HISTORY_LAYER, SYSTEM_LAYER,
};
pub use history::ConversationHistory;
