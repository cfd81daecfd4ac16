//! Token-budgeted chat sessions.
//!
//! A [`ChatSession`] owns one system turn and the conversation history,
//! and runs each exchange the same way:
//!
//! 1. **Build** the pending user turn (its token cost is fixed at construction)
//! 2. **Assemble** system + dynamic context + the recent history window
//!    inside the model's input budget
//! 3. **Call** the provider, batch or streaming, retrying transient failures
//! 4. **Commit** the user turn and the reply to history once the reply is complete
//! 5. **Report** a [`ChatResponse`] with token counts and estimated price

pub mod context;
pub mod response;
pub mod session;
mod stream;

pub use context::{
    AssembledContext, AssemblyMetadata, ContextAssembler, ConversationHistory, DropInfo,
    LayerStats,
};
pub use response::ChatResponse;
pub use session::{ChatSession, SessionId};

pub use chatstack_providers::RetryPolicy;
