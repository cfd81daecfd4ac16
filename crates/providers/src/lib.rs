//! Completion backends for chatstack.
//!
//! The OpenAI-compatible HTTP provider implements
//! `chatstack_core::Provider`; [`RetryPolicy`] re-issues requests that
//! failed with a transient error.

pub mod openai_compat;
pub mod retry;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryPolicy;
