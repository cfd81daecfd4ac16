//! Shared helpers for session tests.

#![allow(dead_code)]

use chatstack_core::{
    BudgetConfig, ChunkReceiver, Model, Provider, ProviderError, ProviderRequest,
    ProviderResponse, StreamChunk, Usage,
};
use chatstack_core::HeuristicTokenizer;
use chatstack_session::ChatSession;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One scripted provider reaction.
pub enum Step {
    /// Reply to `complete`.
    Complete(Result<ProviderResponse, ProviderError>),
    /// Reply to `stream`: an opening error, or the chunks to deliver.
    Stream(Result<Vec<Result<StreamChunk, ProviderError>>, ProviderError>),
}

/// A mock provider that plays back a sequence of scripted steps.
///
/// Each call to `complete` or `stream` consumes the next step. Panics if
/// more calls are made than steps provided, or the step kind does not
/// match the call.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_step(&self, request: ProviderRequest) -> Step {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no step for call #{call}"))
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next_step(request) {
            Step::Complete(result) => result,
            Step::Stream(_) => panic!("ScriptedProvider: expected a stream call"),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        match self.next_step(request) {
            Step::Stream(Ok(chunks)) => {
                let (tx, rx) = tokio::sync::mpsc::channel(chunks.len().max(1));
                for chunk in chunks {
                    tx.send(chunk).await.unwrap();
                }
                Ok(rx)
            }
            Step::Stream(Err(e)) => Err(e),
            Step::Complete(_) => panic!("ScriptedProvider: expected a complete call"),
        }
    }
}

/// Create a simple text response.
pub fn text_response(text: &str) -> Step {
    Step::Complete(Ok(ProviderResponse {
        content: text.into(),
        usage: Some(usage()),
        model: "gpt-3.5-turbo-0613".into(),
    }))
}

pub fn usage() -> Usage {
    Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    }
}

/// A stream of `deltas` closed by a done chunk carrying usage.
pub fn streamed(deltas: &[&str]) -> Step {
    let mut chunks: Vec<Result<StreamChunk, ProviderError>> =
        deltas.iter().map(|d| Ok(StreamChunk::delta(*d))).collect();
    chunks.push(Ok(StreamChunk::finished(Some(usage()))));
    Step::Stream(Ok(chunks))
}

pub fn failure(error: ProviderError) -> Step {
    Step::Complete(Err(error))
}

pub fn rate_limited() -> ProviderError {
    ProviderError::RateLimited {
        retry_after_secs: 1,
    }
}

pub const SYSTEM: &str = "You are a clever bot.";

/// A gpt-3.5 session using the byte-estimate tokenizer.
pub fn session(provider: Arc<ScriptedProvider>) -> ChatSession {
    ChatSession::new(
        SYSTEM,
        BudgetConfig::for_model(Model::Gpt35Turbo),
        provider,
        Arc::new(HeuristicTokenizer),
    )
    .unwrap()
}
