//! Streaming exchange driver.
//!
//! One streamed exchange moves through
//! `Init -> Streaming -> (Finishing) -> Done`. The history and cost
//! totals are only touched on the transition into `Done` through a
//! completed exchange, so dropping the stream early or hitting an error
//! leaves the session exactly as it was.

use crate::response::ChatResponse;
use crate::session::ChatSession;
use chatstack_core::{
    ChatTurn, ChunkReceiver, Provider, ProviderError, ProviderRequest, Result, Usage,
};
use chatstack_providers::RetryPolicy;
use futures::Stream;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a streamed exchange currently is.
enum StreamPhase {
    /// Request built, provider not yet called
    Init(ProviderRequest),
    /// Receiving increments
    Streaming(ChunkReceiver),
    /// The done chunk carried content; it has been yielded and the final
    /// record comes next.
    Finishing(Option<Usage>),
    Done,
}

pub(crate) struct ExchangeStream<'s> {
    session: &'s mut ChatSession,
    provider: Arc<dyn Provider>,
    retry: RetryPolicy,
    user: Arc<ChatTurn>,
    inputs: Vec<Arc<ChatTurn>>,
    input_tokens: usize,
    text: String,
    phase: StreamPhase,
}

impl<'s> ExchangeStream<'s> {
    pub(crate) fn new(
        session: &'s mut ChatSession,
        user: Arc<ChatTurn>,
        inputs: Vec<Arc<ChatTurn>>,
        input_tokens: usize,
        request: ProviderRequest,
    ) -> Self {
        Self {
            provider: Arc::clone(session.provider()),
            retry: session.retry_policy(),
            session,
            user,
            inputs,
            input_tokens,
            text: String::new(),
            phase: StreamPhase::Init(request),
        }
    }

    /// Drive the exchange as a `Stream` of response records.
    pub(crate) fn into_stream(self) -> impl Stream<Item = Result<ChatResponse>> + Unpin + 's {
        Box::pin(futures::stream::unfold(self, |mut exchange| async move {
            let item = exchange.next_record().await?;
            Some((item, exchange))
        }))
    }

    async fn next_record(&mut self) -> Option<Result<ChatResponse>> {
        loop {
            match std::mem::replace(&mut self.phase, StreamPhase::Done) {
                StreamPhase::Init(request) => {
                    let provider = &self.provider;
                    let opened = self
                        .retry
                        .run(ProviderError::is_transient, || provider.stream(request.clone()))
                        .await;
                    match opened {
                        Ok(rx) => self.phase = StreamPhase::Streaming(rx),
                        Err(e) => {
                            warn!(error = %e, "Failed to open completion stream");
                            return Some(Err(e.into()));
                        }
                    }
                }
                StreamPhase::Streaming(mut rx) => match rx.recv().await {
                    Some(Ok(chunk)) => {
                        let content = chunk.content.filter(|c| !c.is_empty());
                        if chunk.done {
                            return match content {
                                Some(delta) => {
                                    self.phase = StreamPhase::Finishing(chunk.usage);
                                    Some(Ok(self.partial(delta)))
                                }
                                None => Some(self.finish(chunk.usage)),
                            };
                        }
                        self.phase = StreamPhase::Streaming(rx);
                        if let Some(delta) = content {
                            return Some(Ok(self.partial(delta)));
                        }
                    }
                    Some(Err(e)) => {
                        warn!(
                            error = %e,
                            received_chars = self.text.len(),
                            "Completion stream failed mid-response"
                        );
                        return Some(Err(e.into()));
                    }
                    None => return Some(self.finish(None)),
                },
                StreamPhase::Finishing(usage) => return Some(self.finish(usage)),
                StreamPhase::Done => return None,
            }
        }
    }

    fn partial(&mut self, delta: String) -> ChatResponse {
        self.text.push_str(&delta);
        let budget = self.session.budget();
        ChatResponse::partial(
            budget.model().as_str(),
            budget.temperature(),
            &self.inputs,
            self.input_tokens,
            self.text.clone(),
            delta,
        )
    }

    /// Build the final record and commit the exchange. Leaves the phase at `Done`.
    fn finish(&mut self, usage: Option<Usage>) -> Result<ChatResponse> {
        let text = std::mem::take(&mut self.text);
        debug!(chars = text.len(), "Completion stream finished");

        let exchange = self.session.record_exchange(
            Arc::clone(&self.user),
            text,
            self.input_tokens,
        )?;

        let budget = self.session.budget();
        Ok(ChatResponse::finished(
            budget.model().as_str(),
            budget.temperature(),
            std::mem::take(&mut self.inputs),
            self.input_tokens,
            exchange.text,
            exchange.response_tokens,
            exchange.price,
            usage,
        ))
    }
}
