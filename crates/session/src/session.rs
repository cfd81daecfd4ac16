//! The chat session: one system turn, one history, one provider.

use crate::context::{AssembledContext, ContextAssembler, ConversationHistory};
use crate::response::ChatResponse;
use crate::stream::ExchangeStream;
use chatstack_config::ChatConfig;
use chatstack_core::{
    BudgetConfig, ChatTurn, Cl100kTokenizer, Provider, ProviderError, ProviderRequest, Result,
    Tokenizer,
};
use chatstack_providers::{OpenAiCompatProvider, RetryPolicy};
use chatstack_telemetry::{CostSummary, price_for};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a finished exchange added.
pub(crate) struct CompletedExchange {
    pub text: String,
    pub response_tokens: usize,
    pub price: f64,
}

/// A conversation with a remote chat model under a fixed token budget.
///
/// Exchanges take `&mut self`, so a session runs one exchange at a time;
/// a live stream holds the borrow until it is dropped.
pub struct ChatSession {
    id: SessionId,
    system: Arc<ChatTurn>,
    history: ConversationHistory,
    assembler: ContextAssembler,
    provider: Arc<dyn Provider>,
    tokenizer: Arc<dyn Tokenizer>,
    retry: RetryPolicy,
    usage: CostSummary,
}

impl ChatSession {
    /// Create a session. Fails if the budget is inconsistent.
    pub fn new(
        system_text: impl Into<String>,
        budget: BudgetConfig,
        provider: Arc<dyn Provider>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self> {
        budget.validate()?;
        let system = Arc::new(ChatTurn::system(system_text, tokenizer.as_ref()));
        let id = SessionId::new();

        debug!(
            session_id = %id,
            model = %budget.model(),
            provider = provider.name(),
            tokenizer = tokenizer.name(),
            system_tokens = system.token_count(),
            max_input_tokens = budget.max_input_tokens(),
            "Created chat session"
        );

        Ok(Self {
            id,
            system,
            history: ConversationHistory::new(),
            assembler: ContextAssembler::new(budget),
            provider,
            tokenizer,
            retry: RetryPolicy::default(),
            usage: CostSummary::new(),
        })
    }

    /// Create a session from loaded configuration.
    pub fn from_config(
        config: &ChatConfig,
        provider: Arc<dyn Provider>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self> {
        config.validate()?;
        let budget = config.budget()?;
        Ok(Self::new(config.system_prompt.clone(), budget, provider, tokenizer)?
            .with_retry_policy(RetryPolicy::from_config(&config.retry)))
    }

    /// Create a session talking to the configured OpenAI-compatible endpoint,
    /// counting tokens with `cl100k_base`.
    pub fn connect(config: &ChatConfig) -> Result<Self> {
        let provider = OpenAiCompatProvider::from_config(&config.provider)?;
        let tokenizer = Cl100kTokenizer::new()?;
        Self::from_config(config, Arc::new(provider), Arc::new(tokenizer))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn budget(&self) -> &BudgetConfig {
        self.assembler.budget()
    }

    pub fn system_turn(&self) -> &Arc<ChatTurn> {
        &self.system
    }

    /// Totals over completed exchanges.
    pub fn usage(&self) -> &CostSummary {
        &self.usage
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    pub(crate) fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Insert a user or assistant turn into history without calling the model.
    pub fn add_message(&mut self, turn: ChatTurn) -> Result<()> {
        self.history.push(Arc::new(turn))
    }

    /// Preview the messages `text` would be sent with.
    ///
    /// Calls nothing and changes nothing.
    pub fn assemble(
        &self,
        text: &str,
        dynamic_context: Option<&[Arc<ChatTurn>]>,
    ) -> AssembledContext {
        let user = self.user_turn(text);
        self.assemble_with(&user, dynamic_context)
    }

    /// Send `text` and wait for the complete reply.
    ///
    /// Transient provider errors are retried per the session's
    /// [`RetryPolicy`]. On success the user turn and the reply are appended
    /// to history; on failure history is unchanged.
    pub async fn user_message(
        &mut self,
        text: impl Into<String>,
        dynamic_context: Option<&[Arc<ChatTurn>]>,
    ) -> Result<ChatResponse> {
        let user = self.user_turn(text);
        let context = self.assemble_with(&user, dynamic_context);
        let input_tokens = context.input_tokens();
        let request = self.provider_request(&context, false);

        let provider = Arc::clone(&self.provider);
        let response = self
            .retry
            .run(ProviderError::is_transient, || provider.complete(request.clone()))
            .await?;

        let exchange = self.record_exchange(user, response.content, input_tokens)?;

        Ok(ChatResponse::finished(
            self.budget().model().as_str(),
            self.budget().temperature(),
            context.messages,
            input_tokens,
            exchange.text,
            exchange.response_tokens,
            exchange.price,
            response.usage,
        ))
    }

    /// Send `text` and receive the reply incrementally.
    ///
    /// Each non-empty increment yields a partial record carrying the text
    /// so far; a final record follows with token counts and price. The
    /// exchange is committed to history when the final record is produced.
    /// Dropping the stream before then leaves the session unchanged.
    pub fn user_message_stream(
        &mut self,
        text: impl Into<String>,
        dynamic_context: Option<&[Arc<ChatTurn>]>,
    ) -> impl Stream<Item = Result<ChatResponse>> + Unpin + '_ {
        let user = self.user_turn(text);
        let context = self.assemble_with(&user, dynamic_context);
        let input_tokens = context.input_tokens();
        let request = self.provider_request(&context, true);

        ExchangeStream::new(self, user, context.messages, input_tokens, request).into_stream()
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn user_turn(&self, text: impl Into<String>) -> Arc<ChatTurn> {
        Arc::new(ChatTurn::user(text, self.tokenizer.as_ref()))
    }

    /// The pending user turn is newest, ahead of everything stored.
    fn assemble_with(
        &self,
        user: &Arc<ChatTurn>,
        dynamic_context: Option<&[Arc<ChatTurn>]>,
    ) -> AssembledContext {
        self.assembler.assemble(
            &self.system,
            std::iter::once(user).chain(self.history.iter()),
            dynamic_context,
        )
    }

    fn provider_request(&self, context: &AssembledContext, stream: bool) -> ProviderRequest {
        let budget = self.budget();
        ProviderRequest {
            model: budget.model().as_str().to_string(),
            messages: context.messages.clone(),
            temperature: budget.temperature(),
            max_tokens: Some(budget.max_response_tokens()),
            stream,
        }
    }

    /// Turn the reply into an assistant turn, price it, and commit the exchange.
    pub(crate) fn record_exchange(
        &mut self,
        user: Arc<ChatTurn>,
        reply: String,
        input_tokens: usize,
    ) -> Result<CompletedExchange> {
        let assistant = Arc::new(ChatTurn::assistant(reply, self.tokenizer.as_ref()));
        let response_tokens = assistant.token_count();
        let price = price_for(self.budget().model(), input_tokens, response_tokens);
        let text = assistant.text().to_string();

        self.history.push_exchange(user, assistant)?;
        self.usage.record(input_tokens, response_tokens, price);

        info!(
            session_id = %self.id,
            model = %self.budget().model(),
            input_tokens,
            response_tokens,
            price,
            history_len = self.history.len(),
            "Exchange completed"
        );

        Ok(CompletedExchange {
            text,
            response_tokens,
            price,
        })
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("model", &self.budget().model())
            .field("provider", &self.provider.name())
            .field("tokenizer", &self.tokenizer.name())
            .field("history_len", &self.history.len())
            .field("usage", &self.usage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatstack_core::{HeuristicTokenizer, Model, ProviderResponse};

    struct NeverCalled;

    #[async_trait::async_trait]
    impl Provider for NeverCalled {
        fn name(&self) -> &str {
            "never"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("offline".into()))
        }
    }

    fn session() -> ChatSession {
        ChatSession::new(
            "You are terse.",
            BudgetConfig::for_model(Model::Gpt35Turbo),
            Arc::new(NeverCalled),
            Arc::new(HeuristicTokenizer),
        )
        .unwrap()
    }

    #[test]
    fn new_session_is_empty() {
        let session = session();
        assert!(session.history().is_empty());
        assert_eq!(session.usage().exchanges, 0);
        assert_eq!(session.system_turn().text(), "You are terse.");
        assert_eq!(session.budget().max_input_tokens(), 3896);
        assert_eq!(session.id().to_string().len(), 36);
    }

    #[test]
    fn invalid_budget_rejected() {
        let result = ChatSession::new(
            "sys",
            BudgetConfig::for_model(Model::Gpt35Turbo).with_min_response_tokens(4096),
            Arc::new(NeverCalled),
            Arc::new(HeuristicTokenizer),
        );
        assert!(result.is_err());
    }

    #[test]
    fn add_message_accepts_only_conversation_turns() {
        let mut session = session();
        let tok = HeuristicTokenizer;

        session.add_message(ChatTurn::user("hi", &tok)).unwrap();
        session.add_message(ChatTurn::assistant("hello", &tok)).unwrap();
        assert_eq!(session.history().len(), 2);

        assert!(session.add_message(ChatTurn::system("rules", &tok)).is_err());
        assert!(session.add_message(ChatTurn::context("Doc", "x", &tok)).is_err());
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn assemble_preview_puts_pending_user_turn_last() {
        let mut session = session();
        let tok = HeuristicTokenizer;
        session.add_message(ChatTurn::user("first", &tok)).unwrap();
        session.add_message(ChatTurn::assistant("reply", &tok)).unwrap();

        let context = session.assemble("second", None);
        let texts: Vec<&str> = context.messages.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["You are terse.", "first", "reply", "second"]);

        // Preview does not mutate.
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn request_carries_budget_limits() {
        let session = session();
        let context = session.assemble("hi", None);
        let request = session.provider_request(&context, true);
        assert_eq!(request.model, "gpt-3.5-turbo");
        assert_eq!(request.max_tokens, Some(400));
        assert_eq!(request.temperature, 0.5);
        assert!(request.stream);
        assert_eq!(request.messages.len(), 2);
    }

    #[tokio::test]
    async fn failed_exchange_leaves_history_unchanged() {
        let mut session = session().with_retry_policy(RetryPolicy::none());
        let err = session.user_message("hi", None).await.unwrap_err();
        assert!(matches!(
            err,
            chatstack_core::Error::Provider(ProviderError::NotConfigured(_))
        ));
        assert!(session.history().is_empty());
        assert_eq!(session.usage().exchanges, 0);
    }

    #[test]
    fn connect_without_key_fails() {
        let config = ChatConfig::default();
        let err = ChatSession::connect(&config).unwrap_err();
        assert!(matches!(
            err,
            chatstack_core::Error::Provider(ProviderError::NotConfigured(_))
        ));
    }
}
