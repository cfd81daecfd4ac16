//! Error types for chatstack.
//!
//! Uses `thiserror` for ergonomic error definitions. Provider failures
//! carry their own enum so the retry layer can classify them.

use thiserror::Error;

/// The top-level error type for all chatstack operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model errors ---
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- History errors ---
    #[error("Invalid turn for conversation history: {0}")]
    InvalidTurn(String),

    // --- Tokenizer ---
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by a completion backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request exceeds the model context window: {0}")]
    RequestTooLarge(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether re-issuing the identical request may succeed.
    ///
    /// Rate limits and transport/server faults are transient. Anything
    /// that says the request itself is wrong is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Network(_)
            | Self::Timeout(_)
            | Self::StreamInterrupted(_) => true,
            Self::ApiError { status_code, .. } => !(400..500).contains(status_code),
            Self::RequestTooLarge(_)
            | Self::InvalidRequest(_)
            | Self::AuthenticationFailed(_)
            | Self::ModelNotFound(_)
            | Self::NotConfigured(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 503,
            message: "Service Unavailable".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("Service Unavailable"));
    }

    #[test]
    fn unsupported_model_names_the_model() {
        let err = Error::UnsupportedModel("davinci".into());
        assert_eq!(err.to_string(), "Unsupported model: davinci");
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::RateLimited { retry_after_secs: 1 }.is_transient());
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::Timeout("slow".into()).is_transient());
        assert!(ProviderError::StreamInterrupted("eof".into()).is_transient());
        assert!(
            ProviderError::ApiError {
                status_code: 502,
                message: "bad gateway".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn request_errors_are_not_transient() {
        assert!(!ProviderError::RequestTooLarge("8200 tokens".into()).is_transient());
        assert!(!ProviderError::InvalidRequest("bad role".into()).is_transient());
        assert!(!ProviderError::AuthenticationFailed("bad key".into()).is_transient());
        assert!(!ProviderError::ModelNotFound("gpt-5".into()).is_transient());
        assert!(
            !ProviderError::ApiError {
                status_code: 422,
                message: "unprocessable".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn every_variant_has_a_caller_facing_message() {
        // No wildcard arm.
        let variants = [
            Error::UnsupportedModel("davinci".into()),
            Error::Provider(ProviderError::Network("reset".into())),
            Error::config("temperature out of range"),
            Error::InvalidTurn("system".into()),
            Error::Tokenizer("cl100k".into()),
        ];
        for err in &variants {
            let label = match err {
                Error::UnsupportedModel(_) => "Unsupported model",
                Error::Provider(_) => "Provider error",
                Error::Config { .. } => "Configuration error",
                Error::InvalidTurn(_) => "Invalid turn",
                Error::Tokenizer(_) => "Tokenizer error",
            };
            assert!(err.to_string().starts_with(label), "{err}");
        }
    }
}
