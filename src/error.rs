//! Error types for the fisca pipeline.
//!
//! [`LlmError`] covers calls to the language-model service and carries a
//! stable error code in its Display output. [`PipelineError`] is what a run
//! returns to its caller; stage-local failures never reach it.

use fisca_search::SearchError;

/// Stable error codes for programmatic handling of [`LlmError`].
pub mod error_codes {
    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Authentication failed (invalid/missing API key).
    pub const AUTH_FAILED: &str = "AUTH_FAILED";

    /// Request to the LLM provider failed.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// Streaming response encountered an error.
    pub const STREAM_FAILED: &str = "STREAM_FAILED";

    /// Request or operation timed out.
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";

    /// The provider answered with something we cannot use.
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
}

/// Errors produced when talking to the language-model service.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    ConfigError(String),

    /// Authentication failed.
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    AuthError(String),

    /// Transport failure, rate limit or server-side error.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    RequestError(String),

    /// Streaming response was interrupted or malformed.
    #[error("[{}] {}", error_codes::STREAM_FAILED, .0)]
    StreamError(String),

    /// The call exceeded its time budget.
    #[error("[{}] {}", error_codes::TIMEOUT_ERROR, .0)]
    TimeoutError(String),

    /// Unexpected status or payload shape.
    #[error("[{}] {}", error_codes::PROVIDER_ERROR, .0)]
    ProviderError(String),
}

impl LlmError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => error_codes::CONFIG_INVALID,
            Self::AuthError(_) => error_codes::AUTH_FAILED,
            Self::RequestError(_) => error_codes::REQUEST_FAILED,
            Self::StreamError(_) => error_codes::STREAM_FAILED,
            Self::TimeoutError(_) => error_codes::TIMEOUT_ERROR,
            Self::ProviderError(_) => error_codes::PROVIDER_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::ConfigError(m)
            | Self::AuthError(m)
            | Self::RequestError(m)
            | Self::StreamError(m)
            | Self::TimeoutError(m)
            | Self::ProviderError(m) => m,
        }
    }

    /// Returns true if this error represents a transient failure.
    ///
    /// Transport errors, rate limits, 5xx responses, stream interruptions
    /// and timeouts are retryable. Configuration, authentication and
    /// payload-shape errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConfigError(_) | Self::AuthError(_) | Self::ProviderError(_) => false,
            Self::RequestError(_) | Self::StreamError(_) | Self::TimeoutError(_) => true,
        }
    }
}

/// Errors a pipeline run (or process startup) can end with.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// The question could not be classified.
    #[error("classification failed: {0}")]
    Classification(String),

    /// The answer could not be generated.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The caller cancelled the run.
    #[error("run cancelled")]
    Cancelled,

    /// I/O error (config or prompt files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SearchError> for PipelineError {
    fn from(e: SearchError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<LlmError> for PipelineError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::ConfigError(m) => Self::Config(m),
            other => Self::Generation(other.to_string()),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PipelineError>;
