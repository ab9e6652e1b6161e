//! Error types for port operations.

use transmute_domain::DomainError;

/// Everything that can go wrong while producing one image.
///
/// Adapters report through this type; the orchestrator logs and returns it
/// unchanged, and the HTTP layer maps it to a status code.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    /// Rejected before any network call.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backend answered a submission, upload or poll with a non-2xx status.
    #[error("Upstream rejected the request ({status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    /// Backend answered 429.
    #[error("Upstream rate limit reached: {message}")]
    RateLimited { message: String },

    /// Backend reported failure, or a success without a usable image.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Client-side polling ceiling reached.
    #[error("Generation timed out after {elapsed_secs}s")]
    GenerationTimedOut { elapsed_secs: u64 },

    /// Connection-level failure (DNS, refused, reset, request timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Missing token, malformed model reference and the like.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GenerationError {
    pub fn invalid_request(message: impl ToString) -> Self {
        Self::InvalidRequest(message.to_string())
    }

    pub fn failed(message: impl ToString) -> Self {
        Self::GenerationFailed(message.to_string())
    }

    pub fn transport(message: impl ToString) -> Self {
        Self::Transport(message.to_string())
    }

    pub fn configuration(message: impl ToString) -> Self {
        Self::Configuration(message.to_string())
    }

    /// Classify a non-2xx HTTP answer.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 {
            Self::RateLimited { message }
        } else {
            Self::UpstreamRejected { status, message }
        }
    }

    /// Whether a caller could reasonably try the same request again.
    ///
    /// The pipeline itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited { .. } => true,
            Self::UpstreamRejected { status, .. } => *status >= 500,
            Self::InvalidRequest(_)
            | Self::GenerationFailed(_)
            | Self::GenerationTimedOut { .. }
            | Self::Configuration(_) => false,
        }
    }
}

impl From<DomainError> for GenerationError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(message) | DomainError::Parse(message) => {
                Self::InvalidRequest(message)
            }
            DomainError::InvalidStateTransition(message) => Self::GenerationFailed(message),
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status(status.as_u16(), err.to_string()),
            None if err.is_decode() => {
                Self::GenerationFailed(format!("unreadable backend response: {}", err))
            }
            None => Self::Transport(err.to_string()),
        }
    }
}
