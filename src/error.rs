//! Error types for image generation, relaying and accounting.

use std::time::Duration;

/// Maximum length of a provider error body surfaced to callers.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while generating images or talking to the relay.
#[derive(Debug, thiserror::Error)]
pub enum ImageGenError {
    /// API key missing or invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Account has no credit left at the provider.
    #[error("billing error: {0}")]
    Billing(String),

    /// The relay's monthly budget cannot cover the request.
    #[error("monthly budget exhausted: {message}")]
    BudgetExhausted {
        message: String,
        /// Relay budget at the time of refusal, when it reported one.
        status: Option<crate::accounting::BudgetStatus>,
    },

    /// Request timed out.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Batch refused by the pre-flight check.
    #[error("batch rejected: {0}")]
    Validation(#[from] crate::accounting::ValidationError),

    /// Response did not have the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error (e.g., reading or writing the session state file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ImageGenError {
    /// Returns true for failures of the transport rather than of the request.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Budget snapshot carried by a relay refusal.
    pub fn budget_status(&self) -> Option<&crate::accounting::BudgetStatus> {
        match self {
            Self::BudgetExhausted { status, .. } => status.as_ref(),
            _ => None,
        }
    }
}

/// Result type alias for image generation operations.
pub type Result<T> = std::result::Result<T, ImageGenError>;

/// Redacts API keys and truncates a provider error body.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let redacted: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            let trimmed = word.trim_matches(|c: char| c == '"' || c == '\'' || c == ',');
            if trimmed.starts_with("sk-") && trimmed.len() > 8 {
                word.replace(trimmed, "sk-***")
            } else {
                word.to_string()
            }
        })
        .collect();
    let mut message = redacted.join(" ");

    if message.chars().count() > MAX_ERROR_MESSAGE_LEN {
        message = message.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        message.push_str("...");
    }
    message
}

/// Parses the `Retry-After` header as a number of seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
