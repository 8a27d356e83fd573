// Error types for the facades and the engines behind them

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced to callers of the facades.
///
/// Nothing here is retried or swallowed; every variant reaches the caller of
/// the operation that produced it.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid secret, raised on first registry access
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A selector asked for a format the item does not offer
    #[error("lookup error: {0}")]
    Lookup(String),

    /// The operation was called with input it does not accept
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Opaque failure from one of the engines
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Backend(BackendError::Execution(e.to_string()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Backend(BackendError::Parse(e.to_string()))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Backend(BackendError::from(e))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Network timeout while talking to the remote service
    #[error("network timeout: {0}")]
    NetworkTimeout(String),

    /// The remote service refused the request (429, bot detection, ...)
    #[error("blocked by remote service: {0}")]
    Blocked(String),

    /// External tool not found in the system
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Engine output could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// Error body returned by a remote API
    #[error("api error {code}: {message}")]
    Api { code: i64, message: String },

    /// Authentication was rejected
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Command execution failed
    #[error("execution error: {0}")]
    Execution(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::NetworkTimeout(e.to_string())
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else if e.status().is_some_and(|s| s.as_u16() == 429) {
            Self::Blocked(e.to_string())
        } else {
            Self::Unknown(e.to_string())
        }
    }
}

// Classifies raw engine stderr
impl From<String> for BackendError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::NetworkTimeout(s);
        }

        if lower.contains("429") || lower.contains("sign in to confirm you're not a bot") || lower.contains("blocked") {
            return Self::Blocked(s);
        }

        if lower.contains("command not found") || lower.contains("no such file") {
            return Self::ToolNotFound(s);
        }

        if lower.contains("json") || lower.contains("parse") {
            return Self::Parse(s);
        }

        if lower.contains("invalid url") || lower.contains("unsupported url") {
            return Self::InvalidUrl(s);
        }

        Self::Unknown(s)
    }
}

impl From<&str> for BackendError {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}
