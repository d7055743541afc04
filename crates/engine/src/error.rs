use selectsync_util::{HttpExecError, JsonParseError, redact_sensitive};
use thiserror::Error;

/// Failure taxonomy of option synchronization.
///
/// None of these are fatal: the controller degrades to an empty or previous
/// option set, emits a component error and still resolves readiness.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    /// Malformed inline JSON or option payload.
    #[error("parse error: {0}")]
    Parse(String),
    /// A custom script failed or produced something other than a list.
    #[error("evaluation error: {0}")]
    Evaluation(String),
    /// The fetch failed at the transport or HTTP level.
    #[error("transport error: {0}")]
    Transport(String),
    /// A required data-source parameter is missing.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The field runtime has shut down.
    #[error("field runtime closed")]
    Closed,
}

impl From<HttpExecError> for SelectError {
    fn from(error: HttpExecError) -> Self {
        match error {
            HttpExecError::Parse(parse) => Self::from(parse),
            other => Self::Transport(redact_sensitive(&other.to_string())),
        }
    }
}

impl From<JsonParseError> for SelectError {
    fn from(error: JsonParseError) -> Self {
        Self::Parse(redact_sensitive(&error.to_string()))
    }
}

impl From<serde_json::Error> for SelectError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}
