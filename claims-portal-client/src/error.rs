use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the portal client.
///
/// Poll failures inside the job tracker are deliberately absent: they are
/// absorbed and retried on the next tick, never returned to a caller.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Input rejected before any network call was made.
    #[error("invalid claim submission: {0}")]
    Validation(String),

    /// The submission deadline elapsed before the backend responded.
    #[error("claim submission timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure (connect, DNS, broken stream).
    #[error("request to backend failed: {0}")]
    Network(String),

    /// The backend answered with a non-2xx status. Failure bodies are not
    /// interpreted by this layer.
    #[error("backend returned HTTP {0}")]
    UnexpectedStatus(u16),

    /// A success response whose body could not be decoded, including
    /// unknown values for closed status enumerations.
    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
