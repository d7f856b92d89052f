use thiserror::Error;

/// Local, synchronous failures of the query cache itself.
///
/// Fetch and mutation failures are never wrapped in this type; they travel
/// through the cache untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid query key: {reason}")]
    InvalidKey { reason: String },
    #[error("query cache has been disposed")]
    Disposed,
    #[error("query cache must be initialised inside a tokio runtime")]
    NoRuntime,
}

impl QueryError {
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }
}
