use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierParseError {
    #[error("Empty identifier")]
    Empty,

    #[error("Invalid identifier component: {0:?}")]
    InvalidComponent(String),
}

/// Failures talking to the relay. All of them are recoverable: the poll
/// cycle that hit one is skipped and retried on the next interval.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Relay unreachable: {0}")]
    Unreachable(String),

    #[error("Relay rejected credentials for team {0}")]
    Unauthorized(String),

    #[error("Malformed relay data: {0}")]
    Malformed(String),
}

/// Failure of the durability layer behind a write-through call.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Persistence backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Persistence sink unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PersistenceError::Backend(Box::new(err))
    }
}
