use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error classes surfaced at the screen boundary. Backend failures are
/// never retried at the operation level; callers present them as-is.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("backend unavailable: {0}")]
    Transient(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(&'static str),

    #[error("malformed document: {0}")]
    Decode(#[from] serde_json::Error),
}
