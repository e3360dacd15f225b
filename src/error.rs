//! Error taxonomy for the extraction pipeline.
//!
//! Every failure the pipeline can report to a client falls into one of four
//! buckets. Remote and malformed-response failures are reported per chunk by
//! the dispatcher; input failures reject the whole request; storage failures
//! either surface per chunk (dedup) or are logged and swallowed (contacts).

use thiserror::Error;

/// Pipeline error.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or empty text, or a request body that does not decode.
    #[error("invalid input: {0}")]
    Input(String),

    /// Network or HTTP failure talking to the LLM endpoint.
    #[error("LLM request failed: {0}")]
    RemoteCall(String),

    /// The LLM replied, but not with JSON of the expected shape.
    #[error("malformed LLM response: {0}")]
    MalformedResponse(String),

    /// Persistence failure in the dedup or contact store.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::RemoteCall(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
