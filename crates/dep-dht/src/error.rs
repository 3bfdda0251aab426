//! Errors from the DHT client interface (§4.10).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DhtError {
    #[error("no record found for this key")]
    NotFound,

    #[error("record signature does not verify against its claimed owner")]
    InvalidSignature,

    #[error("record sequence number {got} is not newer than the stored {have}")]
    StaleSequence { have: u64, got: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type DhtResult<T> = Result<T, DhtError>;
