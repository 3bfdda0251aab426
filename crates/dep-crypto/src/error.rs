//! Errors from identity and HMAC operations (§4.1, §4.13).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("signature verification failed")]
    SignatureFailed,

    #[error("HMAC verification failed")]
    HmacMismatch,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
