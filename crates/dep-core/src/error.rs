//! Shared error taxonomy.
//!
//! Each crate in the workspace owns an error enum scoped to its layer;
//! `CoreError` aggregates the handful that are meaningful below the
//! transport boundary. Higher layers (dep-swarm, dep-realm, ...) define
//! their own enums and compose them the same way, via `#[from]`.

use thiserror::Error;

/// Errors from identity derivation / key handling (§4.1, §3.1).
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid identity format: {0}")]
    InvalidFormat(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("signature verification failed")]
    SignatureFailed,
}

/// Errors from protocol-id / multiaddr parsing (§3.2, §3.3, §6.1).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid protocol id: {0}")]
    InvalidProtocolId(String),

    #[error("invalid multiaddr: {0}")]
    InvalidMultiaddr(String),

    #[error("unknown message type tag: {0}")]
    UnknownMessageType(u8),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
}

/// Top-level aggregation used by the composition root (dep-node) when it
/// needs a single error type to return from `main`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub type CoreResult<T> = Result<T, CoreError>;
