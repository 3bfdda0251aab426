//! Errors from candidate validation (§4.7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReachabilityError {
    #[error("not enough AutoNAT peers available: need {needed}, have {available}")]
    InsufficientAutonatPeers { needed: usize, available: usize },

    #[error("validation window expired before quorum was reached")]
    ValidationTimedOut,

    #[error("candidate address not found: {0}")]
    UnknownCandidate(String),
}

pub type ReachabilityResult<T> = Result<T, ReachabilityError>;
