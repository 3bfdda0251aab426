//! Swarm error taxonomy (§4.5, §7).

use dep_core::NodeId;
use thiserror::Error;

/// One candidate address's dial failure, preserved so a total-failure
/// `DialFailed` can show the caller exactly what every address attempt did.
#[derive(Debug, Error, Clone)]
#[error("{addr}: {reason}")]
pub struct AddrDialError {
    pub addr: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("no addresses available to dial peer {peer}")]
    NoAddresses { peer: NodeId },

    #[error("dial to {peer} failed on all {attempts} candidate address(es)")]
    DialFailed {
        peer: NodeId,
        attempts: usize,
        sub_errors: Vec<AddrDialError>,
    },

    #[error("dial to {peer} was cancelled")]
    Cancelled { peer: NodeId },

    #[error("connection to {peer} denied by gater: {reason:?}")]
    GaterDenied {
        peer: NodeId,
        reason: dep_connmgr::DenyReason,
    },

    #[error("swarm is closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(#[from] dep_transport::TransportError),
}

pub type SwarmResult<T> = Result<T, SwarmError>;
