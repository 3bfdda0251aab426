//! Node-level error aggregation. Every lower-layer crate gets its own
//! variant via `#[from]`; the remaining variants are things that only
//! make sense at the composition root (keystore I/O, double-start).

use dep_connmgr::DenyReason;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node already started")]
    AlreadyStarted,

    #[error("node not started")]
    NotStarted,

    #[error("a bare NodeID cannot be dialed outside a realm; supply a full Multiaddr")]
    AddressRequired,

    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("dial rejected by connection gater: {0:?}")]
    GaterDenied(DenyReason),

    #[error(transparent)]
    Core(#[from] dep_core::CoreError),

    #[error(transparent)]
    Crypto(#[from] dep_crypto::CryptoError),

    #[error(transparent)]
    Transport(#[from] dep_transport::TransportError),

    #[error(transparent)]
    Swarm(#[from] dep_swarm::SwarmError),

    #[error(transparent)]
    ConnMgr(#[from] dep_connmgr::ConnMgrError),

    #[error(transparent)]
    Reachability(#[from] dep_reachability::ReachabilityError),

    #[error(transparent)]
    Nat(#[from] dep_nat::NatError),

    #[error(transparent)]
    Relay(#[from] dep_relay::RelayError),

    #[error(transparent)]
    Dht(#[from] dep_dht::DhtError),

    #[error(transparent)]
    Realm(#[from] dep_realm::RealmError),
}

impl From<std::io::Error> for NodeError {
    fn from(e: std::io::Error) -> Self {
        NodeError::Io(e.to_string())
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
