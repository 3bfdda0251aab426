//! Errors from realm lifecycle, auth, and ID-only dialing (§4.12-§4.14).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealmError {
    #[error("already joined a realm; leave it first")]
    AlreadyJoined,

    #[error("no realm is currently joined")]
    NotJoined,

    #[error("caller is not a member of the joined realm")]
    NotMember,

    #[error("realm_id mismatch in auth handshake")]
    RealmMismatch,

    #[error("auth handshake failed: {0}")]
    AuthFailed(String),

    #[error("join_realm was cancelled")]
    Cancelled,

    #[error("target is not resolvable by address and no relay fallback applies")]
    AddressRequired,

    #[error("dialing target failed through every cascade step")]
    Unreachable,

    #[error(transparent)]
    Swarm(#[from] dep_swarm::SwarmError),

    #[error(transparent)]
    Dht(#[from] dep_dht::DhtError),

    #[error(transparent)]
    Relay(#[from] dep_relay::RelayError),

    #[error(transparent)]
    Nat(#[from] dep_nat::NatError),
}

pub type RealmResult<T> = Result<T, RealmError>;
