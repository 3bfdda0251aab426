//! Errors from NAT traversal services (§4.8).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NatError {
    #[error("no STUN server responded")]
    StunUnreachable,

    #[error("malformed STUN response: {0}")]
    StunProtocol(String),

    #[error("no IGD gateway found on the local network")]
    NoGateway,

    #[error("gateway rejected the port mapping request: {0}")]
    PortMappingRejected(String),

    #[error("no signaling channel is available for hole punching")]
    NoSignalingChannel,

    #[error("both peers are behind a symmetric NAT; hole punching cannot succeed")]
    SymmetricNat,

    #[error("hole punch handshake did not complete before the deadline")]
    HolePunchTimedOut,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type NatResult<T> = Result<T, NatError>;
