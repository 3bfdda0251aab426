//! Transport-layer error taxonomy (§4.2–4.5).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("no certificate presented")]
    NoCertificate,

    #[error("peer certificate does not match expected peer: got {got}, expected {expected}")]
    PeerMismatch { got: String, expected: String },

    #[error("invalid public key in certificate: {0}")]
    InvalidPublicKey(String),

    #[error("certificate has no public-key extension")]
    NoPublicKeyExtension,

    #[error("certificate generation failed: {0}")]
    CertGeneration(String),

    #[error("tls error: {0}")]
    Tls(String),
}

#[derive(Debug, Error)]
pub enum MuxerError {
    #[error("stream reset by peer")]
    StreamReset,

    #[error("end of stream")]
    Eof,

    #[error("muxed connection is closed")]
    ConnectionClosed,

    #[error("yamux protocol error: {0}")]
    Yamux(String),
}

#[derive(Debug, Error)]
pub enum DialError {
    #[error("unsupported transport for address {0}")]
    UnsupportedAddress(String),

    #[error("dial timed out")]
    Timeout,

    #[error("io error: {0}")]
    Io(String),

    #[error("security handshake failed: {0}")]
    Security(#[from] SecurityError),

    #[error("dial failed on all {attempts} candidate address(es): {detail}")]
    DialFailed { attempts: usize, detail: String },
}

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("unsupported listen address {0}")]
    UnsupportedAddress(String),

    #[error("bind failed: {0}")]
    Bind(String),
}

#[derive(Debug, Error)]
pub enum ProtocolNegotiationError {
    #[error("peer rejected protocol {0}")]
    Rejected(String),

    #[error("malformed negotiation frame")]
    Malformed,

    #[error("io error during negotiation: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Muxer(#[from] MuxerError),

    #[error(transparent)]
    Dial(#[from] DialError),

    #[error(transparent)]
    Listen(#[from] ListenError),

    #[error(transparent)]
    Negotiation(#[from] ProtocolNegotiationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;
