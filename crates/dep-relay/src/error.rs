//! Errors from the unified relay (§4.9).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("no reservation held with this relay")]
    NoReservation,

    #[error("reservation expired")]
    ReservationExpired,

    #[error("reservation or renewal failed after exhausting retries")]
    ReservationFailed,

    #[error("voucher signature is invalid")]
    InvalidVoucher,

    #[error("voucher has expired")]
    VoucherExpired,

    #[error("relay has no address book entry for this target")]
    UnknownTarget,

    #[error("target does not hold a valid reservation, signaling refused")]
    TargetNotReserved,

    #[error("relay connection limit reached")]
    ConnectionLimitReached,

    #[error("splicing the forwarded circuit failed: {0}")]
    ForwardFailed(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] dep_transport::TransportError),
}

pub type RelayResult<T> = Result<T, RelayError>;
