//! # dep-relay
//!
//! The unified relay (§4.9): one server, one reservation model, three
//! responsibilities — an address-book cache, a signaling channel for
//! hole-punch coordination, and last-resort data forwarding when direct
//! connectivity and hole punching both fail.

pub mod addressbook;
pub mod error;
pub mod forwarding;
pub mod limits;
pub mod reservation;
pub mod signaling;
pub mod voucher;

pub use addressbook::{AddressBook, AddressBookEntry};
pub use error::{RelayError, RelayResult};
pub use forwarding::{forward_circuit, splice, CircuitHandle};
pub use limits::LimitsPolicy;
pub use reservation::{
    retry_with_backoff, BackoffConfig, ReservationState, MAX_RENEWAL_FAILURES, RENEWAL_WINDOW, RESERVATION_TTL,
};
pub use signaling::{ReservationLookup, SignalingHub, SignalingMessage};
pub use voucher::Voucher;
