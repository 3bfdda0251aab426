//! # dep-nat
//!
//! NAT traversal services (§4.8): STUN probing, UPnP/NAT-PMP port
//! mapping, and signaling-coordinated hole punching. Everything here
//! only ever produces *candidate* addresses or connection attempts —
//! promoting a candidate to verified is the Reachability Coordinator's
//! job, not this crate's.

pub mod error;
pub mod holepunch;
pub mod stun;
pub mod upnp;

pub use error::{NatError, NatResult};
pub use holepunch::{
    check_preconditions, run_holepunch, SignalingChannel, SimultaneousDialer, DIAL_WINDOW, HOLEPUNCH_PROTOCOL,
};
pub use stun::{probe_external_address, FALLBACK_TIMEOUT, PRIMARY_TIMEOUT};
pub use upnp::{map_port, run_renewal_loop, PortMapping, MAPPING_TTL, RENEWAL_MARGIN};
