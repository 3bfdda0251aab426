//! # dep-core
//!
//! Shared foundations for the dep2p core runtime: node identity, addressing,
//! protocol ids, realm identity primitives, the error taxonomy, and a
//! testable clock abstraction. Every other crate in the workspace depends
//! on this one; it depends on nothing in the workspace itself.

pub mod addr;
pub mod clock;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod realm;

pub use addr::{extract_node_id, with_node_id, AddrInfo, DiscoverySource, Direction, Multiaddr, NatType, Protocol};
pub use clock::{Clock, SystemClock};
pub use error::{CoreError, CoreResult, IdentityError, ProtocolError};
pub use identity::{NodeId, PUBLIC_KEY_LEN};
pub use protocol::{
    ProtocolId, PROTO_AUTONAT, PROTO_HOLEPUNCH, PROTO_IDENTIFY, PROTO_RELAY_HOP, PROTO_RELAY_STOP,
};
pub use realm::{Psk, RealmId, RealmKey};
