//! # dep-realm
//!
//! The Realm abstraction (§3.4, §4.12-§4.14): a logical business-isolation
//! domain layered on top of the Swarm. A node joins at most one realm at a
//! time; membership is gated by possession of a shared PSK and proven by
//! an HMAC challenge-response handshake; business APIs everywhere else in
//! the stack are expected to consult [`manager::RealmManager::is_member_joined`]
//! before doing anything realm-scoped.

pub mod auth;
pub mod connector;
pub mod error;
pub mod manager;
pub mod member_cache;

pub use auth::{run_initiator, run_responder, AuthOutcome};
pub use connector::{
    resolve_addresses, HolePunchProvider, MemberGossipCache, RealmConnector, RelayForwardProvider,
    ResolvedAddresses,
};
pub use error::{RealmError, RealmResult};
pub use manager::{ProtocolService, RealmManager, RealmState, RelayRegistrar, RendezvousRegistrar, DISCOVERY_TTL};
pub use member_cache::{Member, MemberCache, MemberStatus, EVICTION_WINDOW};
