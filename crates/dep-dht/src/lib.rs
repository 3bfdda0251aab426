//! # dep-dht
//!
//! The DHT client boundary the core actually consumes (§4.10): signed
//! peer records (authoritative address publication) plus a bare
//! provide/find_providers interface for content-routing use by higher
//! layers. Kademlia internals are explicitly out of scope; this crate
//! ships [`MockDhtClient`] so the rest of the stack can be built and
//! tested against a real trait without a real DHT swarm.

pub mod client;
pub mod error;
pub mod mock;
pub mod record;

pub use client::{DhtClient, DhtKey};
pub use error::{DhtError, DhtResult};
pub use mock::MockDhtClient;
pub use record::SignedPeerRecord;
