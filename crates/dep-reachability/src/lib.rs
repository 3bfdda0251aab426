//! # dep-reachability
//!
//! The Reachability Coordinator (§4.7): the boundary between a raw
//! externally-observed address (from STUN, a UPnP mapping, or a peer's
//! "here's what I saw you as") and an address this node is willing to
//! tell the DHT or a relay about. Nothing crosses that boundary without
//! surviving an AutoNAT dial-back quorum.

pub mod autonat;
pub mod candidate;
pub mod coordinator;
pub mod error;

pub use autonat::{AutonatPeer, MIN_AUTONAT_PEERS, REQUIRED_SUCCESSES, VALIDATION_WINDOW};
pub use candidate::{Candidate, CandidateSource, CANDIDATE_TTL};
pub use coordinator::{NetworkChange, ReachabilityCoordinator};
pub use error::{ReachabilityError, ReachabilityResult};
