//! # dep-crypto
//!
//! Ed25519 node identity and signing, plus the HMAC-SHA256 primitives used
//! by realm challenge-response auth. Built on `dep-core`'s `NodeId` and
//! `RealmKey` types.

pub mod error;
pub mod hmac_auth;
pub mod identity;

pub use error::{CryptoError, CryptoResult};
pub use hmac_auth::{compute as hmac_compute, verify as hmac_verify};
pub use identity::{Identity, PublicKey};
