//! Node identity — the identifier every other layer keys on.
//!
//! A [`NodeId`] is derived from a public key, never carries the key itself,
//! and is cheap to clone/hash/compare. It is the system's `PeerID`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IdentityError;

/// Raw length of an Ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Base58-encoded SHA-256 digest of a node's Ed25519 public key.
///
/// Two nodes with the same private key always derive the same `NodeId`;
/// this is the only invariant the rest of the stack relies on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(#[serde(with = "serde_bytes32")] [u8; 32]);

impl NodeId {
    /// Derive a `NodeId` from raw public key bytes.
    pub fn from_public_key_bytes(public_key: &[u8; PUBLIC_KEY_LEN]) -> Self {
        let digest = Sha256::digest(public_key);
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        Self(id)
    }

    /// Build a `NodeId` directly from an already-derived digest.
    ///
    /// Used when decoding a `NodeId` off the wire (e.g. from a Multiaddr's
    /// `/p2p/<NodeId>` suffix); callers must not use this to forge an id
    /// that doesn't correspond to a public key they hold.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Base58 display form, matching go-libp2p-style `PeerID` strings.
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short_id())
    }
}

impl NodeId {
    /// First 8 characters of the base58 form, for log lines.
    pub fn short_id(&self) -> String {
        let full = self.to_base58();
        full.chars().take(8).collect()
    }
}

impl FromStr for NodeId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| IdentityError::InvalidFormat(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(IdentityError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes);
        Ok(Self(digest))
    }
}

mod serde_bytes32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let v: Vec<u8> = Vec::deserialize(d)?;
        v.try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::invalid_length(v.len(), &"32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_id() {
        let pk = [7u8; 32];
        assert_eq!(
            NodeId::from_public_key_bytes(&pk),
            NodeId::from_public_key_bytes(&pk)
        );
    }

    #[test]
    fn different_keys_different_ids() {
        let a = NodeId::from_public_key_bytes(&[1u8; 32]);
        let b = NodeId::from_public_key_bytes(&[2u8; 32]);
        assert_ne!(a, b);
    }

    #[test]
    fn base58_roundtrip() {
        let id = NodeId::from_public_key_bytes(&[9u8; 32]);
        let s = id.to_base58();
        let parsed: NodeId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn short_id_is_prefix() {
        let id = NodeId::from_public_key_bytes(&[3u8; 32]);
        assert!(id.to_base58().starts_with(&id.short_id()));
        assert_eq!(id.short_id().len(), 8);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = "not-base58-of-right-length".parse::<NodeId>();
        assert!(err.is_err());
    }
}
