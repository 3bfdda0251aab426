//! Signed peer records (§4.10): the only thing the DHT is trusted to
//! return unverified — everything else the caller must check itself.
//! Signing over `(NodeID, addrs, seq)` means only the holder of the
//! matching private key can mint a valid record, so a malicious DHT node
//! (or a poisoned cache entry) can't plant fake addresses for somebody
//! else's NodeID. The owner's raw public key travels with the record so
//! a holder of nothing but the `NodeID` being looked up can still verify
//! it end to end: check that hashing the embedded key reproduces the
//! `NodeID`, then check the signature against that same key.

use dep_core::{Multiaddr, NodeId};
use dep_crypto::{Identity, PublicKey};
use serde::{Deserialize, Serialize};

use crate::error::{DhtError, DhtResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordBody {
    node_id: NodeId,
    #[serde(with = "serde_bytes32")]
    public_key: [u8; 32],
    #[serde(with = "addr_bytes")]
    addrs: Vec<Multiaddr>,
    seq: u64,
}

/// An address record that has traveled through the DHT and must be
/// verified against its own embedded public key before a caller trusts
/// its contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPeerRecord {
    body: RecordBody,
    signature: [u8; 64],
}

impl SignedPeerRecord {
    /// Mint a new record, signed by `identity`. The owner's public key is
    /// embedded so a fresh lookup needs nothing but the record itself to
    /// verify it.
    pub fn sign(identity: &Identity, addrs: Vec<Multiaddr>, seq: u64) -> Self {
        let body = RecordBody {
            node_id: identity.node_id(),
            public_key: identity.public_key().as_bytes(),
            addrs,
            seq,
        };
        let signature = identity.sign(&Self::signing_bytes(&body));
        Self { body, signature }
    }

    fn signing_bytes(body: &RecordBody) -> Vec<u8> {
        postcard::to_allocvec(body).expect("record body always serializes")
    }

    pub fn node_id(&self) -> NodeId {
        self.body.node_id
    }

    pub fn addrs(&self) -> &[Multiaddr] {
        &self.body.addrs
    }

    pub fn seq(&self) -> u64 {
        self.body.seq
    }

    /// Verify that the embedded public key actually hashes to the claimed
    /// `NodeID` and that the signature is valid under that key. This is
    /// the only check a caller needs: there is no separate key-lookup
    /// step, because the record carries its own proof of ownership.
    pub fn verify(&self) -> DhtResult<()> {
        let public_key = PublicKey::from_bytes(&self.body.public_key).map_err(|_| DhtError::InvalidSignature)?;
        if public_key.node_id() != self.body.node_id {
            return Err(DhtError::InvalidSignature);
        }
        let bytes = Self::signing_bytes(&self.body);
        if public_key.verify(&bytes, &self.signature) {
            Ok(())
        } else {
            Err(DhtError::InvalidSignature)
        }
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

mod addr_bytes {
    use dep_core::Multiaddr;
    use serde::{de::Error as _, ser::SerializeSeq, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(addrs: &[Multiaddr], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(addrs.len()))?;
        for a in addrs {
            seq.serialize_element(&a.to_vec())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Multiaddr>, D::Error> {
        let raw: Vec<Vec<u8>> = Vec::deserialize(d)?;
        raw.into_iter()
            .map(|bytes| Multiaddr::try_from(bytes).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Multiaddr {
        "/ip4/198.51.100.1/udp/4001/quic-v1".parse().unwrap()
    }

    #[test]
    fn record_verifies_under_its_own_embedded_key() {
        let id = Identity::generate();
        let record = SignedPeerRecord::sign(&id, vec![addr()], 1);
        assert!(record.verify().is_ok());
        assert_eq!(record.node_id(), id.node_id());
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let id = Identity::generate();
        let mut record = SignedPeerRecord::sign(&id, vec![addr()], 1);
        record.signature[0] ^= 0xff;
        assert!(matches!(record.verify(), Err(DhtError::InvalidSignature)));
    }

    #[test]
    fn record_round_trips_through_postcard() {
        let id = Identity::generate();
        let record = SignedPeerRecord::sign(&id, vec![addr()], 7);
        let bytes = postcard::to_allocvec(&record).unwrap();
        let decoded: SignedPeerRecord = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.node_id(), record.node_id());
        assert_eq!(decoded.seq(), 7);
        assert!(decoded.verify().is_ok());
    }
}
