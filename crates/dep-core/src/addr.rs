//! Addressing (§3.2).
//!
//! Multiaddrs are re-exported from the `multiaddr` crate rather than
//! hand-parsed, since §6.1 requires wire/string-format compatibility with
//! go-multiaddr and that crate already guarantees it.

use serde::{Deserialize, Serialize};

use crate::identity::NodeId;

pub use multiaddr::{Multiaddr, Protocol};

/// `(NodeID, list of Multiaddrs)` — what the caller gets back from any
/// peer lookup (Peerstore, DHT record, relay address book, member cache).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddrInfo {
    pub node_id: NodeId,
    #[serde(with = "multiaddr_vec")]
    pub addrs: Vec<Multiaddr>,
}

impl AddrInfo {
    pub fn new(node_id: NodeId, addrs: Vec<Multiaddr>) -> Self {
        Self { node_id, addrs }
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

/// Multihash code for "identity" (the raw bytes are the digest itself),
/// used to embed a `NodeId` in a Multiaddr's `/p2p/<NodeId>` suffix
/// (§3.2, §6.1) without pulling in a full libp2p peer-id/protobuf stack.
const IDENTITY_MULTIHASH_CODE: u64 = 0x00;

/// Append a `/p2p/<node_id>` component, the form the wire format (§6.1)
/// and §3.2's `AddrInfo` expect when an address needs to carry identity
/// alongside a route (e.g. handed to [`crate::protocol`] peers or printed
/// for an operator to share).
pub fn with_node_id(mut addr: Multiaddr, node_id: NodeId) -> Multiaddr {
    let mh = multiaddr::multihash::Multihash::wrap(IDENTITY_MULTIHASH_CODE, node_id.as_bytes())
        .expect("32-byte digest always fits an identity multihash");
    addr.push(Protocol::P2p(mh));
    addr
}

/// Extract the `NodeId` from a Multiaddr's `/p2p/<node_id>` component, if
/// present. Used by the Node-level `connect` API (§4.14.2 / DESIGN NOTES):
/// a raw connect call is only ever given a full Multiaddr, never a bare
/// `NodeId` — that shortcut is reserved for Realm-scoped dialing.
pub fn extract_node_id(addr: &Multiaddr) -> Option<NodeId> {
    addr.iter().find_map(|p| match p {
        Protocol::P2p(mh) if mh.code() == IDENTITY_MULTIHASH_CODE && mh.digest().len() == 32 => {
            let mut digest = [0u8; 32];
            digest.copy_from_slice(mh.digest());
            Some(NodeId::from_digest(digest))
        }
        _ => None,
    })
}

/// Where an address came from — drives both ranking (§4.5.3) and TTL (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoverySource {
    PeerstoreLocal,
    MemberList,
    Dht,
    Relay,
    Mdns,
    Manual,
}

/// Inbound vs outbound, used by both Connection bookkeeping (§3.3) and
/// connection-manager scoring (§4.6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// NAT classification, coarse enough to decide whether hole punching can
/// succeed (§4.8.3): two symmetric peers can never punch through to each
/// other and must fall back to relay forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NatType {
    #[default]
    Unknown,
    OpenOrPublic,
    FullCone,
    RestrictedCone,
    PortRestrictedCone,
    Symmetric,
}

impl NatType {
    pub fn is_symmetric(&self) -> bool {
        matches!(self, NatType::Symmetric)
    }
}

mod multiaddr_vec {
    use super::Multiaddr;
    use serde::{Deserializer, Serializer};
    use serde::{de::Error as _, ser::SerializeSeq};

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

    #[test]
    fn addr_info_roundtrip_postcard() {
        let node_id = NodeId::from_public_key_bytes(&[1u8; 32]);
        let addr: Multiaddr = "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap();
        let info = AddrInfo::new(node_id, vec![addr.clone()]);

        let bytes = postcard::to_allocvec(&info).unwrap();
        let decoded: AddrInfo = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.node_id, info.node_id);
        assert_eq!(decoded.addrs, vec![addr]);
    }

    #[test]
    fn symmetric_nat_detection() {
        assert!(NatType::Symmetric.is_symmetric());
        assert!(!NatType::FullCone.is_symmetric());
        assert!(!NatType::Unknown.is_symmetric());
    }
}
