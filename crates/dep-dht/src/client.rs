//! The DHT client interface the core actually needs (§4.10). Kademlia
//! internals, record replication, and routing-table maintenance are
//! explicitly out of scope — this crate only defines the boundary and
//! ships an in-memory implementation for tests and single-node setups.

use dep_core::NodeId;

use crate::error::DhtResult;
use crate::record::SignedPeerRecord;

/// A 32-byte content key, as used by `provide`/`find_providers`.
pub type DhtKey = [u8; 32];

#[async_trait::async_trait]
pub trait DhtClient: Send + Sync {
    /// Announce that this node holds `key`.
    async fn provide(&self, key: DhtKey) -> DhtResult<()>;

    /// Find up to `limit` nodes that have announced `key`.
    async fn find_providers(&self, key: DhtKey, limit: usize) -> DhtResult<Vec<NodeId>>;

    /// Publish a signed address record, authoritatively. Implementations
    /// must reject a record whose sequence number does not advance the
    /// stored one.
    async fn put_signed_peer_record(&self, record: SignedPeerRecord) -> DhtResult<()>;

    /// Fetch and verify the signed record for `target`, if any.
    async fn get_signed_peer_record(&self, target: &NodeId) -> DhtResult<Option<SignedPeerRecord>>;
}
