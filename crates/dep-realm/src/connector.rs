//! Realm Connector (§4.14): "ID-only" dialling inside a realm. Two
//! cascades run in order — resolve addresses for a bare `NodeID`, then
//! try to actually connect using them, falling back from a direct dial
//! to a hole punch to relay forwarding.

use std::sync::Arc;

use dashmap::DashMap;
use dep_core::{DiscoverySource, Multiaddr, NodeId};
use dep_dht::DhtClient;
use dep_peerstore::Peerstore;
use dep_relay::AddressBook;
use dep_swarm::Swarm;
use dep_transport::Connection;
use tracing::{debug, instrument, warn};

use crate::error::{RealmError, RealmResult};
use crate::member_cache::MemberCache;

/// Addresses learned through member-sync gossip (§4.14.1 cascade step 2).
/// Kept separate from the Peerstore because gossip-sourced addresses are
/// realm-scoped and should disappear the moment the realm is left, while
/// the Peerstore is a node-wide cache with its own TTL policy.
#[derive(Default)]
pub struct MemberGossipCache {
    addrs: DashMap<NodeId, Vec<Multiaddr>>,
}

impl MemberGossipCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, node_id: NodeId, addrs: Vec<Multiaddr>) {
        self.addrs.insert(node_id, addrs);
    }

    pub fn get(&self, node_id: &NodeId) -> Vec<Multiaddr> {
        self.addrs.get(node_id).map(|a| a.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        self.addrs.clear();
    }
}

/// Result of the address resolution cascade (§4.14.1): either a set of
/// addresses worth dialing directly, or a bare signal that the target is
/// only reachable through the relay.
#[derive(Debug, Clone)]
pub struct ResolvedAddresses {
    pub addrs: Vec<Multiaddr>,
    pub relay_only: bool,
}

/// Attempt hole punching for a target once a direct dial has failed.
/// Backed in practice by [`dep_nat::holepunch::run_holepunch`] wired up
/// with a relay signaling channel; kept as a seam here so the connector
/// doesn't need to depend on a specific signaling transport.
#[async_trait::async_trait]
pub trait HolePunchProvider: Send + Sync {
    async fn try_hole_punch(&self, target: NodeId) -> RealmResult<Connection>;
}

/// Attempt to reach a target through the relay's forwarding circuit
/// (§4.9.3), available as long as both sides hold a reservation.
#[async_trait::async_trait]
pub trait RelayForwardProvider: Send + Sync {
    async fn try_relay_forward(&self, target: NodeId) -> RealmResult<Connection>;
}

/// The address resolution cascade (§4.14.1). Returns the first
/// non-empty result; a hit on the DHT is also cached back into the
/// Peerstore since it's the authoritative source.
#[instrument(skip(peerstore, gossip, dht, relay_addresses))]
pub async fn resolve_addresses(
    target: NodeId,
    peerstore: &Peerstore,
    gossip: &MemberGossipCache,
    dht: Option<&dyn DhtClient>,
    relay_addresses: Option<&AddressBook>,
) -> ResolvedAddresses {
    let cached = peerstore.addrs(&target);
    if !cached.is_empty() {
        debug!(%target, "resolved via peerstore cache");
        return ResolvedAddresses { addrs: cached, relay_only: false };
    }

    let gossiped = gossip.get(&target);
    if !gossiped.is_empty() {
        debug!(%target, "resolved via member-sync gossip");
        return ResolvedAddresses { addrs: gossiped, relay_only: false };
    }

    if let Some(dht) = dht {
        match dht.get_signed_peer_record(&target).await {
            Ok(Some(record)) if record.verify().is_ok() => {
                debug!(%target, "resolved via DHT signed record");
                for addr in record.addrs() {
                    peerstore.add_addr(target, addr.clone(), DiscoverySource::Dht);
                }
                return ResolvedAddresses {
                    addrs: record.addrs().to_vec(),
                    relay_only: false,
                };
            }
            Ok(Some(_)) => warn!(%target, "DHT record failed verification, ignoring"),
            Ok(None) => {}
            Err(e) => warn!(%target, error = %e, "DHT lookup failed"),
        }
    }

    if let Some(relay_addresses) = relay_addresses {
        if let Some(entry) = relay_addresses.query_address(&target) {
            debug!(%target, "resolved via relay address book (non-authoritative)");
            return ResolvedAddresses { addrs: entry.addrs, relay_only: false };
        }
    }

    debug!(%target, "no addresses resolved, falling back to relay-only dial");
    ResolvedAddresses { addrs: Vec::new(), relay_only: true }
}

/// Drives both cascades for `realm.connect(target)` (§4.14).
pub struct RealmConnector {
    swarm: Arc<Swarm>,
    member_cache: Arc<MemberCache>,
    gossip: MemberGossipCache,
    dht: Option<Arc<dyn DhtClient>>,
    relay_addresses: Option<Arc<AddressBook>>,
    hole_punch: Option<Arc<dyn HolePunchProvider>>,
    relay_forward: Option<Arc<dyn RelayForwardProvider>>,
}

impl RealmConnector {
    pub fn new(
        swarm: Arc<Swarm>,
        member_cache: Arc<MemberCache>,
        dht: Option<Arc<dyn DhtClient>>,
        relay_addresses: Option<Arc<AddressBook>>,
        hole_punch: Option<Arc<dyn HolePunchProvider>>,
        relay_forward: Option<Arc<dyn RelayForwardProvider>>,
    ) -> Self {
        Self {
            swarm,
            member_cache,
            gossip: MemberGossipCache::new(),
            dht,
            relay_addresses,
            hole_punch,
            relay_forward,
        }
    }

    pub fn gossip(&self) -> &MemberGossipCache {
        &self.gossip
    }

    /// `realm.connect(target)` (§4.14.2): the priority cascade. Only
    /// reachable through this Realm-scoped API, never via a bare-NodeID
    /// call on the underlying Swarm.
    #[instrument(skip(self))]
    pub async fn connect(&self, target: NodeId) -> RealmResult<Connection> {
        if !self.member_cache.is_member(&target) {
            return Err(RealmError::NotMember);
        }

        let resolved = resolve_addresses(
            target,
            self.swarm.peerstore(),
            &self.gossip,
            self.dht.as_deref(),
            self.relay_addresses.as_deref(),
        )
        .await;

        if !resolved.addrs.is_empty() {
            match self.swarm.dial_peer(target, &resolved.addrs).await {
                Ok(conn) => {
                    debug!(%target, "connected via direct dial");
                    return Ok(conn);
                }
                Err(e) => warn!(%target, error = %e, "direct dial failed, falling back"),
            }
        }

        if let Some(hole_punch) = &self.hole_punch {
            match hole_punch.try_hole_punch(target).await {
                Ok(conn) => {
                    debug!(%target, "connected via hole punch");
                    return Ok(conn);
                }
                Err(e) => warn!(%target, error = %e, "hole punch failed, falling back"),
            }
        }

        if let Some(relay_forward) = &self.relay_forward {
            return relay_forward.try_relay_forward(target).await.inspect(|_| {
                debug!(%target, "connected via relay forwarding");
            });
        }

        Err(RealmError::Unreachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dep_crypto::Identity;
    use dep_dht::MockDhtClient;
    use dep_dht::SignedPeerRecord;

    fn node(b: u8) -> NodeId {
        NodeId::from_public_key_bytes(&[b; 32])
    }

    fn addr(n: u16) -> Multiaddr {
        format!("/ip4/127.0.0.1/tcp/{n}").parse().unwrap()
    }

    #[tokio::test]
    async fn peerstore_hit_wins_over_everything_else() {
        let peerstore = Peerstore::new();
        let gossip = MemberGossipCache::new();
        let target = node(1);
        peerstore.add_addr(target, addr(1), DiscoverySource::PeerstoreLocal);
        gossip.record(target, vec![addr(2)]);

        let resolved = resolve_addresses(target, &peerstore, &gossip, None, None).await;
        assert_eq!(resolved.addrs, vec![addr(1)]);
        assert!(!resolved.relay_only);
    }

    #[tokio::test]
    async fn gossip_used_when_peerstore_is_empty() {
        let peerstore = Peerstore::new();
        let gossip = MemberGossipCache::new();
        let target = node(2);
        gossip.record(target, vec![addr(3)]);

        let resolved = resolve_addresses(target, &peerstore, &gossip, None, None).await;
        assert_eq!(resolved.addrs, vec![addr(3)]);
    }

    #[tokio::test]
    async fn dht_record_is_cached_into_peerstore() {
        let peerstore = Peerstore::new();
        let gossip = MemberGossipCache::new();
        let identity = Identity::generate();
        let target = identity.node_id();
        let dht = MockDhtClient::new();
        let record = SignedPeerRecord::sign(&identity, vec![addr(4)], 0);
        dht.put_signed_peer_record(record).await.unwrap();

        let resolved = resolve_addresses(target, &peerstore, &gossip, Some(&dht), None).await;
        assert_eq!(resolved.addrs, vec![addr(4)]);
        assert_eq!(peerstore.addrs(&target), vec![addr(4)]);
    }

    #[tokio::test]
    async fn relay_address_book_used_as_last_resort_hint() {
        let peerstore = Peerstore::new();
        let gossip = MemberGossipCache::new();
        let target = node(5);
        let book = AddressBook::new();
        book.register_self(target, vec![addr(6)], chrono::Utc::now() + chrono::Duration::hours(1));

        let resolved = resolve_addresses(target, &peerstore, &gossip, None, Some(&book)).await;
        assert_eq!(resolved.addrs, vec![addr(6)]);
    }

    #[tokio::test]
    async fn nothing_resolved_falls_back_to_relay_only() {
        let peerstore = Peerstore::new();
        let gossip = MemberGossipCache::new();
        let resolved = resolve_addresses(node(9), &peerstore, &gossip, None, None).await;
        assert!(resolved.addrs.is_empty());
        assert!(resolved.relay_only);
    }
}
