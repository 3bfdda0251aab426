//! # dep-peerstore
//!
//! A concurrent `NodeId -> PeerInfo` map (§4.11). Addresses are tagged
//! with the source that reported them; each source has its own TTL, and
//! stale entries are dropped lazily on lookup rather than swept by a
//! background task.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dep_core::{DiscoverySource, Multiaddr, NodeId};

/// Default TTL per discovery source, applied when a caller doesn't
/// override it with [`Peerstore::with_ttl`].
fn default_ttl(source: DiscoverySource) -> Duration {
    match source {
        DiscoverySource::PeerstoreLocal => Duration::from_secs(24 * 3600),
        DiscoverySource::MemberList => Duration::from_secs(3600),
        DiscoverySource::Dht => Duration::from_secs(6 * 3600),
        DiscoverySource::Relay => Duration::from_secs(30 * 60),
        DiscoverySource::Mdns => Duration::from_secs(5 * 60),
        DiscoverySource::Manual => Duration::from_secs(365 * 24 * 3600),
    }
}

#[derive(Debug, Clone)]
pub struct AddrRecord {
    pub addr: Multiaddr,
    pub source: DiscoverySource,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PeerInfo {
    pub addrs: Vec<AddrRecord>,
    pub observed_rtt: Option<Duration>,
}

pub struct Peerstore {
    peers: DashMap<NodeId, PeerInfo>,
    ttls: DashMap<DiscoverySource, Duration>,
}

impl Peerstore {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            ttls: DashMap::new(),
        }
    }

    /// Override the default TTL for a discovery source.
    pub fn with_ttl(self, source: DiscoverySource, ttl: Duration) -> Self {
        self.ttls.insert(source, ttl);
        self
    }

    fn ttl_for(&self, source: DiscoverySource) -> Duration {
        self.ttls
            .get(&source)
            .map(|t| *t)
            .unwrap_or_else(|| default_ttl(source))
    }

    /// Record that `addr` was observed for `peer` via `source`. Replaces
    /// any existing record for the same `(peer, addr)` pair, refreshing
    /// `last_seen`.
    pub fn add_addr(&self, peer: NodeId, addr: Multiaddr, source: DiscoverySource) {
        self.add_addr_at(peer, addr, source, Utc::now());
    }

    fn add_addr_at(
        &self,
        peer: NodeId,
        addr: Multiaddr,
        source: DiscoverySource,
        now: DateTime<Utc>,
    ) {
        let mut entry = self.peers.entry(peer).or_default();
        if let Some(existing) = entry.addrs.iter_mut().find(|r| r.addr == addr) {
            existing.last_seen = now;
            existing.source = source;
        } else {
            entry.addrs.push(AddrRecord {
                addr,
                source,
                last_seen: now,
            });
        }
    }

    pub fn set_observed_rtt(&self, peer: NodeId, rtt: Duration) {
        self.peers.entry(peer).or_default().observed_rtt = Some(rtt);
    }

    pub fn observed_rtt(&self, peer: &NodeId) -> Option<Duration> {
        self.peers.get(peer).and_then(|p| p.observed_rtt)
    }

    /// Addresses for `peer`, with entries older than their source's TTL
    /// dropped. Mutates the stored record so repeated lookups don't keep
    /// re-checking addresses that have already expired.
    pub fn addrs(&self, peer: &NodeId) -> Vec<Multiaddr> {
        self.addrs_at(peer, Utc::now())
    }

    fn addrs_at(&self, peer: &NodeId, now: DateTime<Utc>) -> Vec<Multiaddr> {
        let Some(mut entry) = self.peers.get_mut(peer) else {
            return Vec::new();
        };
        entry.addrs.retain(|r| {
            let ttl = self.ttl_for(r.source);
            (now - r.last_seen).to_std().unwrap_or(Duration::ZERO) <= ttl
        });
        entry.addrs.iter().map(|r| r.addr.clone()).collect()
    }

    pub fn remove_peer(&self, peer: &NodeId) {
        self.peers.remove(peer);
    }

    pub fn known_peers(&self) -> Vec<NodeId> {
        self.peers.iter().map(|e| *e.key()).collect()
    }
}

impl Default for Peerstore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn addr(n: u16) -> Multiaddr {
        format!("/ip4/127.0.0.1/tcp/{n}").parse().unwrap()
    }

    fn peer(b: u8) -> NodeId {
        NodeId::from_public_key_bytes(&[b; 32])
    }

    #[test]
    fn add_and_lookup_addr() {
        let store = Peerstore::new();
        let p = peer(1);
        store.add_addr(p, addr(4001), DiscoverySource::Manual);
        assert_eq!(store.addrs(&p), vec![addr(4001)]);
    }

    #[test]
    fn unknown_peer_has_no_addrs() {
        let store = Peerstore::new();
        assert!(store.addrs(&peer(9)).is_empty());
    }

    #[test]
    fn duplicate_addr_refreshes_instead_of_duplicating() {
        let store = Peerstore::new();
        let p = peer(2);
        store.add_addr(p, addr(1), DiscoverySource::Dht);
        store.add_addr(p, addr(1), DiscoverySource::Dht);
        assert_eq!(store.addrs(&p).len(), 1);
    }

    #[test]
    fn expired_addr_is_dropped_on_lookup() {
        let store = Peerstore::new().with_ttl(DiscoverySource::Mdns, Duration::from_secs(60));
        let p = peer(3);
        let old = Utc::now() - TimeDelta::seconds(120);
        store.add_addr_at(p, addr(1), DiscoverySource::Mdns, old);
        assert!(store.addrs(&p).is_empty());
    }

    #[test]
    fn observed_rtt_round_trips() {
        let store = Peerstore::new();
        let p = peer(4);
        store.set_observed_rtt(p, Duration::from_millis(42));
        assert_eq!(store.observed_rtt(&p), Some(Duration::from_millis(42)));
    }
}
