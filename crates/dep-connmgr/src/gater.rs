//! Connection gater (§4.6.3): five interception points the swarm's dial
//! and accept pipelines call through before committing resources to a
//! peer. Any deny closes the raw socket immediately; no work happens past
//! the first rejection.

use std::collections::HashSet;
use std::sync::RwLock;

use dep_core::{Direction, Multiaddr, NodeId};

/// Why a gater denied a connection, surfaced only by `intercept_upgraded`
/// per §4.6.3 (the other four points are plain allow/deny).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    BlockedPeer,
    BlockedAddr,
    ResourceLimit,
}

pub trait ConnectionGater: Send + Sync {
    fn intercept_peer_dial(&self, peer: &NodeId) -> bool;
    fn intercept_addr_dial(&self, peer: &NodeId, addr: &Multiaddr) -> bool;
    fn intercept_accept(&self, addr: &Multiaddr) -> bool;
    fn intercept_secured(&self, direction: Direction, peer: &NodeId, addr: &Multiaddr) -> bool;
    fn intercept_upgraded(&self, peer: &NodeId) -> Result<(), DenyReason>;
}

/// Default gater: a single blocked-peer set plus a blocked-address-prefix
/// set, both behind a read/write mutex. Intended to be easily replaced by
/// embedders with a more elaborate policy.
#[derive(Default)]
pub struct DefaultGater {
    blocked_peers: RwLock<HashSet<NodeId>>,
    blocked_addrs: RwLock<HashSet<Multiaddr>>,
}

impl DefaultGater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_peer(&self, peer: NodeId) {
        self.blocked_peers.write().unwrap().insert(peer);
    }

    pub fn unblock_peer(&self, peer: &NodeId) {
        self.blocked_peers.write().unwrap().remove(peer);
    }

    pub fn block_addr(&self, addr: Multiaddr) {
        self.blocked_addrs.write().unwrap().insert(addr);
    }

    pub fn unblock_addr(&self, addr: &Multiaddr) {
        self.blocked_addrs.write().unwrap().remove(addr);
    }

    fn peer_blocked(&self, peer: &NodeId) -> bool {
        self.blocked_peers.read().unwrap().contains(peer)
    }

    fn addr_blocked(&self, addr: &Multiaddr) -> bool {
        self.blocked_addrs.read().unwrap().contains(addr)
    }
}

impl ConnectionGater for DefaultGater {
    fn intercept_peer_dial(&self, peer: &NodeId) -> bool {
        !self.peer_blocked(peer)
    }

    fn intercept_addr_dial(&self, peer: &NodeId, addr: &Multiaddr) -> bool {
        !self.peer_blocked(peer) && !self.addr_blocked(addr)
    }

    fn intercept_accept(&self, addr: &Multiaddr) -> bool {
        !self.addr_blocked(addr)
    }

    fn intercept_secured(&self, _direction: Direction, peer: &NodeId, addr: &Multiaddr) -> bool {
        !self.peer_blocked(peer) && !self.addr_blocked(addr)
    }

    fn intercept_upgraded(&self, peer: &NodeId) -> Result<(), DenyReason> {
        if self.peer_blocked(peer) {
            return Err(DenyReason::BlockedPeer);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(b: u8) -> NodeId {
        NodeId::from_public_key_bytes(&[b; 32])
    }

    fn addr() -> Multiaddr {
        "/ip4/127.0.0.1/tcp/4001".parse().unwrap()
    }

    #[test]
    fn unblocked_peer_passes_every_point() {
        let gater = DefaultGater::new();
        let p = peer(1);
        let a = addr();
        assert!(gater.intercept_peer_dial(&p));
        assert!(gater.intercept_addr_dial(&p, &a));
        assert!(gater.intercept_accept(&a));
        assert!(gater.intercept_secured(Direction::Outbound, &p, &a));
        assert!(gater.intercept_upgraded(&p).is_ok());
    }

    #[test]
    fn blocked_peer_fails_every_peer_aware_point() {
        let gater = DefaultGater::new();
        let p = peer(2);
        let a = addr();
        gater.block_peer(p);
        assert!(!gater.intercept_peer_dial(&p));
        assert!(!gater.intercept_addr_dial(&p, &a));
        assert!(!gater.intercept_secured(Direction::Inbound, &p, &a));
        assert_eq!(gater.intercept_upgraded(&p), Err(DenyReason::BlockedPeer));
    }

    #[test]
    fn blocked_addr_fails_accept_and_addr_dial() {
        let gater = DefaultGater::new();
        let p = peer(3);
        let a = addr();
        gater.block_addr(a.clone());
        assert!(!gater.intercept_accept(&a));
        assert!(!gater.intercept_addr_dial(&p, &a));
        assert!(gater.intercept_peer_dial(&p));
    }

    #[test]
    fn unblock_restores_access() {
        let gater = DefaultGater::new();
        let p = peer(4);
        gater.block_peer(p);
        gater.unblock_peer(&p);
        assert!(gater.intercept_peer_dial(&p));
    }
}
