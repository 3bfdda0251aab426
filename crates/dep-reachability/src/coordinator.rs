//! The Reachability Coordinator (§4.7): the single gate between "an
//! address somebody mentioned" and "an address the DHT publisher or the
//! relay address book is allowed to advertise."

use std::sync::{Arc, Mutex};

use dep_core::{Multiaddr, NodeId};
use tracing::{info, instrument, warn};

use crate::autonat::{self, AutonatPeer, VALIDATION_WINDOW};
use crate::candidate::{Candidate, CandidateSource};
use crate::error::ReachabilityResult;

/// A network-level event that can change how much of our reachability
/// state is still trustworthy (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkChange {
    /// Minor: e.g. an address lease renewed. Re-probe, but don't discard
    /// what we already know.
    Minor,
    /// Major: e.g. the default route or the active interface changed.
    /// Every verified address is now suspect.
    Major,
}

pub struct ReachabilityCoordinator {
    candidates: Mutex<Vec<Candidate>>,
    verified: Mutex<Vec<Multiaddr>>,
    /// Addresses queued for re-probing by whatever drives the STUN/AutoNAT
    /// loop (the node composition root); drained via [`Self::drain_reprobe_queue`].
    reprobe_queue: Mutex<Vec<Multiaddr>>,
}

impl ReachabilityCoordinator {
    pub fn new() -> Self {
        Self {
            candidates: Mutex::new(Vec::new()),
            verified: Mutex::new(Vec::new()),
            reprobe_queue: Mutex::new(Vec::new()),
        }
    }

    /// `report_candidate` (§4.7): accept but mark unverified. Replaces any
    /// existing candidate record for the same address, resetting its TTL
    /// clock.
    #[instrument(skip(self))]
    pub fn report_candidate(&self, addr: Multiaddr, source: CandidateSource) {
        let mut candidates = self.candidates.lock().unwrap();
        if let Some(existing) = candidates.iter_mut().find(|c| c.addr == addr) {
            existing.source = source;
            existing.mark_reprobed();
        } else {
            candidates.push(Candidate::new(addr, source));
        }
    }

    /// `request_validation` (§4.7): run the AutoNAT dial-back quorum. On
    /// success the address is promoted into `verified_addrs()` and its
    /// candidate record is dropped; on failure it stays a candidate and
    /// its re-probe clock is reset so it doesn't immediately expire.
    #[instrument(skip(self, peers))]
    pub async fn request_validation(
        &self,
        addr: &Multiaddr,
        peers: &[(NodeId, Arc<dyn AutonatPeer>)],
    ) -> ReachabilityResult<bool> {
        let verified = autonat::run_validation(addr, peers, VALIDATION_WINDOW).await?;

        let mut candidates = self.candidates.lock().unwrap();
        if verified {
            candidates.retain(|c| &c.addr != addr);
            drop(candidates);
            let mut v = self.verified.lock().unwrap();
            if !v.contains(addr) {
                info!(%addr, "address verified");
                v.push(addr.clone());
            }
        } else if let Some(c) = candidates.iter_mut().find(|c| &c.addr == addr) {
            c.mark_reprobed();
        }

        Ok(verified)
    }

    /// The only list the DHT publisher and relay registration may consume.
    pub fn verified_addrs(&self) -> Vec<Multiaddr> {
        self.verified.lock().unwrap().clone()
    }

    pub fn candidate_addrs(&self) -> Vec<Multiaddr> {
        self.candidates.lock().unwrap().iter().map(|c| c.addr.clone()).collect()
    }

    /// `on_network_change` (§4.7).
    #[instrument(skip(self))]
    pub fn on_network_change(&self, change: NetworkChange) {
        match change {
            NetworkChange::Major => {
                warn!("major network change: invalidating all verified addresses");
                let mut verified = self.verified.lock().unwrap();
                let mut queue = self.reprobe_queue.lock().unwrap();
                queue.append(&mut verified);
                let candidate_addrs: Vec<Multiaddr> =
                    self.candidates.lock().unwrap().iter().map(|c| c.addr.clone()).collect();
                queue.extend(candidate_addrs);
            }
            NetworkChange::Minor => {
                let mut queue = self.reprobe_queue.lock().unwrap();
                queue.extend(self.verified.lock().unwrap().iter().cloned());
                queue.extend(self.candidate_addrs());
            }
        }
    }

    /// Drain and return everything queued for re-probing since the last call.
    pub fn drain_reprobe_queue(&self) -> Vec<Multiaddr> {
        std::mem::take(&mut self.reprobe_queue.lock().unwrap())
    }

    /// Drop candidates that have gone 5 minutes without a successful
    /// re-probe (§4.7). Call periodically from a housekeeping task.
    pub fn prune_expired_candidates(&self) {
        self.candidates.lock().unwrap().retain(|c| !c.is_expired());
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.lock().unwrap().len()
    }
}

impl Default for ReachabilityCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysReachable;
    #[async_trait::async_trait]
    impl AutonatPeer for AlwaysReachable {
        async fn dial_back(&self, _peer: NodeId, _addr: &Multiaddr) -> bool {
            true
        }
    }

    struct AlwaysUnreachable;
    #[async_trait::async_trait]
    impl AutonatPeer for AlwaysUnreachable {
        async fn dial_back(&self, _peer: NodeId, _addr: &Multiaddr) -> bool {
            false
        }
    }

    fn peer(b: u8) -> NodeId {
        NodeId::from_public_key_bytes(&[b; 32])
    }

    fn addr() -> Multiaddr {
        "/ip4/203.0.113.1/udp/4001/quic-v1".parse().unwrap()
    }

    #[test]
    fn reported_candidate_is_not_verified() {
        let coord = ReachabilityCoordinator::new();
        coord.report_candidate(addr(), CandidateSource::Stun);
        assert!(coord.verified_addrs().is_empty());
        assert_eq!(coord.candidate_addrs(), vec![addr()]);
    }

    #[tokio::test]
    async fn successful_validation_promotes_to_verified() {
        let coord = ReachabilityCoordinator::new();
        coord.report_candidate(addr(), CandidateSource::Stun);
        let peers: Vec<(NodeId, Arc<dyn AutonatPeer>)> = vec![
            (peer(1), Arc::new(AlwaysReachable)),
            (peer(2), Arc::new(AlwaysReachable)),
        ];

        let verified = coord.request_validation(&addr(), &peers).await.unwrap();
        assert!(verified);
        assert_eq!(coord.verified_addrs(), vec![addr()]);
        assert!(coord.candidate_addrs().is_empty());
    }

    #[tokio::test]
    async fn failed_validation_keeps_it_a_candidate() {
        let coord = ReachabilityCoordinator::new();
        coord.report_candidate(addr(), CandidateSource::Stun);
        let peers: Vec<(NodeId, Arc<dyn AutonatPeer>)> = vec![
            (peer(1), Arc::new(AlwaysUnreachable)),
            (peer(2), Arc::new(AlwaysUnreachable)),
        ];

        let verified = coord.request_validation(&addr(), &peers).await.unwrap();
        assert!(!verified);
        assert!(coord.verified_addrs().is_empty());
        assert_eq!(coord.candidate_addrs(), vec![addr()]);
    }

    #[tokio::test]
    async fn major_network_change_invalidates_verified_addrs() {
        let coord = ReachabilityCoordinator::new();
        coord.report_candidate(addr(), CandidateSource::Stun);
        let peers: Vec<(NodeId, Arc<dyn AutonatPeer>)> = vec![
            (peer(1), Arc::new(AlwaysReachable)),
            (peer(2), Arc::new(AlwaysReachable)),
        ];
        coord.request_validation(&addr(), &peers).await.unwrap();
        assert_eq!(coord.verified_addrs(), vec![addr()]);

        coord.on_network_change(NetworkChange::Major);
        assert!(coord.verified_addrs().is_empty());
        assert_eq!(coord.drain_reprobe_queue(), vec![addr()]);
    }

    #[test]
    fn minor_network_change_enqueues_without_clearing() {
        let coord = ReachabilityCoordinator::new();
        coord.report_candidate(addr(), CandidateSource::Upnp);
        coord.on_network_change(NetworkChange::Minor);
        assert_eq!(coord.candidate_addrs(), vec![addr()]);
        assert_eq!(coord.drain_reprobe_queue(), vec![addr()]);
    }
}
