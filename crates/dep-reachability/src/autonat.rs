//! AutoNAT dial-back validation (§4.7): ask N≥2 peers to dial a candidate
//! address back; it becomes verified once ≥K=2 report success inside the
//! validation window.

use std::time::Duration;

use dep_core::{Multiaddr, NodeId};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{ReachabilityError, ReachabilityResult};

/// How many peers must be asked and how many must agree, per §4.7.
pub const MIN_AUTONAT_PEERS: usize = 2;
pub const REQUIRED_SUCCESSES: usize = 2;
/// Default validation window.
pub const VALIDATION_WINDOW: Duration = Duration::from_secs(30);

/// A peer willing to attempt an AutoNAT dial-back. Implemented on top of
/// the swarm's dial machinery by the node composition root; kept as a
/// trait here so this crate never depends on dep-swarm directly.
#[async_trait::async_trait]
pub trait AutonatPeer: Send + Sync {
    /// Ask this peer to dial `addr` and report whether it could reach it.
    async fn dial_back(&self, peer: NodeId, addr: &Multiaddr) -> bool;
}

/// Run the dial-back quorum against `peers` for `addr`. Returns `Ok(true)`
/// if at least [`REQUIRED_SUCCESSES`] peers confirmed reachability inside
/// `window`, `Ok(false)` if the quorum was attempted but not reached, and
/// an error if fewer than [`MIN_AUTONAT_PEERS`] peers were available at all.
pub async fn run_validation(
    addr: &Multiaddr,
    peers: &[(NodeId, std::sync::Arc<dyn AutonatPeer>)],
    window: Duration,
) -> ReachabilityResult<bool> {
    if peers.len() < MIN_AUTONAT_PEERS {
        return Err(ReachabilityError::InsufficientAutonatPeers {
            needed: MIN_AUTONAT_PEERS,
            available: peers.len(),
        });
    }

    let mut set: JoinSet<bool> = JoinSet::new();
    for (peer_id, peer) in peers {
        let peer = std::sync::Arc::clone(peer);
        let peer_id = *peer_id;
        let addr = addr.clone();
        set.spawn(async move { peer.dial_back(peer_id, &addr).await });
    }

    let mut successes = 0usize;
    let deadline = tokio::time::Instant::now() + window;

    loop {
        if successes >= REQUIRED_SUCCESSES {
            set.abort_all();
            return Ok(true);
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() || set.is_empty() {
            break;
        }
        match tokio::time::timeout(remaining, set.join_next()).await {
            Ok(Some(Ok(true))) => successes += 1,
            Ok(Some(Ok(false))) => debug!(%addr, "dial-back reported unreachable"),
            Ok(Some(Err(e))) => warn!(error = %e, "autonat peer task failed"),
            Ok(None) => break,
            Err(_) => {
                warn!(%addr, "autonat validation window expired");
                break;
            }
        }
    }

    set.abort_all();
    Ok(successes >= REQUIRED_SUCCESSES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

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

    #[tokio::test]
    async fn quorum_reached_with_two_confirmations() {
        let addr: Multiaddr = "/ip4/203.0.113.1/udp/4001/quic-v1".parse().unwrap();
        let peers: Vec<(NodeId, Arc<dyn AutonatPeer>)> = vec![
            (peer(1), Arc::new(AlwaysReachable)),
            (peer(2), Arc::new(AlwaysReachable)),
        ];
        let verified = run_validation(&addr, &peers, Duration::from_secs(1)).await.unwrap();
        assert!(verified);
    }

    #[tokio::test]
    async fn quorum_not_reached_with_one_confirmation() {
        let addr: Multiaddr = "/ip4/203.0.113.1/udp/4001/quic-v1".parse().unwrap();
        let peers: Vec<(NodeId, Arc<dyn AutonatPeer>)> = vec![
            (peer(1), Arc::new(AlwaysReachable)),
            (peer(2), Arc::new(AlwaysUnreachable)),
        ];
        let verified = run_validation(&addr, &peers, Duration::from_secs(1)).await.unwrap();
        assert!(!verified);
    }

    #[tokio::test]
    async fn too_few_peers_is_an_error() {
        let addr: Multiaddr = "/ip4/203.0.113.1/udp/4001/quic-v1".parse().unwrap();
        let peers: Vec<(NodeId, Arc<dyn AutonatPeer>)> = vec![(peer(1), Arc::new(AlwaysReachable))];
        let err = run_validation(&addr, &peers, Duration::from_secs(1)).await.unwrap_err();
        matches!(err, ReachabilityError::InsufficientAutonatPeers { .. });
    }
}
