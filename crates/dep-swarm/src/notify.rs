//! Notifiee fan-out (§4.5.1, §5): callbacks fire asynchronously and in no
//! defined order, each on its own task, so a slow or misbehaving listener
//! can never block the pool. The snapshot-then-release pattern (§5
//! "Deadlock avoidance") means fan-out never happens while a pool lock is
//! held — `Swarm` builds the notifiee list once at construction and hands
//! out clones of the `Arc`.

use std::sync::Arc;

use dep_core::{Direction, Multiaddr, NodeId};

/// Connection lifecycle events a `Notifiee` can observe. Mirrors the
/// libp2p `Notifiee` interface: connected/disconnected plus listener
/// lifecycle, so higher layers (Realm Manager, metrics) can react without
/// the Swarm knowing anything about them.
#[async_trait::async_trait]
pub trait Notifiee: Send + Sync {
    async fn connected(&self, peer: NodeId, direction: Direction, remote_addr: Multiaddr) {
        let _ = (peer, direction, remote_addr);
    }

    async fn disconnected(&self, peer: NodeId) {
        let _ = peer;
    }

    async fn listen(&self, addr: Multiaddr) {
        let _ = addr;
    }

    async fn listen_close(&self, addr: Multiaddr) {
        let _ = addr;
    }
}

/// Fans `event` out to every notifiee on its own spawned task. Returns
/// immediately once all tasks are spawned; callers that need to observe
/// completion (e.g. `Swarm::close`) await the join handles themselves.
pub fn fan_out_connected(
    notifiees: &[Arc<dyn Notifiee>],
    peer: NodeId,
    direction: Direction,
    remote_addr: Multiaddr,
) -> Vec<tokio::task::JoinHandle<()>> {
    notifiees
        .iter()
        .cloned()
        .map(|n| {
            let remote_addr = remote_addr.clone();
            tokio::spawn(async move {
                n.connected(peer, direction, remote_addr).await;
            })
        })
        .collect()
}

pub fn fan_out_disconnected(notifiees: &[Arc<dyn Notifiee>], peer: NodeId) -> Vec<tokio::task::JoinHandle<()>> {
    notifiees
        .iter()
        .cloned()
        .map(|n| tokio::spawn(async move { n.disconnected(peer).await }))
        .collect()
}
