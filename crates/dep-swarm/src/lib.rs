//! # dep-swarm
//!
//! The heart of the connection layer (§4.5): a connection pool keyed by
//! `NodeId`, the DialPeer algorithm with address ranking and bounded
//! parallel dial attempts, the listen loop, and notifiee fan-out.
//! Everything below this crate (dep-transport, dep-connmgr,
//! dep-peerstore) is a collaborator; everything above it (dep-reachability,
//! dep-realm) is a client.

pub mod dial;
pub mod error;
pub mod listen;
pub mod notify;
pub mod pool;
pub mod rank;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dep_connmgr::ConnectionGater;
use dep_core::{Multiaddr, NodeId, ProtocolId};
use dep_peerstore::Peerstore;
use dep_transport::{negotiate_outbound, Connection, MuxedStream, TransportRegistry};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

pub use dial::{DialConfig, candidate_addrs};
pub use error::{AddrDialError, SwarmError, SwarmResult};
pub use notify::Notifiee;
pub use pool::{ConnectionPool, PoolCloser, PooledConnection};

/// The connection-layer facade every higher layer dials through.
pub struct Swarm {
    registry: Arc<TransportRegistry>,
    gater: Arc<dyn ConnectionGater>,
    peerstore: Arc<Peerstore>,
    pool: Arc<ConnectionPool>,
    notifiees: Mutex<Vec<Arc<dyn Notifiee>>>,
    dial_config: DialConfig,
    closed: AtomicBool,
    cancel: CancellationToken,
    listen_addrs: Mutex<Vec<Multiaddr>>,
}

impl Swarm {
    pub fn new(
        registry: Arc<TransportRegistry>,
        gater: Arc<dyn ConnectionGater>,
        peerstore: Arc<Peerstore>,
        dial_config: DialConfig,
    ) -> Self {
        Self {
            registry,
            gater,
            peerstore,
            pool: Arc::new(ConnectionPool::new()),
            notifiees: Mutex::new(Vec::new()),
            dial_config,
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            listen_addrs: Mutex::new(Vec::new()),
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn gater(&self) -> &Arc<dyn ConnectionGater> {
        &self.gater
    }

    pub fn peerstore(&self) -> &Arc<Peerstore> {
        &self.peerstore
    }

    pub async fn register_notifiee(&self, notifiee: Arc<dyn Notifiee>) {
        self.notifiees.lock().await.push(notifiee);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// DialPeer (§4.5.2). Notifies registered notifiees asynchronously
    /// without blocking the caller on their completion.
    #[instrument(skip(self, hints))]
    pub async fn dial_peer(&self, target: NodeId, hints: &[Multiaddr]) -> SwarmResult<Connection> {
        if self.is_closed() {
            return Err(SwarmError::Closed);
        }
        let (conn, is_new) = dial::dial_peer(
            &self.pool,
            &self.registry,
            &self.gater,
            &self.peerstore,
            target,
            hints,
            self.dial_config,
            self.cancel.child_token(),
        )
        .await?;

        if is_new {
            let notifiees = self.notifiees.lock().await.clone();
            let _ = notify::fan_out_connected(
                &notifiees,
                target,
                dep_core::Direction::Outbound,
                conn.remote_addr().clone(),
            );
        }

        Ok(conn)
    }

    /// NewStream (§4.5.5): dial (or reuse), open a muxed stream, negotiate
    /// the protocol, hand back a ready-to-use stream.
    pub async fn new_stream(
        &self,
        target: NodeId,
        hints: &[Multiaddr],
        protocol: &ProtocolId,
    ) -> SwarmResult<MuxedStream> {
        let conn = self.dial_peer(target, hints).await?;
        let mut stream = conn.open_stream().await?;
        negotiate_outbound(&mut stream, protocol)
            .await
            .map_err(|e| SwarmError::Transport(dep_transport::TransportError::Negotiation(e)))?;
        Ok(stream)
    }

    /// Start the listen loop for one already-bound transport registry
    /// address. Accepted connections are admitted through the gater
    /// pipeline and notified; callers receive them over `accepted` for
    /// protocol dispatch (e.g. running realm-auth or holepunch handlers).
    pub async fn listen(
        self: &Arc<Self>,
        addr: Multiaddr,
        accepted: mpsc::Sender<(NodeId, Connection)>,
    ) {
        self.listen_addrs.lock().await.push(addr.clone());
        let notifiees = self.notifiees.lock().await.clone();
        for n in &notifiees {
            n.listen(addr.clone()).await;
        }

        let registry = Arc::clone(&self.registry);
        let gater = Arc::clone(&self.gater);
        let pool = Arc::clone(&self.pool);
        let cancel = self.cancel.child_token();
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::channel(64);
            let loop_handle = tokio::spawn(listen::run_listen_loop(registry, gater, pool, tx, cancel));
            while let Some((peer, conn)) = rx.recv().await {
                let notifiees = this.notifiees.lock().await.clone();
                let _ = notify::fan_out_connected(
                    &notifiees,
                    peer,
                    dep_core::Direction::Inbound,
                    conn.remote_addr().clone(),
                );
                if accepted.send((peer, conn)).await.is_err() {
                    break;
                }
            }
            let _ = loop_handle.await;
        });
    }

    /// Close (§4.5.6): refuse new operations, close listeners and
    /// connections, wait for notifier drains.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("swarm closing");
        self.cancel.cancel();

        let peers: Vec<NodeId> = self.pool.connected_peers();
        self.pool.close_all().await;

        let notifiees = self.notifiees.lock().await.clone();
        let mut handles = Vec::new();
        for peer in peers {
            handles.extend(notify::fan_out_disconnected(&notifiees, peer));
        }
        for h in handles {
            let _ = h.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dep_connmgr::DefaultGater;

    fn peer(b: u8) -> NodeId {
        NodeId::from_public_key_bytes(&[b; 32])
    }

    #[tokio::test]
    async fn dial_peer_with_no_addresses_fails_fast() {
        let identity = dep_crypto::Identity::generate();
        let listen_addr: Multiaddr = "/ip4/127.0.0.1/udp/0/quic-v1".parse().unwrap();
        let registry = Arc::new(
            TransportRegistry::new(Arc::new(identity), &listen_addr)
                .await
                .unwrap(),
        );
        let swarm = Swarm::new(
            registry,
            Arc::new(DefaultGater::new()),
            Arc::new(Peerstore::new()),
            DialConfig::default(),
        );

        let err = swarm.dial_peer(peer(1), &[]).await.unwrap_err();
        matches!(err, SwarmError::NoAddresses { .. });
    }

    #[tokio::test]
    async fn dial_peer_to_blocked_peer_is_denied() {
        let identity = dep_crypto::Identity::generate();
        let listen_addr: Multiaddr = "/ip4/127.0.0.1/udp/0/quic-v1".parse().unwrap();
        let registry = Arc::new(
            TransportRegistry::new(Arc::new(identity), &listen_addr)
                .await
                .unwrap(),
        );
        let gater = Arc::new(DefaultGater::new());
        let target = peer(2);
        gater.block_peer(target);

        let swarm = Swarm::new(registry, gater, Arc::new(Peerstore::new()), DialConfig::default());
        let hint: Multiaddr = "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap();
        let err = swarm.dial_peer(target, &[hint]).await.unwrap_err();
        matches!(err, SwarmError::GaterDenied { .. });
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let identity = dep_crypto::Identity::generate();
        let listen_addr: Multiaddr = "/ip4/127.0.0.1/udp/0/quic-v1".parse().unwrap();
        let registry = Arc::new(
            TransportRegistry::new(Arc::new(identity), &listen_addr)
                .await
                .unwrap(),
        );
        let swarm = Swarm::new(
            registry,
            Arc::new(DefaultGater::new()),
            Arc::new(Peerstore::new()),
            DialConfig::default(),
        );
        swarm.close().await;
        swarm.close().await;
        assert!(swarm.is_closed());
    }
}
