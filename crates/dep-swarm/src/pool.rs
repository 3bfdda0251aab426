//! Connection pool (§4.5.1): a read-write-guarded `NodeId -> [Connection]`
//! map. Only the Swarm mutates it; everyone else reads through
//! [`ConnectionPool::connections_of`] / [`ConnectionPool::all`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use dep_connmgr::{ConnSnapshot, ConnectionCloser};
use dep_core::{Direction, NodeId};
use dep_transport::Connection;

/// A pooled connection plus the bookkeeping the Connection Manager needs
/// to score it for trimming (§4.6.2) without reaching into the transport.
pub struct PooledConnection {
    pub conn_id: u64,
    pub connection: Connection,
    pub direction: Direction,
    pub opened_at: Instant,
}

impl PooledConnection {
    pub fn is_healthy(&self) -> bool {
        !self.connection.is_closed()
    }
}

/// `NodeId -> [PooledConnection]`. Multiple concurrent connections per
/// peer are permitted (e.g. QUIC and TCP simultaneously).
#[derive(Default)]
pub struct ConnectionPool {
    by_peer: DashMap<NodeId, Vec<PooledConnection>>,
    next_id: AtomicU64,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_conn_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// A healthy existing connection for `peer`, if any (dial-peer step 1,
    /// §4.5.2: connection reuse).
    pub fn healthy_connection(&self, peer: &NodeId) -> Option<Connection> {
        self.by_peer.get(peer).and_then(|conns| {
            conns
                .iter()
                .find(|c| c.is_healthy())
                .map(|c| c.connection.clone())
        })
    }

    pub fn insert(&self, peer: NodeId, pooled: PooledConnection) {
        self.by_peer.entry(peer).or_default().push(pooled);
    }

    pub fn remove(&self, peer: &NodeId, conn_id: u64) {
        if let Some(mut conns) = self.by_peer.get_mut(peer) {
            conns.retain(|c| c.conn_id != conn_id);
        }
    }

    pub fn stream_count(&self, peer: &NodeId) -> usize {
        self.by_peer.get(peer).map(|c| c.len()).unwrap_or(0)
    }

    pub fn total_connections(&self) -> usize {
        self.by_peer.iter().map(|e| e.value().len()).sum()
    }

    pub fn connected_peers(&self) -> Vec<NodeId> {
        self.by_peer
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| *e.key())
            .collect()
    }

    /// Close and remove every connection in the pool.
    pub async fn close_all(&self) {
        let peers: Vec<NodeId> = self.by_peer.iter().map(|e| *e.key()).collect();
        for peer in peers {
            if let Some((_, conns)) = self.by_peer.remove(&peer) {
                for pooled in conns {
                    pooled.connection.close().await;
                }
            }
        }
    }

    /// A snapshot of every currently open connection, in the shape the
    /// connection manager's trim algorithm (§4.6.2) scores against.
    pub fn snapshot(&self) -> Vec<ConnSnapshot> {
        self.by_peer
            .iter()
            .flat_map(|entry| {
                let peer = *entry.key();
                entry.value().iter().map(move |pooled| ConnSnapshot {
                    conn_id: pooled.conn_id,
                    peer,
                    direction: pooled.direction,
                    opened_at: pooled.opened_at,
                    stream_count: 0,
                })
            })
            .collect()
    }

    /// Close and remove the single connection identified by `conn_id`,
    /// wherever in the pool it lives. Used by [`PoolCloser`].
    pub async fn close_by_id(&self, conn_id: u64) {
        let target = self.by_peer.iter().find_map(|entry| {
            entry
                .value()
                .iter()
                .find(|c| c.conn_id == conn_id)
                .map(|c| (*entry.key(), c.connection.clone()))
        });
        let Some((peer, connection)) = target else {
            return;
        };
        connection.close().await;
        self.remove(&peer, conn_id);
    }
}

/// Adapts [`ConnectionPool`] to the [`ConnectionCloser`] seam the
/// connection manager's trim loop closes connections through (§4.6.2).
pub struct PoolCloser(pub Arc<ConnectionPool>);

#[async_trait::async_trait]
impl ConnectionCloser for PoolCloser {
    async fn close(&self, conn_id: u64) {
        self.0.close_by_id(conn_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(b: u8) -> NodeId {
        NodeId::from_public_key_bytes(&[b; 32])
    }

    #[test]
    fn empty_pool_has_no_connections() {
        let pool = ConnectionPool::new();
        assert!(pool.healthy_connection(&peer(1)).is_none());
        assert_eq!(pool.total_connections(), 0);
    }

    #[test]
    fn conn_ids_are_unique() {
        let pool = ConnectionPool::new();
        let a = pool.next_conn_id();
        let b = pool.next_conn_id();
        assert_ne!(a, b);
    }
}
