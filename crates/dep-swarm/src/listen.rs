//! Listen loop (§4.5.4): accept raw connections and run every one through
//! the gater pipeline before installing it. Any rejection at any point
//! closes the socket immediately and does no further work.

use std::sync::Arc;

use dep_connmgr::ConnectionGater;
use dep_core::{Direction, NodeId};
use dep_transport::{Connection, TransportRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::pool::{ConnectionPool, PooledConnection};

/// Run `Gater.intercept_secured` / `intercept_upgraded` against an
/// already-upgraded inbound connection (the transport layer has already
/// performed the equivalent of `intercept_accept`'s raw-socket check
/// implicitly by completing the handshake; §4.5.4's `intercept_accept`
/// point is enforced by the caller before even accepting the raw socket,
/// which for QUIC/TCP listeners here means gating on the remote address
/// as soon as it is known).
pub fn admit_inbound(gater: &Arc<dyn ConnectionGater>, conn: &Connection) -> Result<(), dep_connmgr::DenyReason> {
    let peer = conn.remote_node_id();
    let addr = conn.remote_addr();
    if !gater.intercept_accept(addr) {
        return Err(dep_connmgr::DenyReason::BlockedAddr);
    }
    if !gater.intercept_secured(Direction::Inbound, &peer, addr) {
        return Err(dep_connmgr::DenyReason::BlockedPeer);
    }
    gater.intercept_upgraded(&peer)
}

/// Accept loop for one transport registry. Installs admitted connections
/// into `pool` and returns the accepted `(peer, Connection)` over
/// `accepted`, so the Swarm can notify and hand the event onward (e.g. to
/// protocol-stream handlers) without this loop knowing about them.
pub async fn run_listen_loop(
    registry: Arc<TransportRegistry>,
    gater: Arc<dyn ConnectionGater>,
    pool: Arc<ConnectionPool>,
    accepted: tokio::sync::mpsc::Sender<(NodeId, Connection)>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("listen loop cancelled");
                return;
            }
            result = registry.accept() => {
                match result {
                    Ok(conn) => handle_accepted(&gater, &pool, &accepted, conn).await,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}

async fn handle_accepted(
    gater: &Arc<dyn ConnectionGater>,
    pool: &Arc<ConnectionPool>,
    accepted: &tokio::sync::mpsc::Sender<(NodeId, Connection)>,
    conn: Connection,
) {
    let peer = conn.remote_node_id();
    if let Err(reason) = admit_inbound(gater, &conn) {
        debug!(%peer, ?reason, "inbound connection rejected by gater");
        conn.close().await;
        return;
    }

    let pooled = PooledConnection {
        conn_id: pool.next_conn_id(),
        connection: conn.clone(),
        direction: Direction::Inbound,
        opened_at: std::time::Instant::now(),
    };
    pool.insert(peer, pooled);

    if accepted.send((peer, conn)).await.is_err() {
        debug!("accepted-connection channel closed");
    }
}
