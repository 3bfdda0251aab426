//! DialPeer (§4.5.2): connection reuse, address assembly/ranking, bounded
//! parallel dial attempts, install-the-winner, best-effort notify.
//!
//! No duplicate-dial deduplication in v1.0 (documented in the spec as
//! acceptable): two concurrent `dial_peer` calls for the same target may
//! each spawn their own worker set; whichever installs first wins the
//! race, the other's connection is simply closed. `dialSync` / blackhole
//! detection are explicitly out of scope.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dep_core::{Direction, Multiaddr, NodeId};
use dep_connmgr::ConnectionGater;
use dep_peerstore::Peerstore;
use dep_transport::{Connection, TransportRegistry};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{AddrDialError, SwarmError, SwarmResult};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::rank::rank_addrs;

#[derive(Debug, Clone, Copy)]
pub struct DialConfig {
    /// Upper bound on concurrently in-flight dial attempts for one
    /// `dial_peer` call (§4.5.2 step 4).
    pub max_parallel_dials: usize,
    /// Overall dial timeout (§5); local-network dials may use a shorter
    /// one at the caller's discretion.
    pub dial_timeout: Duration,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            max_parallel_dials: 8,
            dial_timeout: Duration::from_secs(30),
        }
    }
}

/// Assemble the candidate address set for `target`: caller-supplied
/// addresses unioned with whatever the Peerstore already knows (§4.5.2
/// step 2). The Realm Connector resolver (dep-realm) contributes further
/// sources before calling in.
pub fn candidate_addrs(peerstore: &Peerstore, target: &NodeId, hints: &[Multiaddr]) -> Vec<Multiaddr> {
    let mut seen = HashSet::new();
    let mut addrs = Vec::new();
    for addr in hints.iter().cloned().chain(peerstore.addrs(target)) {
        if seen.insert(addr.clone()) {
            addrs.push(addr);
        }
    }
    addrs
}

/// Execute the full DialPeer algorithm. Returns a reused connection
/// immediately if one is already healthy in `pool`.
#[instrument(skip(pool, registry, gater, peerstore, cancel), fields(peer = %target))]
pub async fn dial_peer(
    pool: &ConnectionPool,
    registry: &Arc<TransportRegistry>,
    gater: &Arc<dyn ConnectionGater>,
    peerstore: &Peerstore,
    target: NodeId,
    hints: &[Multiaddr],
    config: DialConfig,
    cancel: CancellationToken,
) -> SwarmResult<(Connection, bool)> {
    if let Some(existing) = pool.healthy_connection(&target) {
        debug!("reusing existing connection");
        return Ok((existing, false));
    }

    if !gater.intercept_peer_dial(&target) {
        return Err(SwarmError::GaterDenied {
            peer: target,
            reason: dep_connmgr::DenyReason::BlockedPeer,
        });
    }

    let addrs = candidate_addrs(peerstore, &target, hints);
    if addrs.is_empty() {
        return Err(SwarmError::NoAddresses { peer: target });
    }

    let gated: Vec<Multiaddr> = addrs
        .into_iter()
        .filter(|a| gater.intercept_addr_dial(&target, a))
        .collect();
    if gated.is_empty() {
        return Err(SwarmError::GaterDenied {
            peer: target,
            reason: dep_connmgr::DenyReason::BlockedAddr,
        });
    }

    let ranked = rank_addrs(gated, |_| peerstore.observed_rtt(&target));
    let attempts = ranked.len();

    let conn = race_dials(registry, target, ranked, config, cancel).await?;

    let pooled = PooledConnection {
        conn_id: pool.next_conn_id(),
        connection: conn.clone(),
        direction: Direction::Outbound,
        opened_at: Instant::now(),
    };
    pool.insert(target, pooled);

    debug!(attempts, "dial succeeded");
    Ok((conn, true))
}

/// Spawn one dial worker per address, bounded by `max_parallel_dials`.
/// The first successful upgrade wins; on a tie within the same scheduler
/// tick, the lower rank index (i.e. earlier in `addrs`) wins, which falls
/// out naturally from `JoinSet::join_next` returning completion order.
async fn race_dials(
    registry: &Arc<TransportRegistry>,
    target: NodeId,
    addrs: Vec<Multiaddr>,
    config: DialConfig,
    cancel: CancellationToken,
) -> SwarmResult<Connection> {
    let mut set: JoinSet<(Multiaddr, Result<Connection, String>)> = JoinSet::new();
    let mut pending = addrs.into_iter();
    let mut errors = Vec::new();
    let mut in_flight = 0usize;

    let spawn_next = |set: &mut JoinSet<_>, pending: &mut std::vec::IntoIter<Multiaddr>| -> bool {
        let Some(addr) = pending.next() else {
            return false;
        };
        let registry = Arc::clone(registry);
        let timeout = config.dial_timeout;
        set.spawn(async move {
            let result = dial_one(&registry, addr.clone(), target, timeout).await;
            (addr, result)
        });
        true
    };

    while in_flight < config.max_parallel_dials {
        if spawn_next(&mut set, &mut pending) {
            in_flight += 1;
        } else {
            break;
        }
    }

    loop {
        if set.is_empty() {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                set.abort_all();
                return Err(SwarmError::Cancelled { peer: target });
            }
            joined = set.join_next() => {
                let Some(joined) = joined else { break };
                in_flight -= 1;
                match joined {
                    Ok((addr, Ok(conn))) => {
                        set.abort_all();
                        let _ = addr;
                        return Ok(conn);
                    }
                    Ok((addr, Err(reason))) => {
                        warn!(%addr, %reason, "dial attempt failed");
                        errors.push(AddrDialError { addr: addr.to_string(), reason });
                    }
                    Err(join_err) => {
                        errors.push(AddrDialError {
                            addr: "<unknown>".into(),
                            reason: join_err.to_string(),
                        });
                    }
                }
                if spawn_next(&mut set, &mut pending) {
                    in_flight += 1;
                }
            }
        }
    }

    Err(SwarmError::DialFailed {
        peer: target,
        attempts: errors.len(),
        sub_errors: errors,
    })
}

async fn dial_one(
    registry: &TransportRegistry,
    addr: Multiaddr,
    target: NodeId,
    timeout: Duration,
) -> Result<Connection, String> {
    match tokio::time::timeout(timeout, registry.dial(&addr, target)).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("dial timed out".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_addrs_dedupes_hints_and_peerstore() {
        let store = Peerstore::new();
        let peer = NodeId::from_public_key_bytes(&[1u8; 32]);
        let addr: Multiaddr = "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap();
        store.add_addr(peer, addr.clone(), dep_core::DiscoverySource::Manual);

        let addrs = candidate_addrs(&store, &peer, &[addr.clone()]);
        assert_eq!(addrs, vec![addr]);
    }

    #[test]
    fn candidate_addrs_empty_when_nothing_known() {
        let store = Peerstore::new();
        let peer = NodeId::from_public_key_bytes(&[2u8; 32]);
        assert!(candidate_addrs(&store, &peer, &[]).is_empty());
    }
}
