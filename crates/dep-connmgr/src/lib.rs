//! # dep-connmgr
//!
//! Connection tagging/protection, water-mark-based trimming, and the
//! five-point connection gater (§4.6). This crate knows nothing about
//! transports or sockets: the swarm feeds it connection snapshots and
//! closes whatever ids [`trim_open_conns`] returns.

pub mod error;
pub mod gater;
pub mod tagging;
pub mod trim;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

pub use error::{ConnMgrError, ConnMgrResult};
pub use gater::{ConnectionGater, DefaultGater, DenyReason};
pub use tagging::{TagBook, TAG_BOOTSTRAP, TAG_DHT_ROUTING, TAG_REALM_MEMBER, TAG_RELAY_ACTIVE};
pub use trim::{trim_open_conns, ConnSnapshot, WaterMarks};

/// How often the background loop checks whether trimming is needed.
const TRIM_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Closes connections by id on behalf of [`ConnectionManager::run_trim_loop`].
/// Implemented by whoever owns the actual connection pool (the swarm).
#[async_trait::async_trait]
pub trait ConnectionCloser: Send + Sync {
    async fn close(&self, conn_id: u64);
}

/// Ties tagging, protection and the gater together behind one handle that
/// the swarm holds for the lifetime of the node.
pub struct ConnectionManager {
    tags: TagBook,
    marks: WaterMarks,
    gater: Arc<dyn ConnectionGater>,
}

impl ConnectionManager {
    pub fn new(marks: WaterMarks, gater: Arc<dyn ConnectionGater>) -> Self {
        Self {
            tags: TagBook::new(),
            marks,
            gater,
        }
    }

    pub fn tags(&self) -> &TagBook {
        &self.tags
    }

    pub fn gater(&self) -> &Arc<dyn ConnectionGater> {
        &self.gater
    }

    pub fn water_marks(&self) -> WaterMarks {
        self.marks
    }

    /// Evaluate the trimming algorithm against a snapshot of currently
    /// open connections, without closing anything.
    pub fn candidates_to_trim(&self, connections: &[ConnSnapshot]) -> Vec<u64> {
        trim_open_conns(connections, &self.tags, &self.marks, std::time::Instant::now())
    }

    /// Runs until `cancel` fires. On each tick, if the pool is above
    /// `high_water`, asks `snapshot` for the current connections and
    /// closes whatever `trim_open_conns` selects via `closer`. A best
    /// effort loop per §4.6.2 step 5: a failed close doesn't abort the
    /// run, only cancellation does.
    #[instrument(skip_all)]
    pub async fn run_trim_loop(
        &self,
        snapshot: impl Fn() -> Vec<ConnSnapshot>,
        closer: Arc<dyn ConnectionCloser>,
        cancel: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(TRIM_CHECK_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("trim loop cancelled");
                    return;
                }
                _ = interval.tick() => {
                    let connections = snapshot();
                    if connections.len() <= self.marks.high_water {
                        continue;
                    }
                    let to_close = self.candidates_to_trim(&connections);
                    debug!(count = to_close.len(), "trimming connections");
                    for conn_id in to_close {
                        if cancel.is_cancelled() {
                            return;
                        }
                        closer.close(conn_id).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dep_core::{Direction, NodeId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tokio::sync::Mutex;

    fn peer(b: u8) -> NodeId {
        NodeId::from_public_key_bytes(&[b; 32])
    }

    fn snapshot(id: u64, peer_byte: u8) -> ConnSnapshot {
        ConnSnapshot {
            conn_id: id,
            peer: peer(peer_byte),
            direction: Direction::Outbound,
            opened_at: Instant::now() - Duration::from_secs(60),
            stream_count: 0,
        }
    }

    struct CountingCloser {
        closed: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ConnectionCloser for CountingCloser {
        async fn close(&self, _conn_id: u64) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn candidates_to_trim_respects_water_marks() {
        let marks = WaterMarks {
            low_water: 2,
            high_water: 4,
            grace_period: Duration::ZERO,
        };
        let mgr = ConnectionManager::new(marks, Arc::new(DefaultGater::new()));
        let conns: Vec<_> = (1..=5).map(|i| snapshot(i, i as u8)).collect();
        assert_eq!(mgr.candidates_to_trim(&conns).len(), 3);
    }

    #[tokio::test]
    async fn run_trim_loop_stops_on_cancellation() {
        let marks = WaterMarks {
            low_water: 0,
            high_water: 0,
            grace_period: Duration::ZERO,
        };
        let conns = Arc::new(Mutex::new(vec![snapshot(1, 1)]));
        let closer = Arc::new(CountingCloser {
            closed: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();

        let loop_cancel = cancel.clone();
        let loop_conns = conns.clone();
        let handle = tokio::spawn({
            let closer = closer.clone();
            let mgr = ConnectionManager::new(marks, Arc::new(DefaultGater::new()));
            async move {
                mgr.run_trim_loop(
                    move || loop_conns.try_lock().map(|c| c.clone()).unwrap_or_default(),
                    closer,
                    loop_cancel,
                )
                .await;
            }
        });

        cancel.cancel();
        handle.await.expect("trim loop task panicked");
    }
}
