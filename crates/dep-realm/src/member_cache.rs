//! Member cache (§4.13.3): who's currently a member of the joined realm,
//! and the eviction rules that keep it from growing stale. Infrastructure
//! nodes (§4.13.2) authenticate successfully but are never inserted here.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dep_core::NodeId;

/// Grace period before an offline or heartbeat-silent member is evicted
/// (§4.13.3).
pub const EVICTION_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Online,
    /// Connection dropped at this time, or no heartbeat since this time.
    Offline(DateTime<Utc>),
}

#[derive(Debug, Clone)]
pub struct Member {
    pub node_id: NodeId,
    pub joined_at: DateTime<Utc>,
    pub status: MemberStatus,
}

#[derive(Default)]
pub struct MemberCache {
    members: DashMap<NodeId, Member>,
}

impl MemberCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `member_cache.add(A)` (§4.13.1): called only after a successful
    /// auth handshake, and only for non-infrastructure peers.
    pub fn add(&self, node_id: NodeId) {
        self.members.entry(node_id).or_insert_with(|| Member {
            node_id,
            joined_at: Utc::now(),
            status: MemberStatus::Online,
        });
        if let Some(mut m) = self.members.get_mut(&node_id) {
            m.status = MemberStatus::Online;
        }
    }

    /// Explicit `REALM_LEAVE` (§4.13.3): immediate removal.
    pub fn remove(&self, node_id: &NodeId) {
        self.members.remove(node_id);
    }

    /// Connection dropped: mark offline, subject to eviction after
    /// [`EVICTION_WINDOW`] unless the peer reconnects.
    pub fn mark_offline(&self, node_id: &NodeId) {
        if let Some(mut m) = self.members.get_mut(node_id) {
            m.status = MemberStatus::Offline(Utc::now());
        }
    }

    /// Heartbeat silence is tracked the same way as a dropped connection:
    /// both use the "offline since" clock and the same eviction window.
    pub fn heartbeat_missed(&self, node_id: &NodeId, since: DateTime<Utc>) {
        if let Some(mut m) = self.members.get_mut(node_id) {
            if matches!(m.status, MemberStatus::Online) {
                m.status = MemberStatus::Offline(since);
            }
        }
    }

    pub fn is_member(&self, node_id: &NodeId) -> bool {
        self.members.contains_key(node_id)
    }

    pub fn members(&self) -> Vec<NodeId> {
        self.members.iter().map(|e| *e.key()).collect()
    }

    /// Drop every member that has been offline longer than
    /// [`EVICTION_WINDOW`] (§4.13.3). Call periodically.
    pub fn evict_stale(&self) {
        let now = Utc::now();
        self.members.retain(|_, m| match m.status {
            MemberStatus::Online => true,
            MemberStatus::Offline(since) => (now - since).to_std().unwrap_or(Duration::ZERO) < EVICTION_WINDOW,
        });
    }

    /// Remove every member, used by `leave(ctx)` (§4.12.1).
    pub fn flush(&self) {
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn node(b: u8) -> NodeId {
        NodeId::from_public_key_bytes(&[b; 32])
    }

    #[test]
    fn add_then_is_member() {
        let cache = MemberCache::new();
        let n = node(1);
        cache.add(n);
        assert!(cache.is_member(&n));
    }

    #[test]
    fn explicit_leave_removes_immediately() {
        let cache = MemberCache::new();
        let n = node(2);
        cache.add(n);
        cache.remove(&n);
        assert!(!cache.is_member(&n));
    }

    #[test]
    fn recently_offline_member_survives_eviction() {
        let cache = MemberCache::new();
        let n = node(3);
        cache.add(n);
        cache.mark_offline(&n);
        cache.evict_stale();
        assert!(cache.is_member(&n));
    }

    #[test]
    fn long_offline_member_is_evicted() {
        let cache = MemberCache::new();
        let n = node(4);
        cache.add(n);
        cache.heartbeat_missed(&n, Utc::now() - TimeDelta::seconds(600));
        cache.evict_stale();
        assert!(!cache.is_member(&n));
    }

    #[test]
    fn flush_clears_every_member() {
        let cache = MemberCache::new();
        cache.add(node(5));
        cache.add(node(6));
        cache.flush();
        assert!(cache.members().is_empty());
    }
}
