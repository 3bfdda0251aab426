//! Address book (§4.9.1): a cached hint, not an authority. The relay
//! never vouches for liveness; the DHT signed record remains the
//! authoritative source. Entries expire with the owner's reservation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dep_core::{Multiaddr, NodeId};

#[derive(Debug, Clone)]
pub struct AddressBookEntry {
    pub node_id: NodeId,
    pub addrs: Vec<Multiaddr>,
    pub expires_at: DateTime<Utc>,
}

impl AddressBookEntry {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// The relay-side cache backing `register_self` / `query_address`.
#[derive(Default)]
pub struct AddressBook {
    entries: DashMap<NodeId, AddressBookEntry>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// `register_self` (§4.9.1): the owner asks the relay to publish its
    /// verified addresses, tied to its reservation's expiry.
    pub fn register_self(&self, node_id: NodeId, addrs: Vec<Multiaddr>, reservation_expires_at: DateTime<Utc>) {
        self.entries.insert(
            node_id,
            AddressBookEntry {
                node_id,
                addrs,
                expires_at: reservation_expires_at,
            },
        );
    }

    /// `query_address` (§4.9.1). Returns `None` for an unknown or
    /// expired entry; expired entries are evicted as a side effect.
    pub fn query_address(&self, target_id: &NodeId) -> Option<AddressBookEntry> {
        let entry = self.entries.get(target_id)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(target_id);
            return None;
        }
        Some(entry.clone())
    }

    pub fn remove(&self, node_id: &NodeId) {
        self.entries.remove(node_id);
    }
}
