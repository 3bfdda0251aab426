//! Tagging and protection (§4.6.1).

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use dep_core::NodeId;

/// Well-known tags other crates attach to peers they depend on staying
/// connected, so the trimmer (§4.6.2) doesn't close connections out from
/// under them.
pub const TAG_DHT_ROUTING: &str = "dht-routing";
pub const TAG_REALM_MEMBER: &str = "realm-member";
pub const TAG_RELAY_ACTIVE: &str = "relay-active";
pub const TAG_BOOTSTRAP: &str = "bootstrap";

/// `peer -> tag -> value` plus `peer -> protected tags`, both behind a
/// single read/write mutex. §4.6.1 explicitly chooses this over segmented
/// locking for v1.0 simplicity.
#[derive(Default)]
pub struct TagBook {
    tags: RwLock<HashMap<NodeId, HashMap<String, i32>>>,
    protections: RwLock<HashMap<NodeId, HashSet<String>>>,
}

impl TagBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag_peer(&self, peer: NodeId, tag: &str, value: i32) {
        self.tags
            .write()
            .unwrap()
            .entry(peer)
            .or_default()
            .insert(tag.to_string(), value);
    }

    pub fn untag_peer(&self, peer: &NodeId, tag: &str) {
        if let Some(tags) = self.tags.write().unwrap().get_mut(peer) {
            tags.remove(tag);
        }
    }

    /// Apply `f` to the current value of `tag` for `peer` (0 if absent),
    /// storing the result.
    pub fn upsert_tag(&self, peer: NodeId, tag: &str, f: impl FnOnce(i32) -> i32) {
        let mut tags = self.tags.write().unwrap();
        let entry = tags.entry(peer).or_default();
        let current = entry.get(tag).copied().unwrap_or(0);
        entry.insert(tag.to_string(), f(current));
    }

    /// Sum of all tag values for `peer`.
    pub fn score(&self, peer: &NodeId) -> i32 {
        self.tags
            .read()
            .unwrap()
            .get(peer)
            .map(|tags| tags.values().sum())
            .unwrap_or(0)
    }

    pub fn protect(&self, peer: NodeId, tag: &str) {
        self.protections
            .write()
            .unwrap()
            .entry(peer)
            .or_default()
            .insert(tag.to_string());
    }

    /// Remove `tag` from `peer`'s protections. Returns whether the peer
    /// is still protected under some other tag.
    pub fn unprotect(&self, peer: &NodeId, tag: &str) -> bool {
        let mut protections = self.protections.write().unwrap();
        let Some(tags) = protections.get_mut(peer) else {
            return false;
        };
        tags.remove(tag);
        let still_protected = !tags.is_empty();
        if !still_protected {
            protections.remove(peer);
        }
        still_protected
    }

    pub fn is_protected(&self, peer: &NodeId, tag: Option<&str>) -> bool {
        let protections = self.protections.read().unwrap();
        let Some(tags) = protections.get(peer) else {
            return false;
        };
        match tag {
            Some(tag) => tags.contains(tag),
            None => !tags.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(b: u8) -> NodeId {
        NodeId::from_public_key_bytes(&[b; 32])
    }

    #[test]
    fn score_sums_tags() {
        let book = TagBook::new();
        let p = peer(1);
        book.tag_peer(p, "a", 5);
        book.tag_peer(p, "b", 3);
        assert_eq!(book.score(&p), 8);
    }

    #[test]
    fn untag_removes_contribution() {
        let book = TagBook::new();
        let p = peer(2);
        book.tag_peer(p, "a", 5);
        book.untag_peer(&p, "a");
        assert_eq!(book.score(&p), 0);
    }

    #[test]
    fn upsert_starts_from_zero() {
        let book = TagBook::new();
        let p = peer(3);
        book.upsert_tag(p, "hits", |v| v + 1);
        book.upsert_tag(p, "hits", |v| v + 1);
        assert_eq!(book.score(&p), 2);
    }

    #[test]
    fn protection_tracks_multiple_tags() {
        let book = TagBook::new();
        let p = peer(4);
        book.protect(p, TAG_DHT_ROUTING);
        book.protect(p, TAG_REALM_MEMBER);
        assert!(book.is_protected(&p, None));

        let still = book.unprotect(&p, TAG_DHT_ROUTING);
        assert!(still);
        assert!(book.is_protected(&p, Some(TAG_REALM_MEMBER)));

        let still = book.unprotect(&p, TAG_REALM_MEMBER);
        assert!(!still);
        assert!(!book.is_protected(&p, None));
    }
}
