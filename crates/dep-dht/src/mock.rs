//! An in-memory [`DhtClient`] for tests and single-node development,
//! mirroring the mock-transport pattern: a real trait boundary backed by
//! concurrent in-process maps instead of a network.

use dashmap::DashMap;
use dep_core::NodeId;
use tracing::debug;

use crate::client::{DhtClient, DhtKey};
use crate::error::{DhtError, DhtResult};
use crate::record::SignedPeerRecord;

#[derive(Default)]
pub struct MockDhtClient {
    providers: DashMap<DhtKey, Vec<NodeId>>,
    records: DashMap<NodeId, SignedPeerRecord>,
}

impl MockDhtClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DhtClient for MockDhtClient {
    async fn provide(&self, key: DhtKey) -> DhtResult<()> {
        // A real backend would need a local node identity to announce
        // under; the in-memory mock doesn't track one, so callers that
        // care which node provides a key should assert on
        // `find_providers` after seeding providers directly in tests.
        self.providers.entry(key).or_default();
        Ok(())
    }

    async fn find_providers(&self, key: DhtKey, limit: usize) -> DhtResult<Vec<NodeId>> {
        Ok(self
            .providers
            .get(&key)
            .map(|v| v.iter().take(limit).copied().collect())
            .unwrap_or_default())
    }

    async fn put_signed_peer_record(&self, record: SignedPeerRecord) -> DhtResult<()> {
        record.verify()?;

        if let Some(existing) = self.records.get(&record.node_id()) {
            if record.seq() <= existing.seq() {
                return Err(DhtError::StaleSequence {
                    have: existing.seq(),
                    got: record.seq(),
                });
            }
        }
        debug!(node_id = %record.node_id(), seq = record.seq(), "DHT record published");
        self.records.insert(record.node_id(), record);
        Ok(())
    }

    async fn get_signed_peer_record(&self, target: &NodeId) -> DhtResult<Option<SignedPeerRecord>> {
        match self.records.get(target) {
            Some(r) => {
                r.verify()?;
                Ok(Some(r.clone()))
            }
            None => Ok(None),
        }
    }
}

/// Test helper: seed `key` as provided by `provider` directly, bypassing
/// the self-announcement gap noted on [`MockDhtClient::provide`].
impl MockDhtClient {
    pub fn seed_provider(&self, key: DhtKey, provider: NodeId) {
        self.providers.entry(key).or_default().push(provider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dep_core::Multiaddr;
    use dep_crypto::Identity;

    fn addr() -> Multiaddr {
        "/ip4/198.51.100.7/udp/4001/quic-v1".parse().unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips_a_verified_record() {
        let client = MockDhtClient::new();
        let id = Identity::generate();
        let record = SignedPeerRecord::sign(&id, vec![addr()], 1);

        client.put_signed_peer_record(record).await.unwrap();
        let fetched = client.get_signed_peer_record(&id.node_id()).await.unwrap().unwrap();
        assert_eq!(fetched.addrs(), &[addr()]);
    }

    #[tokio::test]
    async fn unknown_target_returns_none() {
        let client = MockDhtClient::new();
        let id = Identity::generate();
        assert!(client.get_signed_peer_record(&id.node_id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_sequence_number_is_rejected() {
        let client = MockDhtClient::new();
        let id = Identity::generate();
        client
            .put_signed_peer_record(SignedPeerRecord::sign(&id, vec![addr()], 5))
            .await
            .unwrap();

        let err = client
            .put_signed_peer_record(SignedPeerRecord::sign(&id, vec![addr()], 5))
            .await
            .unwrap_err();
        assert!(matches!(err, DhtError::StaleSequence { have: 5, got: 5 }));
    }

    #[tokio::test]
    async fn provide_and_find_providers() {
        let client = MockDhtClient::new();
        let node = NodeId::from_public_key_bytes(&[9u8; 32]);
        let key: DhtKey = [1u8; 32];
        client.seed_provider(key, node);

        let found = client.find_providers(key, 10).await.unwrap();
        assert_eq!(found, vec![node]);
    }

    #[tokio::test]
    async fn find_providers_respects_limit() {
        let client = MockDhtClient::new();
        let key: DhtKey = [2u8; 32];
        for b in 0..5u8 {
            client.seed_provider(key, NodeId::from_public_key_bytes(&[b; 32]));
        }
        let found = client.find_providers(key, 2).await.unwrap();
        assert_eq!(found.len(), 2);
    }
}
