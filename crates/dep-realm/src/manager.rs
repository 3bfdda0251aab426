//! Realm lifecycle (§4.12): join/leave state machine, protocol-service
//! startup, and the business-API membership guard that every layer above
//! this crate is expected to call at its own entry points.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dep_core::{Multiaddr, NodeId, Psk, RealmId, RealmKey};
use dep_crypto::Identity;
use dep_dht::{DhtClient, SignedPeerRecord};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::error::{RealmError, RealmResult};
use crate::member_cache::MemberCache;

/// TTL of the rendezvous registration performed at join time (§4.12.1).
pub const DISCOVERY_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealmState {
    NotJoined,
    Joining,
    Joined,
    Leaving,
}

/// Announces this node's presence under the realm's rendezvous namespace
/// so other members can discover it (§4.12.1 step 4). Backed by the DHT
/// `provide`/`find_providers` calls in practice; kept as its own seam so
/// `RealmManager` doesn't have to know which discovery mechanism a given
/// deployment uses.
#[async_trait::async_trait]
pub trait RendezvousRegistrar: Send + Sync {
    async fn register(&self, namespace: &str, ttl: Duration) -> RealmResult<()>;
    async fn unregister(&self, namespace: &str);
}

/// One of PubSub / Messaging / Streams / Liveness (§4.12.1 step 5): each
/// installs its own stream handlers on realm-scoped protocol ids when the
/// realm is joined, and tears them down on leave.
#[async_trait::async_trait]
pub trait ProtocolService: Send + Sync {
    fn name(&self) -> &'static str;
    async fn start(&self, realm_id: RealmId) -> RealmResult<()>;
    async fn stop(&self);
}

/// Tells the configured relay (if any) where to reach this node
/// (§4.9.1's `register_self`, invoked from the realm-join side).
#[async_trait::async_trait]
pub trait RelayRegistrar: Send + Sync {
    async fn register_self(&self, node_id: NodeId, addrs: Vec<Multiaddr>) -> RealmResult<()>;
}

/// Lifecycle manager for the single realm a node may be joined to at a
/// time (§3.4, §4.12). Holds the member cache and drives the join/leave
/// state machine; connection establishment itself lives in
/// [`crate::connector`].
pub struct RealmManager {
    identity: Arc<Identity>,
    state: RwLock<RealmState>,
    realm_id: RwLock<Option<RealmId>>,
    realm_key: RwLock<Option<RealmKey>>,
    name: RwLock<Option<String>>,
    member_cache: Arc<MemberCache>,
    services: Vec<Arc<dyn ProtocolService>>,
    rendezvous: Option<Arc<dyn RendezvousRegistrar>>,
    dht: Option<Arc<dyn DhtClient>>,
    relay: Option<Arc<dyn RelayRegistrar>>,
    publish_seq: AtomicU64,
}

impl RealmManager {
    pub fn new(
        identity: Arc<Identity>,
        services: Vec<Arc<dyn ProtocolService>>,
        rendezvous: Option<Arc<dyn RendezvousRegistrar>>,
        dht: Option<Arc<dyn DhtClient>>,
        relay: Option<Arc<dyn RelayRegistrar>>,
    ) -> Self {
        Self {
            identity,
            state: RwLock::new(RealmState::NotJoined),
            realm_id: RwLock::new(None),
            realm_key: RwLock::new(None),
            name: RwLock::new(None),
            member_cache: Arc::new(MemberCache::new()),
            services,
            rendezvous,
            dht,
            relay,
            publish_seq: AtomicU64::new(0),
        }
    }

    pub fn member_cache(&self) -> &Arc<MemberCache> {
        &self.member_cache
    }

    pub async fn state(&self) -> RealmState {
        *self.state.read().await
    }

    /// `current()` (§4.12.1): `Some` iff joined, giving the caller the
    /// realm id/key pair needed by auth and the connector.
    pub async fn current(&self) -> Option<(RealmId, RealmKey)> {
        if *self.state.read().await != RealmState::Joined {
            return None;
        }
        let id = (*self.realm_id.read().await)?;
        let key = self.realm_key.read().await.clone()?;
        Some((id, key))
    }

    /// The business-API guard (§4.12.2): every business entry point in
    /// every layer above this one wraps itself in this check.
    pub async fn is_member_joined(&self, caller: &NodeId) -> bool {
        *self.state.read().await == RealmState::Joined && self.member_cache.is_member(caller)
    }

    #[instrument(skip(self, psk, local_addrs))]
    pub async fn join(&self, name: impl Into<String>, psk: Psk, local_addrs: &[Multiaddr]) -> RealmResult<()> {
        {
            let mut state = self.state.write().await;
            if *state != RealmState::NotJoined {
                return Err(RealmError::AlreadyJoined);
            }
            *state = RealmState::Joining;
        }

        let realm_id = RealmId::derive(&psk);
        let realm_key = RealmKey::derive(&psk);
        let namespace = format!("/dep/realm/{realm_id}/discovery");

        if let Err(e) = self.start_join(&namespace, realm_id).await {
            *self.state.write().await = RealmState::NotJoined;
            return Err(e);
        }

        *self.realm_id.write().await = Some(realm_id);
        *self.realm_key.write().await = Some(realm_key);
        *self.name.write().await = Some(name.into());
        *self.state.write().await = RealmState::Joined;
        info!(%realm_id, "realm joined");

        if let Some(dht) = self.dht.clone() {
            let identity = Arc::clone(&self.identity);
            let addrs = local_addrs.to_vec();
            let seq = self.publish_seq.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let record = SignedPeerRecord::sign(&identity, addrs, seq);
                if let Err(e) = dht.put_signed_peer_record(record).await {
                    warn!(error = %e, "failed to publish signed peer record");
                }
            });
        }

        if let Some(relay) = self.relay.clone() {
            let node_id = self.identity.node_id();
            let addrs = local_addrs.to_vec();
            tokio::spawn(async move {
                if let Err(e) = relay.register_self(node_id, addrs).await {
                    warn!(error = %e, "failed to register with relay");
                }
            });
        }

        Ok(())
    }

    async fn start_join(&self, namespace: &str, realm_id: RealmId) -> RealmResult<()> {
        if let Some(rendezvous) = &self.rendezvous {
            rendezvous.register(namespace, DISCOVERY_TTL).await?;
        }

        let mut started = Vec::new();
        for service in &self.services {
            if let Err(e) = service.start(realm_id).await {
                warn!(service = service.name(), error = %e, "protocol service failed to start, rolling back join");
                for s in started.iter().rev() {
                    let s: &Arc<dyn ProtocolService> = s;
                    s.stop().await;
                }
                if let Some(rendezvous) = &self.rendezvous {
                    rendezvous.unregister(namespace).await;
                }
                return Err(e);
            }
            started.push(service);
        }
        Ok(())
    }

    /// `leave(ctx)` (§4.12.1): Leaving -> NotJoined, with services and
    /// rendezvous registration torn down and the member cache flushed.
    #[instrument(skip(self))]
    pub async fn leave(&self) -> RealmResult<()> {
        let realm_id = {
            let mut state = self.state.write().await;
            if *state != RealmState::Joined {
                return Err(RealmError::NotJoined);
            }
            *state = RealmState::Leaving;
            self.realm_id.read().await.ok_or(RealmError::NotJoined)?
        };

        for service in &self.services {
            service.stop().await;
        }
        self.member_cache.flush();
        if let Some(rendezvous) = &self.rendezvous {
            rendezvous.unregister(&format!("/dep/realm/{realm_id}/discovery")).await;
        }

        *self.realm_id.write().await = None;
        *self.realm_key.write().await = None;
        *self.name.write().await = None;
        *self.state.write().await = RealmState::NotJoined;
        info!(%realm_id, "realm left");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct NoopService {
        started: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ProtocolService for NoopService {
        fn name(&self) -> &'static str {
            "noop"
        }
        async fn start(&self, _realm_id: RealmId) -> RealmResult<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn stop(&self) {
            self.started.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct FailingService;

    #[async_trait::async_trait]
    impl ProtocolService for FailingService {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn start(&self, _realm_id: RealmId) -> RealmResult<()> {
            Err(RealmError::AuthFailed("boom".into()))
        }
        async fn stop(&self) {}
    }

    fn manager(services: Vec<Arc<dyn ProtocolService>>) -> RealmManager {
        RealmManager::new(Arc::new(Identity::generate()), services, None, None, None)
    }

    #[tokio::test]
    async fn join_then_current_reports_joined_realm() {
        let counter = Arc::new(AtomicUsize::new(0));
        let m = manager(vec![Arc::new(NoopService { started: Arc::clone(&counter) })]);

        m.join("test", Psk::new([1u8; 32]), &[]).await.unwrap();
        assert_eq!(m.state().await, RealmState::Joined);
        assert!(m.current().await.is_some());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn joining_twice_is_rejected() {
        let m = manager(vec![]);
        m.join("test", Psk::new([2u8; 32]), &[]).await.unwrap();
        let err = m.join("test", Psk::new([2u8; 32]), &[]).await.unwrap_err();
        assert!(matches!(err, RealmError::AlreadyJoined));
    }

    #[tokio::test]
    async fn failing_service_rolls_back_join() {
        let counter = Arc::new(AtomicUsize::new(0));
        let m = manager(vec![
            Arc::new(NoopService { started: Arc::clone(&counter) }),
            Arc::new(FailingService),
        ]);

        let err = m.join("test", Psk::new([3u8; 32]), &[]).await.unwrap_err();
        assert!(matches!(err, RealmError::AuthFailed(_)));
        assert_eq!(m.state().await, RealmState::NotJoined);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn leave_resets_state_and_flushes_members() {
        let m = manager(vec![]);
        m.join("test", Psk::new([4u8; 32]), &[]).await.unwrap();
        m.member_cache().add(NodeId::from_public_key_bytes(&[9u8; 32]));

        m.leave().await.unwrap();
        assert_eq!(m.state().await, RealmState::NotJoined);
        assert!(m.current().await.is_none());
        assert!(m.member_cache().members().is_empty());
    }

    #[tokio::test]
    async fn leave_without_join_is_rejected() {
        let m = manager(vec![]);
        let err = m.leave().await.unwrap_err();
        assert!(matches!(err, RealmError::NotJoined));
    }

    #[tokio::test]
    async fn guard_denies_non_members_and_allows_members() {
        let m = manager(vec![]);
        let caller = NodeId::from_public_key_bytes(&[7u8; 32]);
        assert!(!m.is_member_joined(&caller).await);

        m.join("test", Psk::new([5u8; 32]), &[]).await.unwrap();
        assert!(!m.is_member_joined(&caller).await);

        m.member_cache().add(caller);
        assert!(m.is_member_joined(&caller).await);
    }
}
