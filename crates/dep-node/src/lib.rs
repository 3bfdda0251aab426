//! # dep-node
//!
//! The composition root: wires every lower-layer crate (transport,
//! swarm, connection manager, reachability, NAT, relay, DHT, realm)
//! into one running node, and owns the pieces that don't belong to any
//! single layer — configuration, the identity keystore, and startup
//! ordering (§6).

pub mod config;
pub mod error;
pub mod keystore;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dep_connmgr::{ConnectionGater, ConnectionManager, DefaultGater};
use dep_core::{DiscoverySource, Multiaddr, NodeId, Protocol, Psk};
use dep_crypto::Identity;
use dep_dht::{DhtClient, MockDhtClient};
use dep_nat::stun;
use dep_nat::upnp::{self, PortMapping};
use dep_peerstore::Peerstore;
use dep_reachability::{CandidateSource, ReachabilityCoordinator};
use dep_realm::{RealmConnector, RealmManager, RealmState, RendezvousRegistrar};
use dep_swarm::{PoolCloser, Swarm};
use dep_transport::{Connection, TransportRegistry};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub use config::{NatConfig, NodeConfig};
pub use error::{NodeError, NodeResult};
pub use keystore::Keystore;

/// Where a `connect` call should attempt to reach a peer (§4.14.2): a
/// bare `NodeID` is only meaningful inside a joined realm, never on the
/// raw node-level API.
#[derive(Debug, Clone)]
pub enum DialTarget {
    Addr(Multiaddr),
    Id(NodeId),
}

/// Announces this node's presence under a realm's rendezvous namespace
/// by `provide`-ing the namespace's hash in the DHT (§4.12.1 step 4).
/// `unregister` is a best-effort no-op: the boundary trait this crate
/// ships has no explicit withdrawal call, so a provided key simply ages
/// out on whatever TTL the DHT backend applies.
struct DhtRendezvous {
    dht: Arc<dyn DhtClient>,
}

fn namespace_key(namespace: &str) -> [u8; 32] {
    let digest = Sha256::digest(namespace.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

#[async_trait::async_trait]
impl RendezvousRegistrar for DhtRendezvous {
    async fn register(&self, namespace: &str, _ttl: std::time::Duration) -> dep_realm::RealmResult<()> {
        self.dht
            .provide(namespace_key(namespace))
            .await
            .map_err(dep_realm::RealmError::from)
    }

    async fn unregister(&self, namespace: &str) {
        debug!(namespace, "rendezvous unregister is a no-op for the DHT provider boundary");
    }
}

/// The running node. Constructing one performs no I/O; [`DepNode::start`]
/// binds transports, seeds the Peerstore, and kicks off the background
/// loops (connection trimming, NAT traversal, DHT publication).
pub struct DepNode {
    config: NodeConfig,
    identity: Arc<Identity>,
    registry: Arc<TransportRegistry>,
    gater: Arc<dyn ConnectionGater>,
    peerstore: Arc<Peerstore>,
    swarm: Arc<Swarm>,
    connmgr: Arc<ConnectionManager>,
    reachability: Arc<ReachabilityCoordinator>,
    dht: Arc<dyn DhtClient>,
    realm: Arc<RealmManager>,
    connector: Arc<RealmConnector>,
    listen_addrs: Mutex<Vec<Multiaddr>>,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl DepNode {
    /// Build a node from `config`, generating or loading its identity
    /// from the configured keystore path. Binds the mandatory QUIC
    /// transport immediately (binding is cheap and lets callers inspect
    /// the resolved listen address before calling [`DepNode::start`]).
    pub async fn new(config: NodeConfig) -> NodeResult<Self> {
        let keystore = Keystore::new(&config.data_dir, &config.identity_key_file);
        let identity = Arc::new(keystore.load_or_generate()?);

        let mut registry = TransportRegistry::new(Arc::clone(&identity), &config.quic_listen_addr).await?;
        if let Some(tcp_addr) = &config.tcp_listen_addr {
            registry.enable_tcp(tcp_addr).await?;
        }

        Self::assemble(config, identity, Arc::new(registry)).await
    }

    async fn assemble(config: NodeConfig, identity: Arc<Identity>, registry: Arc<TransportRegistry>) -> NodeResult<Self> {
        let gater: Arc<dyn ConnectionGater> = Arc::new(DefaultGater::new());
        let peerstore = Arc::new(Peerstore::new());

        for addr in &config.bootstrap_peers {
            if let Some(peer) = dep_core::extract_node_id(addr) {
                peerstore.add_addr(peer, addr.clone(), DiscoverySource::Manual);
            } else {
                warn!(%addr, "bootstrap peer address has no embedded NodeID, ignoring");
            }
        }

        let swarm = Arc::new(Swarm::new(
            Arc::clone(&registry),
            Arc::clone(&gater),
            Arc::clone(&peerstore),
            config.dial,
        ));

        let connmgr = Arc::new(ConnectionManager::new(config.water_marks, Arc::clone(&gater)));
        let reachability = Arc::new(ReachabilityCoordinator::new());
        let dht: Arc<dyn DhtClient> = Arc::new(MockDhtClient::new());

        let rendezvous: Arc<dyn RendezvousRegistrar> = Arc::new(DhtRendezvous { dht: Arc::clone(&dht) });
        let realm = Arc::new(RealmManager::new(
            Arc::clone(&identity),
            Vec::new(),
            Some(rendezvous),
            Some(Arc::clone(&dht)),
            None,
        ));

        // Hole-punch and relay-forward providers require a live relay
        // wire client, which this crate does not implement (see
        // DESIGN.md); the connector cascade falls back to
        // `RealmError::Unreachable` once direct dialling is exhausted.
        let connector = Arc::new(RealmConnector::new(
            Arc::clone(&swarm),
            Arc::clone(realm.member_cache()),
            Some(Arc::clone(&dht)),
            None,
            None,
            None,
        ));

        Ok(Self {
            config,
            identity,
            registry,
            gater,
            peerstore,
            swarm,
            connmgr,
            reachability,
            dht,
            realm,
            connector,
            listen_addrs: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    pub fn identity(&self) -> &Arc<Identity> {
        &self.identity
    }

    pub fn node_id(&self) -> NodeId {
        self.identity.node_id()
    }

    pub fn peerstore(&self) -> &Arc<Peerstore> {
        &self.peerstore
    }

    pub fn swarm(&self) -> &Arc<Swarm> {
        &self.swarm
    }

    pub fn reachability(&self) -> &Arc<ReachabilityCoordinator> {
        &self.reachability
    }

    pub fn transport(&self) -> &Arc<TransportRegistry> {
        &self.registry
    }

    pub fn gater(&self) -> &Arc<dyn ConnectionGater> {
        &self.gater
    }

    pub fn dht(&self) -> &Arc<dyn DhtClient> {
        &self.dht
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Start listening, begin the connection-manager trim loop, and kick
    /// off NAT traversal if configured (§4.3, §4.6.2, §4.8).
    #[instrument(skip(self), fields(node_id = %self.node_id()))]
    pub async fn start(&self) -> NodeResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(NodeError::AlreadyStarted);
        }

        let (accepted_tx, accepted_rx) = mpsc::channel(64);
        self.swarm.listen(self.config.quic_listen_addr.clone(), accepted_tx).await;
        self.listen_addrs.lock().await.push(self.with_our_id(self.config.quic_listen_addr.clone()));

        if let Some(tcp_addr) = &self.config.tcp_listen_addr {
            self.listen_addrs.lock().await.push(self.with_our_id(tcp_addr.clone()));
        }

        self.spawn_accept_drain(accepted_rx);
        self.spawn_trim_loop();
        self.spawn_nat_tasks();

        info!("node started");
        Ok(())
    }

    fn with_our_id(&self, addr: Multiaddr) -> Multiaddr {
        dep_core::with_node_id(addr, self.node_id())
    }

    /// Drains accepted inbound connections, remembering their observed
    /// address in the Peerstore. Realm-scoped protocol dispatch (auth,
    /// pubsub, etc.) is each `ProtocolService`'s own responsibility once
    /// registered with the Realm Manager; this composition root only
    /// guarantees the connection itself is pooled and reusable.
    fn spawn_accept_drain(&self, mut accepted: mpsc::Receiver<(NodeId, Connection)>) {
        let peerstore = Arc::clone(&self.peerstore);
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    next = accepted.recv() => {
                        let Some((peer, conn)) = next else { return };
                        peerstore.add_addr(peer, conn.remote_addr().clone(), DiscoverySource::PeerstoreLocal);
                        debug!(%peer, "inbound connection accepted");
                    }
                }
            }
        });
    }

    fn spawn_trim_loop(&self) {
        let connmgr = Arc::clone(&self.connmgr);
        let pool = Arc::clone(self.swarm.pool());
        let closer = Arc::new(PoolCloser(Arc::clone(self.swarm.pool())));
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            connmgr.run_trim_loop(move || pool.snapshot(), closer, cancel).await;
        });
    }

    fn spawn_nat_tasks(&self) {
        if !self.config.nat.stun_servers.is_empty() {
            let servers = self.config.nat.stun_servers.clone();
            let reachability = Arc::clone(&self.reachability);
            let cancel = self.cancel.child_token();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    result = stun::probe_external_address(&servers) => {
                        match result {
                            Ok(external) => {
                                if let Ok(addr) = socket_addr_to_multiaddr(external) {
                                    reachability.report_candidate(addr, CandidateSource::Stun);
                                }
                            }
                            Err(e) => warn!(error = %e, "STUN probe failed"),
                        }
                    }
                }
            });
        }

        if self.config.nat.enable_upnp {
            if let Some(port) = udp_port(&self.config.quic_listen_addr) {
                let reachability = Arc::clone(&self.reachability);
                let cancel = self.cancel.child_token();
                tokio::spawn(async move {
                    match upnp::map_port(port, port, "dep2p").await {
                        Ok(addr) => {
                            reachability.report_candidate(addr, CandidateSource::Upnp);
                            let mapping = PortMapping {
                                external_port: port,
                                internal_port: port,
                                local_addr: std::net::SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, port),
                            };
                            upnp::run_renewal_loop(mapping, "dep2p".to_string(), reachability, cancel).await;
                        }
                        Err(e) => warn!(error = %e, "UPnP mapping failed"),
                    }
                });
            }
        }
    }

    /// Stop listening, close every connection, and cancel background
    /// tasks (§4.5.6). Idempotent.
    pub async fn stop(&self) -> NodeResult<()> {
        if !self.started.swap(false, Ordering::AcqRel) {
            return Err(NodeError::NotStarted);
        }
        self.cancel.cancel();
        self.swarm.close().await;
        Ok(())
    }

    /// Raw node-level connect (§4.14.2): only a full `Multiaddr` with an
    /// embedded `/p2p/<NodeID>` component is accepted. A bare `NodeID`
    /// must go through [`DepNode::realm_connect`] instead.
    pub async fn connect(&self, target: DialTarget) -> NodeResult<Connection> {
        match target {
            DialTarget::Id(_) => Err(NodeError::AddressRequired),
            DialTarget::Addr(addr) => {
                let peer = dep_core::extract_node_id(&addr).ok_or(NodeError::AddressRequired)?;
                self.swarm.dial_peer(peer, &[addr]).await.map_err(NodeError::from)
            }
        }
    }

    /// Join the realm identified by `psk`, advertising our own listen
    /// addresses to the DHT and rendezvous namespace (§4.12.1).
    pub async fn join_realm(&self, name: impl Into<String>, psk: Psk) -> NodeResult<()> {
        let local_addrs = self.listen_addrs.lock().await.clone();
        self.realm.join(name, psk, &local_addrs).await.map_err(NodeError::from)
    }

    pub async fn leave_realm(&self) -> NodeResult<()> {
        self.realm.leave().await.map_err(NodeError::from)
    }

    pub async fn realm_state(&self) -> RealmState {
        self.realm.state().await
    }

    /// `realm.connect(target)` (§4.14): ID-only dialling, gated on realm
    /// membership.
    pub async fn realm_connect(&self, target: NodeId) -> NodeResult<Connection> {
        self.connector.connect(target).await.map_err(NodeError::from)
    }

    pub fn realm_manager(&self) -> &Arc<RealmManager> {
        &self.realm
    }
}

fn socket_addr_to_multiaddr(addr: std::net::SocketAddr) -> Result<Multiaddr, NodeError> {
    let s = match addr {
        std::net::SocketAddr::V4(v4) => format!("/ip4/{}/udp/{}/quic-v1", v4.ip(), v4.port()),
        std::net::SocketAddr::V6(v6) => format!("/ip6/{}/udp/{}/quic-v1", v6.ip(), v6.port()),
    };
    s.parse().map_err(|_| NodeError::Io("failed to build multiaddr from STUN result".into()))
}

fn udp_port(addr: &Multiaddr) -> Option<u16> {
    addr.iter().find_map(|p| match p {
        Protocol::Udp(port) => Some(port),
        _ => None,
    })
}
