//! Node configuration (§6.3): one struct-of-structs built up by chainable
//! `with_*` calls, plus an `from_env` layer so an operator can configure
//! the handful of knobs that matter without a CLI flag parser.

use std::net::SocketAddr;
use std::path::PathBuf;

use dep_connmgr::WaterMarks;
use dep_core::Multiaddr;
use dep_relay::{BackoffConfig, LimitsPolicy};
use dep_swarm::DialConfig;

/// NAT traversal knobs (§4.8): STUN servers for external-address
/// discovery and whether to attempt UPnP/NAT-PMP port mapping.
#[derive(Debug, Clone)]
pub struct NatConfig {
    pub stun_servers: Vec<SocketAddr>,
    pub enable_upnp: bool,
}

impl Default for NatConfig {
    fn default() -> Self {
        Self {
            stun_servers: Vec::new(),
            enable_upnp: false,
        }
    }
}

/// Top-level node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Base directory for the identity keystore and any other on-disk state.
    pub data_dir: PathBuf,
    /// Path to the persisted identity key, relative to `data_dir` unless absolute.
    pub identity_key_file: PathBuf,
    /// Address the mandatory QUIC transport binds to (§4.3.1).
    pub quic_listen_addr: Multiaddr,
    /// Address the optional TCP+TLS+yamux transport binds to, if enabled (§4.3.2).
    pub tcp_listen_addr: Option<Multiaddr>,
    /// Addresses of bootstrap peers to seed the Peerstore with at startup.
    pub bootstrap_peers: Vec<Multiaddr>,
    /// Addresses of relay nodes this node may use to reach otherwise
    /// unreachable peers (§4.9).
    pub relay_addrs: Vec<Multiaddr>,
    pub dial: DialConfig,
    pub water_marks: WaterMarks,
    pub nat: NatConfig,
    pub relay_limits: LimitsPolicy,
    pub reservation_backoff: BackoffConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./dep-data"),
            identity_key_file: PathBuf::from("identity.key"),
            quic_listen_addr: "/ip4/0.0.0.0/udp/0/quic-v1"
                .parse()
                .expect("static multiaddr always parses"),
            tcp_listen_addr: None,
            bootstrap_peers: Vec::new(),
            relay_addrs: Vec::new(),
            dial: DialConfig::default(),
            water_marks: WaterMarks::default(),
            nat: NatConfig::default(),
            relay_limits: LimitsPolicy::default(),
            reservation_backoff: BackoffConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_identity_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_key_file = path.into();
        self
    }

    pub fn with_quic_listen_addr(mut self, addr: Multiaddr) -> Self {
        self.quic_listen_addr = addr;
        self
    }

    pub fn with_tcp_listen_addr(mut self, addr: Multiaddr) -> Self {
        self.tcp_listen_addr = Some(addr);
        self
    }

    pub fn with_bootstrap_peers(mut self, peers: Vec<Multiaddr>) -> Self {
        self.bootstrap_peers = peers;
        self
    }

    pub fn with_relay_addrs(mut self, addrs: Vec<Multiaddr>) -> Self {
        self.relay_addrs = addrs;
        self
    }

    pub fn with_dial_config(mut self, dial: DialConfig) -> Self {
        self.dial = dial;
        self
    }

    pub fn with_water_marks(mut self, marks: WaterMarks) -> Self {
        self.water_marks = marks;
        self
    }

    pub fn with_nat(mut self, nat: NatConfig) -> Self {
        self.nat = nat;
        self
    }

    pub fn with_relay_limits(mut self, limits: LimitsPolicy) -> Self {
        self.relay_limits = limits;
        self
    }

    /// Resolve `identity_key_file` against `data_dir` when it isn't absolute.
    pub fn identity_key_path(&self) -> PathBuf {
        if self.identity_key_file.is_absolute() {
            self.identity_key_file.clone()
        } else {
            self.data_dir.join(&self.identity_key_file)
        }
    }

    /// Overlay a handful of operator-facing environment variables onto
    /// `base` (§6.3): `DEP_DATA_DIR`, `DEP_IDENTITY_KEY_FILE`,
    /// `DEP_BOOTSTRAP_PEERS` (comma-separated multiaddrs), `DEP_RELAY_ADDR`
    /// (comma-separated multiaddrs). Malformed entries are skipped with a
    /// warning rather than failing startup.
    pub fn from_env(mut base: Self) -> Self {
        if let Ok(dir) = std::env::var("DEP_DATA_DIR") {
            base.data_dir = PathBuf::from(dir);
        }
        if let Ok(file) = std::env::var("DEP_IDENTITY_KEY_FILE") {
            base.identity_key_file = PathBuf::from(file);
        }
        if let Ok(peers) = std::env::var("DEP_BOOTSTRAP_PEERS") {
            base.bootstrap_peers = parse_multiaddr_list(&peers);
        }
        if let Ok(relays) = std::env::var("DEP_RELAY_ADDR") {
            base.relay_addrs = parse_multiaddr_list(&relays);
        }
        base
    }
}

fn parse_multiaddr_list(raw: &str) -> Vec<Multiaddr> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<Multiaddr>() {
            Ok(addr) => Some(addr),
            Err(e) => {
                tracing::warn!(addr = s, error = %e, "skipping malformed multiaddr");
                None
            }
        })
        .collect()
}
