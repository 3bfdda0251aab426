//! QUIC transport (§4.4): the required transport. Streams are native, so
//! no separate muxer sits on top of it (§4.3).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dep_core::{Multiaddr, NodeId, Protocol};
use dep_crypto::Identity;
use quinn::{ClientConfig, Endpoint, ServerConfig, TransportConfig};

use crate::connection::Connection;
use crate::error::{DialError, ListenError, SecurityError, TransportError};
use crate::protocol::ALPN_DEP;
use crate::security;

/// `keep_alive = idle_timeout / 2` per §4.4 so a dead path is detected
/// within at most `idle_timeout`.
const IDLE_TIMEOUT: Duration = Duration::from_secs(6);
const KEEP_ALIVE: Duration = Duration::from_secs(3);

fn transport_config() -> Arc<TransportConfig> {
    let mut cfg = TransportConfig::default();
    cfg.max_idle_timeout(Some(IDLE_TIMEOUT.try_into().expect("fits in VarInt")));
    cfg.keep_alive_interval(Some(KEEP_ALIVE));
    Arc::new(cfg)
}

/// §4.2 `server_config()`: requests client auth, no CA, identity-bound
/// self-signed certificate.
pub fn server_config(identity: &Identity) -> Result<ServerConfig, SecurityError> {
    let mut rustls_config = security::server_tls_config(identity)?;
    rustls_config.alpn_protocols = vec![ALPN_DEP.to_vec()];

    let quic_server_config = quinn::crypto::rustls::QuicServerConfig::try_from(rustls_config)
        .map_err(|e| SecurityError::Tls(e.to_string()))?;
    let mut server_config = ServerConfig::with_crypto(Arc::new(quic_server_config));
    server_config.transport_config(transport_config());
    Ok(server_config)
}

/// §4.2 `client_config(expected_peer)`: verifies the server's certificate
/// resolves to exactly `expected_peer`.
pub fn client_config(
    identity: &Identity,
    expected_peer: NodeId,
) -> Result<ClientConfig, SecurityError> {
    let mut rustls_config = security::client_tls_config(identity, expected_peer)?;
    rustls_config.alpn_protocols = vec![ALPN_DEP.to_vec()];

    let quic_client_config = quinn::crypto::rustls::QuicClientConfig::try_from(rustls_config)
        .map_err(|e| SecurityError::Tls(e.to_string()))?;
    let mut client_config = ClientConfig::new(Arc::new(quic_client_config));
    client_config.transport_config(transport_config());
    Ok(client_config)
}

fn socket_addr_of(addr: &Multiaddr) -> Option<SocketAddr> {
    let mut ip = None;
    let mut port = None;
    for proto in addr.iter() {
        match proto {
            Protocol::Ip4(v) => ip = Some(std::net::IpAddr::V4(v)),
            Protocol::Ip6(v) => ip = Some(std::net::IpAddr::V6(v)),
            Protocol::Udp(p) => port = Some(p),
            _ => {}
        }
    }
    Some(SocketAddr::new(ip?, port?))
}

/// Bind a QUIC endpoint that both dials and accepts, using a single
/// identity-bound certificate for both roles (§4.2).
pub fn bind_endpoint(
    identity: &Identity,
    listen_addr: &Multiaddr,
) -> Result<Endpoint, TransportError> {
    let socket_addr = socket_addr_of(listen_addr)
        .ok_or_else(|| ListenError::UnsupportedAddress(listen_addr.to_string()))?;
    let server_config = server_config(identity)?;
    let endpoint = Endpoint::server(server_config, socket_addr)
        .map_err(|e| ListenError::Bind(e.to_string()))?;
    Ok(endpoint)
}

pub async fn dial(
    endpoint: &Endpoint,
    identity: &Identity,
    addr: &Multiaddr,
    expected_peer: NodeId,
) -> Result<Connection, TransportError> {
    let socket_addr =
        socket_addr_of(addr).ok_or_else(|| DialError::UnsupportedAddress(addr.to_string()))?;
    let client_config = client_config(identity, expected_peer)?;

    let connecting = endpoint
        .connect_with(client_config, socket_addr, "dep2p")
        .map_err(|e| DialError::Io(e.to_string()))?;
    let conn = connecting.await.map_err(|e| DialError::Io(e.to_string()))?;

    let local_addr = local_multiaddr(endpoint)?;
    Ok(Connection::new_quic(
        expected_peer,
        addr.clone(),
        local_addr,
        conn,
    ))
}

/// Accept the next inbound connection and verify the peer's identity
/// (§4.5.4: `Gater.intercept_accept` happens before this call; the
/// caller plugs the gater in at the registry/swarm layer).
pub async fn accept(endpoint: &Endpoint) -> Result<Connection, TransportError> {
    let incoming = endpoint
        .accept()
        .await
        .ok_or_else(|| DialError::Io("endpoint closed".into()))?;
    let conn = incoming.await.map_err(|e| DialError::Io(e.to_string()))?;

    let peer_identity = conn
        .peer_identity()
        .and_then(|any| any.downcast::<Vec<rustls::pki_types::CertificateDer<'static>>>().ok());
    let certs = peer_identity.ok_or(SecurityError::NoCertificate)?;
    let remote_node_id = security::node_id_from_peer_certs(&certs, None)?;

    let remote_addr = socket_addr_to_multiaddr(conn.remote_address());
    let local_addr = local_multiaddr(endpoint)?;

    Ok(Connection::new_quic(
        remote_node_id,
        remote_addr,
        local_addr,
        conn,
    ))
}

fn local_multiaddr(endpoint: &Endpoint) -> Result<Multiaddr, TransportError> {
    let local = endpoint
        .local_addr()
        .map_err(|e| ListenError::Bind(e.to_string()))?;
    Ok(socket_addr_to_multiaddr(local))
}

fn socket_addr_to_multiaddr(addr: SocketAddr) -> Multiaddr {
    let mut m = Multiaddr::empty();
    match addr.ip() {
        std::net::IpAddr::V4(v) => m.push(Protocol::Ip4(v)),
        std::net::IpAddr::V6(v) => m.push(Protocol::Ip6(v)),
    }
    m.push(Protocol::Udp(addr.port()));
    m.push(Protocol::QuicV1);
    m
}
