//! Optional TCP transport (§4.4): TLS 1.3 for identity binding, yamux for
//! multiplexing (§4.3).

use std::sync::Arc;

use dep_core::{Multiaddr, NodeId, Protocol};
use dep_crypto::Identity;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::connection::Connection;
use crate::error::{DialError, ListenError, SecurityError, TransportError};
use crate::muxer::YamuxDriver;
use crate::security;

fn socket_addr_of(addr: &Multiaddr) -> Option<std::net::SocketAddr> {
    let mut ip = None;
    let mut port = None;
    for proto in addr.iter() {
        match proto {
            Protocol::Ip4(v) => ip = Some(std::net::IpAddr::V4(v)),
            Protocol::Ip6(v) => ip = Some(std::net::IpAddr::V6(v)),
            Protocol::Tcp(p) => port = Some(p),
            _ => {}
        }
    }
    Some(std::net::SocketAddr::new(ip?, port?))
}

fn socket_addr_to_multiaddr(addr: std::net::SocketAddr) -> Multiaddr {
    let mut m = Multiaddr::empty();
    match addr.ip() {
        std::net::IpAddr::V4(v) => m.push(Protocol::Ip4(v)),
        std::net::IpAddr::V6(v) => m.push(Protocol::Ip6(v)),
    }
    m.push(Protocol::Tcp(addr.port()));
    m
}

pub async fn dial(
    identity: &Identity,
    addr: &Multiaddr,
    expected_peer: NodeId,
) -> Result<Connection, TransportError> {
    let socket_addr =
        socket_addr_of(addr).ok_or_else(|| DialError::UnsupportedAddress(addr.to_string()))?;
    let stream = TcpStream::connect(socket_addr)
        .await
        .map_err(|e| DialError::Io(e.to_string()))?;
    let local_addr = socket_addr_to_multiaddr(
        stream
            .local_addr()
            .map_err(|e| DialError::Io(e.to_string()))?,
    );

    let tls_config = security::client_tls_config(identity, expected_peer)?;
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = rustls::pki_types::ServerName::try_from("dep2p")
        .map_err(|e| SecurityError::Tls(e.to_string()))?
        .to_owned();
    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| DialError::Io(e.to_string()))?;

    let driver = YamuxDriver::new(tls_stream, yamux::Mode::Client);
    Ok(Connection::new_tcp(
        expected_peer,
        addr.clone(),
        local_addr,
        driver,
    ))
}

pub struct TcpListenerHandle {
    listener: TcpListener,
    identity_server_config: Arc<rustls::ServerConfig>,
}

pub async fn bind(
    identity: &Identity,
    listen_addr: &Multiaddr,
) -> Result<TcpListenerHandle, TransportError> {
    let socket_addr = socket_addr_of(listen_addr)
        .ok_or_else(|| ListenError::UnsupportedAddress(listen_addr.to_string()))?;
    let listener = TcpListener::bind(socket_addr)
        .await
        .map_err(|e| ListenError::Bind(e.to_string()))?;
    let tls_config = security::server_tls_config(identity)?;
    Ok(TcpListenerHandle {
        listener,
        identity_server_config: Arc::new(tls_config),
    })
}

pub async fn accept(handle: &TcpListenerHandle) -> Result<Connection, TransportError> {
    let (stream, remote) = handle
        .listener
        .accept()
        .await
        .map_err(|e| ListenError::Bind(e.to_string()))?;
    let local_addr = socket_addr_to_multiaddr(
        stream
            .local_addr()
            .map_err(|e| DialError::Io(e.to_string()))?,
    );
    let remote_addr = socket_addr_to_multiaddr(remote);

    let acceptor = TlsAcceptor::from(Arc::clone(&handle.identity_server_config));
    let tls_stream = acceptor
        .accept(stream)
        .await
        .map_err(|e| DialError::Io(e.to_string()))?;

    let (_, session) = tls_stream.get_ref();
    let certs = session
        .peer_certificates()
        .ok_or(SecurityError::NoCertificate)?;
    let remote_node_id = security::node_id_from_peer_certs(certs, None)?;

    let driver = YamuxDriver::new(tls_stream, yamux::Mode::Server);
    Ok(Connection::new_tcp(
        remote_node_id,
        remote_addr,
        local_addr,
        driver,
    ))
}
