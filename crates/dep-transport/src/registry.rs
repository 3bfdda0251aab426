//! Transport Registry (§4.4): a uniform `dial`/`listen` over whichever
//! transports are enabled. QUIC is mandatory; TCP is optional.

use std::sync::Arc;

use dep_core::{Multiaddr, NodeId, Protocol};
use dep_crypto::Identity;
use quinn::Endpoint;

use crate::connection::Connection;
use crate::error::{DialError, TransportError};
use crate::{quic, tcp};

fn is_quic(addr: &Multiaddr) -> bool {
    addr.iter().any(|p| matches!(p, Protocol::QuicV1))
}

fn is_tcp(addr: &Multiaddr) -> bool {
    addr.iter().any(|p| matches!(p, Protocol::Tcp(_))) && !is_quic(addr)
}

pub struct TransportRegistry {
    identity: Arc<Identity>,
    quic_endpoint: Endpoint,
    tcp_listener: Option<tcp::TcpListenerHandle>,
}

impl TransportRegistry {
    /// Bind the mandatory QUIC endpoint at `quic_listen_addr`. TCP is
    /// enabled by separately calling [`Self::enable_tcp`].
    pub async fn new(
        identity: Arc<Identity>,
        quic_listen_addr: &Multiaddr,
    ) -> Result<Self, TransportError> {
        let quic_endpoint = quic::bind_endpoint(&identity, quic_listen_addr)?;
        Ok(Self {
            identity,
            quic_endpoint,
            tcp_listener: None,
        })
    }

    pub async fn enable_tcp(&mut self, tcp_listen_addr: &Multiaddr) -> Result<(), TransportError> {
        self.tcp_listener = Some(tcp::bind(&self.identity, tcp_listen_addr).await?);
        Ok(())
    }

    pub fn quic_endpoint(&self) -> &Endpoint {
        &self.quic_endpoint
    }

    /// Dial `addr`, verifying the remote presents `expected_peer`'s
    /// identity certificate.
    pub async fn dial(
        &self,
        addr: &Multiaddr,
        expected_peer: NodeId,
    ) -> Result<Connection, TransportError> {
        if is_quic(addr) {
            quic::dial(&self.quic_endpoint, &self.identity, addr, expected_peer).await
        } else if is_tcp(addr) {
            tcp::dial(&self.identity, addr, expected_peer).await
        } else {
            Err(DialError::UnsupportedAddress(addr.to_string()).into())
        }
    }

    /// Accept the next inbound connection on whichever transport has one
    /// ready first. Used by the Swarm's listen loop (§4.5.4).
    pub async fn accept(&self) -> Result<Connection, TransportError> {
        match &self.tcp_listener {
            Some(tcp_listener) => {
                tokio::select! {
                    result = quic::accept(&self.quic_endpoint) => result,
                    result = tcp::accept(tcp_listener) => result,
                }
            }
            None => quic::accept(&self.quic_endpoint).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_quic_and_tcp_addresses() {
        let quic_addr: Multiaddr = "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap();
        let tcp_addr: Multiaddr = "/ip4/127.0.0.1/tcp/4001".parse().unwrap();
        assert!(is_quic(&quic_addr));
        assert!(!is_tcp(&quic_addr));
        assert!(is_tcp(&tcp_addr));
        assert!(!is_quic(&tcp_addr));
    }
}
