//! Transport-agnostic connection handle (§4.3, §4.4).

use std::sync::Arc;

use dep_core::{Multiaddr, NodeId};
use tokio::sync::Mutex;

use crate::error::{MuxerError, TransportError};
use crate::muxer::{MuxedStream, YamuxDriver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Quic,
    Tcp,
}

enum Inner {
    Quic(quinn::Connection),
    Tcp(Arc<Mutex<YamuxDriver>>),
}

/// A connection to a single remote peer, opened over either QUIC (the
/// primary transport) or TCP+TLS+yamux (the optional fallback).
pub struct Connection {
    kind: TransportKind,
    remote_node_id: NodeId,
    remote_addr: Multiaddr,
    local_addr: Multiaddr,
    inner: Inner,
}

impl Connection {
    pub(crate) fn new_quic(
        remote_node_id: NodeId,
        remote_addr: Multiaddr,
        local_addr: Multiaddr,
        conn: quinn::Connection,
    ) -> Self {
        Self {
            kind: TransportKind::Quic,
            remote_node_id,
            remote_addr,
            local_addr,
            inner: Inner::Quic(conn),
        }
    }

    pub(crate) fn new_tcp(
        remote_node_id: NodeId,
        remote_addr: Multiaddr,
        local_addr: Multiaddr,
        driver: YamuxDriver,
    ) -> Self {
        Self {
            kind: TransportKind::Tcp,
            remote_node_id,
            remote_addr,
            local_addr,
            inner: Inner::Tcp(Arc::new(Mutex::new(driver))),
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn remote_node_id(&self) -> NodeId {
        self.remote_node_id
    }

    pub fn remote_addr(&self) -> &Multiaddr {
        &self.remote_addr
    }

    pub fn local_addr(&self) -> &Multiaddr {
        &self.local_addr
    }

    /// Open a new bidirectional stream. Concurrent calls are allowed
    /// (§4.3): QUIC streams are independent by construction, and the
    /// yamux driver serializes only the cheap `open_stream` control call.
    pub async fn open_stream(&self) -> Result<MuxedStream, TransportError> {
        match &self.inner {
            Inner::Quic(conn) => {
                let (send, recv) = conn
                    .open_bi()
                    .await
                    .map_err(|e| MuxerError::Yamux(e.to_string()))?;
                Ok(MuxedStream::Quic { send, recv })
            }
            Inner::Tcp(driver) => {
                let mut driver = driver.lock().await;
                Ok(MuxedStream::Yamux(driver.open_stream().await?))
            }
        }
    }

    pub async fn accept_stream(&self) -> Result<MuxedStream, TransportError> {
        match &self.inner {
            Inner::Quic(conn) => {
                let (send, recv) = conn
                    .accept_bi()
                    .await
                    .map_err(|e| MuxerError::Yamux(e.to_string()))?;
                Ok(MuxedStream::Quic { send, recv })
            }
            Inner::Tcp(driver) => {
                let mut driver = driver.lock().await;
                Ok(MuxedStream::Yamux(driver.accept_stream().await?))
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.inner {
            Inner::Quic(conn) => conn.close_reason().is_some(),
            Inner::Tcp(_) => false,
        }
    }

    pub async fn close(&self) {
        match &self.inner {
            Inner::Quic(conn) => conn.close(0u32.into(), b"closing"),
            Inner::Tcp(driver) => driver.lock().await.close().await,
        }
    }
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            remote_node_id: self.remote_node_id,
            remote_addr: self.remote_addr.clone(),
            local_addr: self.local_addr.clone(),
            inner: match &self.inner {
                Inner::Quic(conn) => Inner::Quic(conn.clone()),
                Inner::Tcp(driver) => Inner::Tcp(Arc::clone(driver)),
            },
        }
    }
}
