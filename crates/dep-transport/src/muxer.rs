//! Stream multiplexing (§4.3): QUIC streams are used directly as the
//! muxer for QUIC connections; a yamux-based muxer is layered over TCP.

use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use futures::future::poll_fn;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{mpsc, oneshot};
use tokio_util::compat::TokioAsyncReadCompatExt;
use tokio_util::sync::CancellationToken;

use crate::error::MuxerError;

/// Flow-control and keep-alive defaults for the TCP/yamux muxer (§4.3).
pub struct YamuxDefaults;

impl YamuxDefaults {
    pub const INITIAL_STREAM_WINDOW: u32 = 64 * 1024;
    pub const MAX_STREAM_WINDOW: u32 = 16 * 1024 * 1024;
    pub const INITIAL_CONN_WINDOW: u32 = 64 * 1024;
    pub const MAX_CONN_WINDOW: u32 = 64 * 1024 * 1024;
    pub const KEEP_ALIVE_SECS: u64 = 30;
    pub const WRITE_TIMEOUT_SECS: u64 = 10;
}

/// yamux 0.13 dropped per-stream window tuning from the public `Config` in
/// favor of automatic sizing; only the connection-wide receive window is
/// still configurable here. `YamuxDefaults::{INITIAL,MAX}_STREAM_WINDOW`
/// are kept above purely as the spec's documented flow-control numbers.
pub fn yamux_config() -> yamux::Config {
    let mut config = yamux::Config::default();
    config.set_max_connection_receive_window(Some(YamuxDefaults::MAX_CONN_WINDOW as usize));
    config
}

/// A single multiplexed stream, independent of the underlying transport.
pub enum MuxedStream {
    Quic {
        send: quinn::SendStream,
        recv: quinn::RecvStream,
    },
    Yamux(yamux::Stream),
}

impl MuxedStream {
    /// Half-close the write side; the peer may still finish reading.
    pub async fn close_write(&mut self) -> Result<(), MuxerError> {
        match self {
            MuxedStream::Quic { send, .. } => send
                .finish()
                .map_err(|e| MuxerError::Yamux(e.to_string())),
            MuxedStream::Yamux(stream) => {
                use futures::AsyncWriteExt;
                stream
                    .close()
                    .await
                    .map_err(|e| MuxerError::Yamux(e.to_string()))
            }
        }
    }

    /// Abort both directions immediately.
    pub fn reset(&mut self) {
        match self {
            MuxedStream::Quic { send, .. } => {
                let _ = send.reset(0u32.into());
            }
            MuxedStream::Yamux(stream) => {
                stream.reset();
            }
        }
    }
}

impl AsyncRead for MuxedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MuxedStream::Quic { recv, .. } => Pin::new(recv).poll_read(cx, buf),
            MuxedStream::Yamux(stream) => {
                use futures::AsyncRead as _;
                let mut tmp = vec![0u8; buf.remaining()];
                match Pin::new(stream).poll_read(cx, &mut tmp) {
                    Poll::Ready(Ok(n)) => {
                        buf.put_slice(&tmp[..n]);
                        Poll::Ready(Ok(()))
                    }
                    Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}

impl AsyncWrite for MuxedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MuxedStream::Quic { send, .. } => Pin::new(send).poll_write(cx, buf),
            MuxedStream::Yamux(stream) => {
                use futures::AsyncWrite as _;
                Pin::new(stream).poll_write(cx, buf)
            }
        }
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MuxedStream::Quic { send, .. } => Pin::new(send).poll_flush(cx),
            MuxedStream::Yamux(stream) => {
                use futures::AsyncWrite as _;
                Pin::new(stream).poll_flush(cx)
            }
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MuxedStream::Quic { send, .. } => Pin::new(send).poll_shutdown(cx),
            MuxedStream::Yamux(stream) => {
                use futures::AsyncWrite as _;
                Pin::new(stream).poll_shutdown(cx)
            }
        }
    }
}

/// A completed poll of the background-driven yamux connection: either an
/// outbound stream requested via [`YamuxDriver::open_stream`] finishing,
/// or a freshly accepted inbound stream (or the connection ending).
enum DriverEvent {
    Outbound(Result<yamux::Stream, yamux::ConnectionError>),
    Inbound(Option<Result<yamux::Stream, yamux::ConnectionError>>),
}

type OutboundReply = oneshot::Sender<Result<yamux::Stream, MuxerError>>;

/// Drives a yamux connection in the background task that owns it.
///
/// yamux 0.13 exposes only a poll-based `Connection` (no `Control` handle
/// usable from another task), so inbound streams and outbound-open
/// requests are both driven from a single spawned task: inbound streams
/// are pushed into a channel, outbound opens are requested over a second
/// channel and answered via a one-shot reply.
pub struct YamuxDriver {
    outbound: mpsc::Sender<OutboundReply>,
    inbound: mpsc::Receiver<yamux::Stream>,
    cancel: CancellationToken,
}

impl YamuxDriver {
    pub fn new<T>(io: T, mode: yamux::Mode) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut connection = yamux::Connection::new(io.compat(), yamux_config(), mode);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundReply>(64);
        let cancel = CancellationToken::new();
        let driver_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut pending_reply: Option<OutboundReply> = None;
            loop {
                tokio::select! {
                    _ = driver_cancel.cancelled() => break,
                    Some(reply) = outbound_rx.recv(), if pending_reply.is_none() => {
                        pending_reply = Some(reply);
                    }
                    event = poll_fn(|cx| {
                        if pending_reply.is_some() {
                            if let Poll::Ready(result) = connection.poll_new_outbound(cx) {
                                return Poll::Ready(DriverEvent::Outbound(result));
                            }
                        }
                        connection.poll_next_inbound(cx).map(DriverEvent::Inbound)
                    }) => {
                        match event {
                            DriverEvent::Outbound(result) => {
                                if let Some(reply) = pending_reply.take() {
                                    let _ = reply.send(result.map_err(|e| MuxerError::Yamux(e.to_string())));
                                }
                            }
                            DriverEvent::Inbound(Some(Ok(stream))) => {
                                if inbound_tx.send(stream).await.is_err() {
                                    break;
                                }
                            }
                            DriverEvent::Inbound(Some(Err(_))) | DriverEvent::Inbound(None) => break,
                        }
                    }
                }
            }
            let _ = poll_fn(|cx| connection.poll_close(cx)).await;
        });

        Self {
            outbound: outbound_tx,
            inbound: inbound_rx,
            cancel,
        }
    }

    pub async fn open_stream(&mut self) -> Result<yamux::Stream, MuxerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.outbound
            .send(reply_tx)
            .await
            .map_err(|_| MuxerError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| MuxerError::ConnectionClosed)?
    }

    pub async fn accept_stream(&mut self) -> Result<yamux::Stream, MuxerError> {
        self.inbound.recv().await.ok_or(MuxerError::ConnectionClosed)
    }

    pub async fn close(&mut self) {
        self.cancel.cancel();
    }
}
