//! Wire framing and stream-protocol negotiation (§4.5.5, §6.1).
//!
//! Frames are length-prefixed with an `unsigned-varint` byte count,
//! mirroring the framing go-libp2p uses so a peer running either stack
//! can dial the other. Protocol negotiation on a freshly opened stream is
//! a single length-prefixed line exchange, analogous to multistream-select:
//! the opener writes the desired `ProtocolId` as a frame, the acceptor
//! replies with the same bytes to accept or a `"na"` frame to reject.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use dep_core::ProtocolId;

use crate::error::ProtocolNegotiationError;

/// ALPN used for the QUIC transport (§4.4).
pub const ALPN_DEP: &[u8] = b"dep";

/// Frames larger than this are rejected outright (defends against a peer
/// sending an absurd length prefix to force an unbounded allocation).
pub const MAX_FRAME_LEN: usize = 1 << 20;

const NOT_AVAILABLE: &[u8] = b"na";

/// Write `payload` prefixed with its length as an unsigned varint.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    let mut len_buf = unsigned_varint::encode::usize_buffer();
    let encoded = unsigned_varint::encode::usize(payload.len(), &mut len_buf);
    writer.write_all(encoded).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Read a single varint-length-prefixed frame, capped at `MAX_FRAME_LEN`.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>, ProtocolNegotiationError> {
    let mut len_buf = Vec::with_capacity(10);
    let len = loop {
        let mut byte = [0u8; 1];
        reader
            .read_exact(&mut byte)
            .await
            .map_err(|e| ProtocolNegotiationError::Io(e.to_string()))?;
        len_buf.push(byte[0]);
        match unsigned_varint::decode::usize(&len_buf) {
            Ok((len, _)) => break len,
            Err(unsigned_varint::decode::Error::Insufficient) => continue,
            Err(_) => return Err(ProtocolNegotiationError::Malformed),
        }
    };

    if len > MAX_FRAME_LEN {
        return Err(ProtocolNegotiationError::Malformed);
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| ProtocolNegotiationError::Io(e.to_string()))?;
    Ok(payload)
}

/// Opener side of protocol negotiation: propose `protocol`, succeed only
/// if the acceptor echoes it back.
pub async fn negotiate_outbound<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    protocol: &ProtocolId,
) -> Result<(), ProtocolNegotiationError> {
    let wanted = protocol.to_string();
    write_frame(stream, wanted.as_bytes())
        .await
        .map_err(|e| ProtocolNegotiationError::Io(e.to_string()))?;

    let response = read_frame(stream).await?;
    if response == wanted.as_bytes() {
        Ok(())
    } else {
        Err(ProtocolNegotiationError::Rejected(wanted))
    }
}

/// Acceptor side: read the proposed protocol, echo it back if it is in
/// `supported`, otherwise reply `"na"` and return the rejection.
pub async fn negotiate_inbound<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    supported: &[ProtocolId],
) -> Result<ProtocolId, ProtocolNegotiationError> {
    let requested_bytes = read_frame(stream).await?;
    let requested = std::str::from_utf8(&requested_bytes)
        .map_err(|_| ProtocolNegotiationError::Malformed)?
        .parse::<ProtocolId>()
        .map_err(|_| ProtocolNegotiationError::Malformed)?;

    if supported.contains(&requested) {
        write_frame(stream, requested_bytes.as_slice())
            .await
            .map_err(|e| ProtocolNegotiationError::Io(e.to_string()))?;
        Ok(requested)
    } else {
        write_frame(stream, NOT_AVAILABLE)
            .await
            .map_err(|e| ProtocolNegotiationError::Io(e.to_string()))?;
        Err(ProtocolNegotiationError::Rejected(requested.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn frame_roundtrips_over_duplex_pipe() {
        let (mut a, mut b) = duplex(1024);
        write_frame(&mut a, b"hello").await.unwrap();
        let got = read_frame(&mut b).await.unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn negotiation_succeeds_for_supported_protocol() {
        let (mut initiator, mut acceptor) = duplex(4096);
        let protocol = ProtocolId::system("identify", "1.0");
        let supported = vec![protocol.clone()];

        let client = tokio::spawn(async move { negotiate_outbound(&mut initiator, &protocol).await });
        let server_result = negotiate_inbound(&mut acceptor, &supported).await;

        assert!(server_result.is_ok());
        assert!(client.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn negotiation_rejects_unsupported_protocol() {
        let (mut initiator, mut acceptor) = duplex(4096);
        let wanted = ProtocolId::system("holepunch", "1.0");
        let supported = vec![ProtocolId::system("identify", "1.0")];

        let client = tokio::spawn(async move { negotiate_outbound(&mut initiator, &wanted).await });
        let server_result = negotiate_inbound(&mut acceptor, &supported).await;

        assert!(server_result.is_err());
        assert!(client.await.unwrap().is_err());
    }
}
