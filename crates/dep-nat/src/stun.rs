//! STUN probing (§4.8.1): parallel-probe a configured server list with a
//! short primary timeout and a longer fallback pass; whatever comes back
//! is reported as a **candidate only**, never verified by this module.

use std::net::SocketAddr;
use std::time::Duration;

use bytecodec::{DecodeExt, EncodeExt};
use rand::RngCore;
use stun_codec::rfc5389::attributes::XorMappedAddress;
use stun_codec::rfc5389::methods::BINDING;
use stun_codec::rfc5389::Attribute;
use stun_codec::{Message, MessageClass, MessageDecoder, MessageEncoder, TransactionId};
use tokio::net::UdpSocket;
use tracing::{debug, instrument, warn};

use crate::error::{NatError, NatResult};

/// Primary probe timeout (§4.8.1): short, so a dead server doesn't stall
/// the whole pass.
pub const PRIMARY_TIMEOUT: Duration = Duration::from_secs(3);
/// Fallback pass timeout, tried only against servers that didn't answer
/// in time during the primary pass.
pub const FALLBACK_TIMEOUT: Duration = Duration::from_secs(8);

fn new_binding_request() -> (Message<Attribute>, [u8; 12]) {
    let mut tx_id = [0u8; 12];
    rand::rng().fill_bytes(&mut tx_id);
    let message = Message::new(MessageClass::Request, BINDING, TransactionId::new(tx_id));
    (message, tx_id)
}

fn encode_request(message: &Message<Attribute>) -> NatResult<Vec<u8>> {
    let mut encoder = MessageEncoder::new();
    encoder
        .encode_into_bytes(message.clone())
        .map_err(|e| NatError::StunProtocol(e.to_string()))
}

fn decode_mapped_address(buf: &[u8], expected_tx: &TransactionId) -> NatResult<SocketAddr> {
    let mut decoder = MessageDecoder::<Attribute>::new();
    let decoded: Message<Attribute> = decoder
        .decode_from_bytes(buf)
        .map_err(|e| NatError::StunProtocol(e.to_string()))?
        .map_err(|e| NatError::StunProtocol(e.to_string()))?;

    if decoded.transaction_id() != *expected_tx {
        return Err(NatError::StunProtocol("transaction id mismatch".into()));
    }

    decoded
        .get_attribute::<XorMappedAddress>()
        .map(|a| a.address())
        .ok_or_else(|| NatError::StunProtocol("response had no XOR-MAPPED-ADDRESS".into()))
}

/// Probe a single STUN server for our externally-mapped address.
#[instrument(skip(socket))]
async fn probe_one(socket: &UdpSocket, server: SocketAddr, timeout: Duration) -> NatResult<SocketAddr> {
    let (message, tx_id) = new_binding_request();
    let request = encode_request(&message)?;
    let expected_tx = *message.transaction_id();

    socket.send_to(&request, server).await?;

    let mut buf = [0u8; 512];
    let (n, from) = tokio::time::timeout(timeout, socket.recv_from(&mut buf))
        .await
        .map_err(|_| NatError::StunUnreachable)??;
    if from != server {
        warn!(%server, %from, "STUN response from unexpected address, ignoring");
        return Err(NatError::StunProtocol("response from unexpected address".into()));
    }
    let _ = tx_id;

    decode_mapped_address(&buf[..n], &expected_tx)
}

/// Probe every server in `servers` concurrently on the primary timeout;
/// retry whatever didn't answer with the longer fallback timeout. Returns
/// the first mapped address obtained, if any — callers report it to the
/// Reachability Coordinator as a candidate, not a verified address.
#[instrument(skip(servers))]
pub async fn probe_external_address(servers: &[SocketAddr]) -> NatResult<SocketAddr> {
    if servers.is_empty() {
        return Err(NatError::StunUnreachable);
    }

    let socket = UdpSocket::bind("0.0.0.0:0").await?;

    let mut primary = Vec::with_capacity(servers.len());
    for &server in servers {
        primary.push(probe_one(&socket, server, PRIMARY_TIMEOUT).await);
    }
    if let Some(addr) = primary.iter().find_map(|r| r.as_ref().ok()) {
        return Ok(*addr);
    }

    debug!("primary STUN pass failed for all servers, retrying with fallback timeout");
    for &server in servers {
        if let Ok(addr) = probe_one(&socket, server, FALLBACK_TIMEOUT).await {
            return Ok(addr);
        }
    }

    Err(NatError::StunUnreachable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_request_round_trips_through_the_codec() {
        let (message, _tx) = new_binding_request();
        let bytes = encode_request(&message).unwrap();
        let mut decoder = MessageDecoder::<Attribute>::new();
        let decoded: Message<Attribute> = decoder.decode_from_bytes(&bytes).unwrap().unwrap();
        assert_eq!(decoded.transaction_id(), *message.transaction_id());
        assert_eq!(decoded.class(), MessageClass::Request);
    }

    #[tokio::test]
    async fn probing_an_empty_server_list_fails_fast() {
        let err = probe_external_address(&[]).await.unwrap_err();
        matches!(err, NatError::StunUnreachable);
    }
}
