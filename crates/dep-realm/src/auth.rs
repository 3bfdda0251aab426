//! Realm Auth (§4.13): HMAC challenge-response over a freshly opened
//! stream on `/dep/realm/<id>/auth/1.0`. Run symmetrically in both
//! directions before either side grants membership to the other.

use dep_core::{NodeId, RealmId, RealmKey};
use dep_crypto::{hmac_compute, hmac_verify, Identity, PublicKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::error::{RealmError, RealmResult};

/// Domain-separation context for the infrastructure self-declaration
/// signature (§4.13.2), so it can never be confused with any other
/// signature this node produces.
const INFRA_DECLARATION_CONTEXT: &[u8] = b"dep-realm-infra-declaration-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
enum WireMessage {
    Request {
        realm_id: [u8; 32],
        is_infrastructure: bool,
        /// The sender's raw Ed25519 public key plus a signature over
        /// `INFRA_DECLARATION_CONTEXT || realm_id || is_infrastructure`,
        /// so the `is_infrastructure` claim is cryptographically bound to
        /// the sender's own identity rather than just asserted.
        public_key: [u8; 32],
        declaration_signature: [u8; 64],
    },
    Challenge {
        nonce: [u8; 32],
    },
    Response {
        mac: [u8; 32],
    },
    Ok,
    Failed {
        reason: String,
    },
}

fn infra_declaration_bytes(realm_id: &RealmId, is_infrastructure: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(INFRA_DECLARATION_CONTEXT.len() + 33);
    buf.extend_from_slice(INFRA_DECLARATION_CONTEXT);
    buf.extend_from_slice(realm_id.as_bytes());
    buf.push(is_infrastructure as u8);
    buf
}

/// What the responder learns once a handshake completes successfully.
#[derive(Debug, Clone, Copy)]
pub struct AuthOutcome {
    pub peer: NodeId,
    pub is_infrastructure: bool,
}

async fn send<S: AsyncWrite + Unpin>(stream: &mut S, msg: &WireMessage) -> RealmResult<()> {
    let bytes = postcard::to_allocvec(msg).expect("auth message always serializes");
    dep_transport::write_frame(stream, &bytes)
        .await
        .map_err(|e| RealmError::AuthFailed(e.to_string()))
}

async fn recv<S: AsyncRead + Unpin>(stream: &mut S) -> RealmResult<WireMessage> {
    let bytes = dep_transport::read_frame(stream)
        .await
        .map_err(|e| RealmError::AuthFailed(e.to_string()))?;
    postcard::from_bytes(&bytes).map_err(|e| RealmError::AuthFailed(e.to_string()))
}

/// A sends `REQUEST`, B's `CHALLENGE`, A's signed `RESPONSE`, B's
/// verdict — all from A's (the dialer's) side.
pub async fn run_initiator<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    realm_id: &RealmId,
    realm_key: &RealmKey,
    identity: &Identity,
    is_infrastructure: bool,
) -> RealmResult<AuthOutcome> {
    let declaration_signature = identity.sign(&infra_declaration_bytes(realm_id, is_infrastructure));
    send(
        stream,
        &WireMessage::Request {
            realm_id: *realm_id.as_bytes(),
            is_infrastructure,
            public_key: identity.public_key().as_bytes(),
            declaration_signature,
        },
    )
    .await?;

    let nonce = match recv(stream).await? {
        WireMessage::Challenge { nonce } => nonce,
        WireMessage::Failed { reason } => return Err(RealmError::AuthFailed(reason)),
        _ => return Err(RealmError::AuthFailed("unexpected message, expected challenge".into())),
    };

    let mac_input = mac_input(&identity.node_id(), realm_id, &nonce);
    let mac = hmac_compute(realm_key.as_bytes(), &mac_input);
    send(stream, &WireMessage::Response { mac }).await?;

    match recv(stream).await? {
        WireMessage::Ok => Ok(AuthOutcome {
            peer: identity.node_id(),
            is_infrastructure,
        }),
        WireMessage::Failed { reason } => Err(RealmError::AuthFailed(reason)),
        _ => Err(RealmError::AuthFailed("unexpected message, expected verdict".into())),
    }
}

/// B's side: receive A's `REQUEST`, issue a nonce, verify A's `RESPONSE`.
/// `expected_peer` is the `NodeId` the transport layer already
/// authenticated this stream's connection as belonging to (§4.2); the
/// request's embedded public key is checked against it so the auth
/// handshake can never be run against a different identity than the one
/// TLS bound the connection to.
pub async fn run_responder<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    realm_id: &RealmId,
    realm_key: &RealmKey,
    expected_peer: NodeId,
) -> RealmResult<AuthOutcome> {
    let (is_infrastructure, public_key) = match recv(stream).await? {
        WireMessage::Request {
            realm_id: got_realm_id,
            is_infrastructure,
            public_key,
            declaration_signature,
        } => {
            if got_realm_id != *realm_id.as_bytes() {
                let reason = "realm_id mismatch".to_string();
                send(stream, &WireMessage::Failed { reason: reason.clone() }).await.ok();
                return Err(RealmError::RealmMismatch);
            }

            let pk = PublicKey::from_bytes(&public_key)
                .map_err(|_| RealmError::AuthFailed("malformed public key".into()))?;
            if pk.node_id() != expected_peer {
                let reason = "declared public key does not match the authenticated connection".to_string();
                send(stream, &WireMessage::Failed { reason: reason.clone() }).await.ok();
                return Err(RealmError::AuthFailed(reason));
            }
            if !pk.verify(&infra_declaration_bytes(realm_id, is_infrastructure), &declaration_signature) {
                let reason = "infrastructure self-declaration signature invalid".to_string();
                send(stream, &WireMessage::Failed { reason: reason.clone() }).await.ok();
                return Err(RealmError::AuthFailed(reason));
            }

            (is_infrastructure, pk)
        }
        _ => return Err(RealmError::AuthFailed("expected request".into())),
    };

    let mut nonce = [0u8; 32];
    rand::rng().fill_bytes(&mut nonce);
    send(stream, &WireMessage::Challenge { nonce }).await?;

    let mac = match recv(stream).await? {
        WireMessage::Response { mac } => mac,
        _ => return Err(RealmError::AuthFailed("expected response".into())),
    };

    let mac_input = mac_input(&public_key.node_id(), realm_id, &nonce);
    match hmac_verify(realm_key.as_bytes(), &mac_input, &mac) {
        Ok(()) => {
            send(stream, &WireMessage::Ok).await?;
            debug!(peer = %expected_peer, is_infrastructure, "realm auth succeeded");
            Ok(AuthOutcome {
                peer: expected_peer,
                is_infrastructure,
            })
        }
        Err(_) => {
            warn!(peer = %expected_peer, "realm auth HMAC verification failed");
            let reason = "HMAC verification failed".to_string();
            send(stream, &WireMessage::Failed { reason: reason.clone() }).await.ok();
            Err(RealmError::AuthFailed(reason))
        }
    }
}

fn mac_input(node_id: &NodeId, realm_id: &RealmId, nonce: &[u8; 32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + 32 + 32);
    buf.extend_from_slice(node_id.as_bytes());
    buf.extend_from_slice(realm_id.as_bytes());
    buf.extend_from_slice(nonce);
    buf
}
