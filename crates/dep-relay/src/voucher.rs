//! Reservation vouchers: proof, signed by the relay's own key, that a
//! client held a valid reservation as of some expiry time. A client
//! presents its voucher to a third party (e.g. during hole-punch
//! signaling) so the third party can trust "this relay vouches for this
//! client" without asking the relay directly.

use chrono::{DateTime, Utc};
use dep_core::NodeId;
use dep_crypto::{Identity, PublicKey};
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VoucherBody {
    client_id: NodeId,
    relay_id: NodeId,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    body: VoucherBody,
    signature: [u8; 64],
}

impl Voucher {
    pub fn issue(relay: &Identity, client_id: NodeId, ttl: chrono::Duration) -> Self {
        let body = VoucherBody {
            client_id,
            relay_id: relay.node_id(),
            expires_at: Utc::now() + ttl,
        };
        let signature = relay.sign(&Self::signing_bytes(&body));
        Self { body, signature }
    }

    fn signing_bytes(body: &VoucherBody) -> Vec<u8> {
        postcard::to_allocvec(body).expect("voucher body always serializes")
    }

    pub fn client_id(&self) -> NodeId {
        self.body.client_id
    }

    pub fn relay_id(&self) -> NodeId {
        self.body.relay_id
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.body.expires_at
    }

    /// Verify the signature against the relay's known public key and
    /// check the voucher hasn't expired.
    pub fn verify(&self, relay_public_key: &PublicKey) -> RelayResult<()> {
        if relay_public_key.node_id() != self.body.relay_id {
            return Err(RelayError::InvalidVoucher);
        }
        if !relay_public_key.verify(&Self::signing_bytes(&self.body), &self.signature) {
            return Err(RelayError::InvalidVoucher);
        }
        if self.is_expired() {
            return Err(RelayError::VoucherExpired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_id() -> NodeId {
        NodeId::from_public_key_bytes(&[3u8; 32])
    }

    #[test]
    fn voucher_verifies_under_the_issuing_relay() {
        let relay = Identity::generate();
        let voucher = Voucher::issue(&relay, client_id(), chrono::Duration::hours(1));
        assert!(voucher.verify(&relay.public_key()).is_ok());
    }

    #[test]
    fn voucher_rejects_wrong_relay_key() {
        let relay = Identity::generate();
        let impostor = Identity::generate();
        let voucher = Voucher::issue(&relay, client_id(), chrono::Duration::hours(1));
        assert!(matches!(voucher.verify(&impostor.public_key()), Err(RelayError::InvalidVoucher)));
    }

    #[test]
    fn expired_voucher_is_rejected() {
        let relay = Identity::generate();
        let voucher = Voucher::issue(&relay, client_id(), chrono::Duration::seconds(-1));
        assert!(matches!(voucher.verify(&relay.public_key()), Err(RelayError::VoucherExpired)));
    }
}
