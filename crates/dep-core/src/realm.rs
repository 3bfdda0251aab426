//! Realm identity primitives (§3.4).
//!
//! `Psk` is the 32-byte shared secret a deployment is configured with;
//! `RealmId`/`RealmKey` are deterministically derived from it via HKDF-SHA256
//! so that every node holding the same PSK arrives at the same realm
//! namespace and the same authentication key without any coordination.

use std::fmt;
use std::str::FromStr;

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::IdentityError;

const REALM_ID_SALT: &[u8] = b"dep-realm-id-v1";
const REALM_KEY_SALT: &[u8] = b"dep-realm-key-v1";
const REALM_KEY_INFO: &[u8] = b"auth";

/// A 32-byte pre-shared secret. Never `Debug`/`Display`-printed; compared
/// in constant time.
#[derive(Clone)]
pub struct Psk([u8; 32]);

impl Psk {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Psk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Psk(<redacted>)")
    }
}

impl PartialEq for Psk {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}
impl Eq for Psk {}

/// Realm identifier, `HKDF-SHA256(ikm=PSK, salt="dep-realm-id-v1", info=SHA256(PSK))`.
///
/// Hex-encoded for display (§3.4); deterministic in the PSK alone.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RealmId([u8; 32]);

impl RealmId {
    pub fn derive(psk: &Psk) -> Self {
        let info = Sha256::digest(psk.as_bytes());
        let hk = Hkdf::<Sha256>::new(Some(REALM_ID_SALT), psk.as_bytes());
        let mut okm = [0u8; 32];
        hk.expand(&info, &mut okm)
            .expect("32 is a valid HKDF-SHA256 output length");
        Self(okm)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for RealmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for RealmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RealmId({})", self.to_hex())
    }
}

impl FromStr for RealmId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| IdentityError::InvalidFormat(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(IdentityError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

/// Key used only for the realm's HMAC challenge-response auth (§4.13),
/// `HKDF-SHA256(ikm=PSK, salt="dep-realm-key-v1", info="auth")`. Never used
/// for payload encryption.
#[derive(Clone)]
pub struct RealmKey([u8; 32]);

impl RealmKey {
    pub fn derive(psk: &Psk) -> Self {
        let hk = Hkdf::<Sha256>::new(Some(REALM_KEY_SALT), psk.as_bytes());
        let mut okm = [0u8; 32];
        hk.expand(REALM_KEY_INFO, &mut okm)
            .expect("32 is a valid HKDF-SHA256 output length");
        Self(okm)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for RealmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RealmKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_psk_same_realm_id() {
        let psk = Psk::new([5u8; 32]);
        assert_eq!(RealmId::derive(&psk), RealmId::derive(&psk));
    }

    #[test]
    fn different_psk_different_realm_id() {
        let a = RealmId::derive(&Psk::new([1u8; 32]));
        let b = RealmId::derive(&Psk::new([2u8; 32]));
        assert_ne!(a, b);
    }

    #[test]
    fn realm_id_and_key_are_independent() {
        let psk = Psk::new([9u8; 32]);
        let id = RealmId::derive(&psk);
        let key = RealmKey::derive(&psk);
        assert_ne!(id.as_bytes(), key.as_bytes());
    }

    #[test]
    fn realm_id_hex_roundtrip() {
        let id = RealmId::derive(&Psk::new([3u8; 32]));
        let s = id.to_hex();
        let parsed: RealmId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn psk_equality_is_constant_time_semantically() {
        let a = Psk::new([4u8; 32]);
        let b = Psk::new([4u8; 32]);
        let c = Psk::new([5u8; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
