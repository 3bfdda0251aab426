//! Node identity: Ed25519 key pair, `NodeId` derivation, signing (§4.1).

use std::fmt;

use dep_core::NodeId;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// An Ed25519 public key, 32 raw bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::from_public_key_bytes(&self.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            })
    }

    /// Verify a signature over `data` produced by the matching private key.
    pub fn verify(&self, data: &[u8], signature: &[u8; 64]) -> bool {
        let sig = Signature::from_bytes(signature);
        self.0.verify(data, &sig).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.node_id().short_id())
    }
}

/// A node's private/public key pair. Generation uses the OS CSPRNG;
/// the private key never leaves this type (no `Debug`, no serialization).
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generate a fresh identity with a cryptographically secure RNG.
    ///
    /// `ed25519_dalek::SigningKey::generate` bounds its RNG on
    /// `rand_core` 0.6's `CryptoRngCore`, while the rest of this
    /// workspace is on `rand` 0.9 (a `rand_core` 0.9 consumer) — the two
    /// major versions aren't trait-compatible, so the seed is drawn
    /// directly from the OS CSPRNG via `rand::rng()` instead of handing
    /// dalek an RNG to drive itself.
    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        rand::rng().fill_bytes(seed.as_mut());
        let signing_key = SigningKey::from_bytes(&seed);
        Self { signing_key }
    }

    /// Load from a 64-byte Ed25519 secret key (32-byte seed || 32-byte
    /// public key, the same layout as Go's `crypto/ed25519` and the format
    /// persisted at `<data_dir>/identity.key`, §6.2).
    pub fn load_from_bytes(raw: &[u8]) -> Result<Self, CryptoError> {
        if raw.len() != 64 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 64,
                actual: raw.len(),
            });
        }
        let mut buf = Zeroizing::new([0u8; 64]);
        buf.copy_from_slice(raw);
        let signing_key =
            SigningKey::from_keypair_bytes(&buf).map_err(|_| CryptoError::InvalidKeyLength {
                expected: 64,
                actual: raw.len(),
            })?;
        Ok(Self { signing_key })
    }

    /// The 64-byte form suitable for persistence (§6.2).
    pub fn to_bytes(&self) -> [u8; 64] {
        self.signing_key.to_keypair_bytes()
    }

    /// PKCS#8 DER encoding of the private key, for handing to `rcgen` when
    /// building the self-signed identity certificate (§4.2).
    pub fn to_pkcs8_der(&self) -> Vec<u8> {
        use ed25519_dalek::pkcs8::EncodePrivateKey;
        self.signing_key
            .to_pkcs8_der()
            .expect("ed25519 key always encodes")
            .as_bytes()
            .to_vec()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key())
    }

    pub fn node_id(&self) -> NodeId {
        self.public_key().node_id()
    }

    /// Sign arbitrary bytes. Pure with respect to `data`: same key, same
    /// data, same signature (Ed25519 is deterministic).
    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        self.signing_key.sign(data).to_bytes()
    }

    /// Verify a signature against a peer's public key (free function form,
    /// useful when the caller only has key bytes, not an `Identity`).
    pub fn verify(peer_public_key: &PublicKey, data: &[u8], signature: &[u8; 64]) -> bool {
        peer_public_key.verify(data, signature)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.node_id().short_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verifies_under_own_public_key() {
        let id = Identity::generate();
        let data = b"hello realm";
        let sig = id.sign(data);
        assert!(Identity::verify(&id.public_key(), data, &sig));
    }

    #[test]
    fn tampered_data_fails_verification() {
        let id = Identity::generate();
        let sig = id.sign(b"hello");
        assert!(!Identity::verify(&id.public_key(), b"goodbye", &sig));
    }

    #[test]
    fn node_id_matches_sha256_of_public_key() {
        let id = Identity::generate();
        let expected = NodeId::from_public_key_bytes(&id.public_key().as_bytes());
        assert_eq!(id.node_id(), expected);
    }

    #[test]
    fn roundtrip_through_bytes() {
        let id = Identity::generate();
        let bytes = id.to_bytes();
        let reloaded = Identity::load_from_bytes(&bytes).unwrap();
        assert_eq!(id.node_id(), reloaded.node_id());
        let sig = reloaded.sign(b"data");
        assert!(Identity::verify(&id.public_key(), b"data", &sig));
    }

    #[test]
    fn rejects_wrong_length() {
        let err = Identity::load_from_bytes(&[0u8; 32]).unwrap_err();
        matches!(err, CryptoError::InvalidKeyLength { expected: 64, actual: 32 });
    }

    #[test]
    fn different_keys_different_ids() {
        let a = Identity::generate();
        let b = Identity::generate();
        assert_ne!(a.node_id(), b.node_id());
    }
}
