//! HMAC-SHA256 primitives backing realm challenge-response auth (§4.13).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Compute `HMAC-SHA256(key, data)`.
pub fn compute(key: &[u8; 32], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Verify a tag in constant time. Returns `CryptoError::HmacMismatch` on
/// failure so callers propagate a single error type through the auth
/// handshake rather than branching on a bare bool.
pub fn verify(key: &[u8; 32], data: &[u8], tag: &[u8; 32]) -> Result<(), CryptoError> {
    let expected = compute(key, data);
    if expected.ct_eq(tag).into() {
        Ok(())
    } else {
        Err(CryptoError::HmacMismatch)
    }
}
