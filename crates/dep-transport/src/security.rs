//! TLS 1.3 identity binding (§4.2).
//!
//! Every node carries a single self-signed certificate whose subject
//! public key *is* its Ed25519 identity key, with that same key embedded
//! a second time in a custom extension (OID `1.3.6.1.4.1.53594.1.1`) so a
//! verifier can recover the peer's `NodeId` without assuming anything
//! about the certificate's key type. There is no CA: trust comes from the
//! peer already knowing (or later verifying through the realm/DHT layer)
//! the `NodeId` it expects to see.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dep_core::NodeId;
use dep_crypto::Identity;
use rcgen::{CertificateParams, CustomExtension, DistinguishedName, DnType, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, UnixTime};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::SecurityError;

/// IANA-unassigned vendor arc, fixed for this deployment.
pub const PUBKEY_EXTENSION_OID: &[u64] = &[1, 3, 6, 1, 4, 1, 53594, 1, 1];

const CERT_VALIDITY: Duration = Duration::from_secs(365 * 24 * 3600);

/// A generated identity certificate plus the DER-encoded private key
/// rustls needs alongside it.
pub struct IdentityCertificate {
    pub cert_der: CertificateDer<'static>,
    pub key_der: PrivateKeyDer<'static>,
}

/// Build the self-signed, identity-bound certificate for `identity`.
pub fn generate_identity_certificate(
    identity: &Identity,
) -> Result<IdentityCertificate, SecurityError> {
    let pkcs8 = identity.to_pkcs8_der();
    let key_pair = KeyPair::from_pkcs8_der(&pkcs8)
        .or_else(|_| KeyPair::try_from(pkcs8.as_slice()))
        .map_err(|e| SecurityError::CertGeneration(e.to_string()))?;

    let mut params = CertificateParams::new(Vec::new())
        .map_err(|e| SecurityError::CertGeneration(e.to_string()))?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, identity.node_id().to_base58());
    params.distinguished_name = dn;

    params.not_before = time::OffsetDateTime::now_utc();
    params.not_after = params.not_before + CERT_VALIDITY;

    params.custom_extensions.push(CustomExtension::from_oid_content(
        PUBKEY_EXTENSION_OID,
        identity.public_key().as_bytes().to_vec(),
    ));

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| SecurityError::CertGeneration(e.to_string()))?;

    Ok(IdentityCertificate {
        cert_der: cert.der().clone(),
        key_der: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
    })
}

/// Parse a peer's certificate, recovering the `NodeId` it asserts.
///
/// Checks, in order: the public-key extension is present and 32 bytes
/// (`NoPublicKeyExtension` / `InvalidPublicKey`), and if `expected` is
/// `Some`, that the derived `NodeId` matches it (`PeerMismatch`).
pub fn verify_peer_certificate(
    cert_der: &CertificateDer<'_>,
    expected: Option<&NodeId>,
) -> Result<NodeId, SecurityError> {
    let (_, cert) = X509Certificate::from_der(cert_der.as_ref())
        .map_err(|e| SecurityError::InvalidPublicKey(e.to_string()))?;

    let ext = cert
        .extensions()
        .iter()
        .find(|e| e.oid.iter().map(|it| it.collect::<Vec<_>>()) == Some(PUBKEY_EXTENSION_OID.to_vec()))
        .ok_or(SecurityError::NoPublicKeyExtension)?;

    let raw = ext.value;
    if raw.len() != 32 {
        return Err(SecurityError::InvalidPublicKey(format!(
            "expected 32-byte key in extension, got {}",
            raw.len()
        )));
    }
    let mut pk = [0u8; 32];
    pk.copy_from_slice(raw);

    let node_id = NodeId::from_public_key_bytes(&pk);

    if let Some(expected) = expected {
        if &node_id != expected {
            return Err(SecurityError::PeerMismatch {
                got: node_id.to_base58(),
                expected: expected.to_base58(),
            });
        }
    }

    Ok(node_id)
}

/// Certificate verifier used on the dialling side, once the remote
/// `NodeId` is known ahead of time (§4.2 `client_config`).
#[derive(Debug)]
pub struct ExpectedPeerVerifier {
    expected: NodeId,
    supported: rustls::crypto::WebPkiSupportedAlgorithms,
}

impl ExpectedPeerVerifier {
    pub fn new(expected: NodeId) -> Arc<Self> {
        Arc::new(Self {
            expected,
            supported: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        })
    }
}

impl rustls::client::danger::ServerCertVerifier for ExpectedPeerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        verify_peer_certificate(end_entity, Some(&self.expected))
            .map(|_| rustls::client::danger::ServerCertVerified::assertion())
            .map_err(|e| rustls::Error::General(e.to_string()))
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.supported)
            .map(|_| rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.supported)
            .map(|_| rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.supported.supported_schemes()
    }
}

/// Client certificate verifier used on the accepting side: any
/// structurally valid identity-bound certificate is accepted (the
/// connection gater, not TLS, decides whether a given `NodeId` may
/// connect — §4.6.3).
#[derive(Debug)]
pub struct AnyIdentityVerifier {
    supported: rustls::crypto::WebPkiSupportedAlgorithms,
}

impl AnyIdentityVerifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            supported: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        })
    }
}

impl rustls::server::danger::ClientCertVerifier for AnyIdentityVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn root_hint_subjects(&self) -> &[rustls::DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<rustls::server::danger::ClientCertVerified, rustls::Error> {
        verify_peer_certificate(end_entity, None)
            .map(|_| rustls::server::danger::ClientCertVerified::assertion())
            .map_err(|e| rustls::Error::General(e.to_string()))
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.supported)
            .map(|_| rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.supported)
            .map(|_| rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.supported.supported_schemes()
    }
}

/// Plain rustls server config: client auth required, no CA (§4.2
/// `server_config`). Shared by the QUIC and TCP transports.
pub fn server_tls_config(identity: &Identity) -> Result<rustls::ServerConfig, SecurityError> {
    let cert = generate_identity_certificate(identity)?;
    rustls::ServerConfig::builder()
        .with_client_cert_verifier(AnyIdentityVerifier::new())
        .with_single_cert(vec![cert.cert_der], cert.key_der)
        .map_err(|e| SecurityError::Tls(e.to_string()))
}

/// Plain rustls client config verifying against `expected_peer` (§4.2
/// `client_config`). Shared by the QUIC and TCP transports.
pub fn client_tls_config(
    identity: &Identity,
    expected_peer: NodeId,
) -> Result<rustls::ClientConfig, SecurityError> {
    let cert = generate_identity_certificate(identity)?;
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(ExpectedPeerVerifier::new(expected_peer))
        .with_client_auth_cert(vec![cert.cert_der], cert.key_der)
        .map_err(|e| SecurityError::Tls(e.to_string()))
}

/// Recover the peer's `NodeId` from an established connection's peer
/// certificates, as surfaced by the muxer/registry layer after handshake.
pub fn node_id_from_peer_certs(
    certs: &[CertificateDer<'_>],
    expected: Option<&NodeId>,
) -> Result<NodeId, SecurityError> {
    let cert = certs.first().ok_or(SecurityError::NoCertificate)?;
    verify_peer_certificate(cert, expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_embeds_recoverable_node_id() {
        let identity = Identity::generate();
        let cert = generate_identity_certificate(&identity).unwrap();
        let node_id = verify_peer_certificate(&cert.cert_der, None).unwrap();
        assert_eq!(node_id, identity.node_id());
    }

    #[test]
    fn mismatched_expected_peer_is_rejected() {
        let identity = Identity::generate();
        let cert = generate_identity_certificate(&identity).unwrap();
        let other = Identity::generate().node_id();
        let err = verify_peer_certificate(&cert.cert_der, Some(&other)).unwrap_err();
        matches!(err, SecurityError::PeerMismatch { .. });
    }

    #[test]
    fn matching_expected_peer_succeeds() {
        let identity = Identity::generate();
        let cert = generate_identity_certificate(&identity).unwrap();
        let node_id = verify_peer_certificate(&cert.cert_der, Some(&identity.node_id())).unwrap();
        assert_eq!(node_id, identity.node_id());
    }
}
