//! TLS client configuration for device endpoints.
//!
//! Devices serve self-signed certificates, usually issued for a name other
//! than the one we dial. Two verification outcomes are therefore accepted:
//! an unknown issuer and a name mismatch. Every other certificate error
//! (expired, revoked, bad signature, wrong usage...) stays fatal, and
//! handshake signatures are always checked.

use std::sync::Arc;

use rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, Error, RootCertStore, SignatureScheme,
    client::{
        WebPkiServerVerifier,
        danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    },
    crypto::{CryptoProvider, WebPkiSupportedAlgorithms, ring},
    pki_types::{CertificateDer, Der, ServerName, TrustAnchor, UnixTime},
};
use trace_relay_core::TransportError;

/// Whether a certificate verification error is one we accept.
#[must_use]
pub fn is_tolerated(err: &Error) -> bool {
    matches!(
        err,
        Error::InvalidCertificate(
            CertificateError::UnknownIssuer
                | CertificateError::NotValidForName
                | CertificateError::NotValidForNameContext { .. }
        )
    )
}

/// Subject (`CN=trace-relay placeholder`) of an anchor that issues nothing.
const PLACEHOLDER_SUBJECT: &[u8] = &[
    0x31, 0x20, 0x30, 0x1e, 0x06, 0x03, 0x55, 0x04, 0x03, 0x0c, 0x17, b't', b'r', b'a', b'c', b'e',
    b'-', b'r', b'e', b'l', b'a', b'y', b' ', b'p', b'l', b'a', b'c', b'e', b'h', b'o', b'l', b'd',
    b'e', b'r',
];

/// Ed25519 key info with an all-zero key; never used to verify anything.
const PLACEHOLDER_SPKI: &[u8] = &[
    0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Anchor that no certificate chains to. webpki refuses an empty root
/// store; with only this anchor it still runs the encoding, validity and
/// usage checks and then reports an unknown issuer.
fn placeholder_anchor() -> TrustAnchor<'static> {
    TrustAnchor {
        subject: Der::from_slice(PLACEHOLDER_SUBJECT),
        subject_public_key_info: Der::from_slice(PLACEHOLDER_SPKI),
        name_constraints: None,
    }
}

/// Server certificate verifier that accepts untrusted issuers and name
/// mismatches.
#[derive(Debug)]
pub struct TolerantVerifier {
    inner: Arc<WebPkiServerVerifier>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl TolerantVerifier {
    /// Build a verifier over `roots`.
    ///
    /// # Errors
    /// Returns error if the underlying webpki verifier cannot be built.
    pub fn new(
        mut roots: RootCertStore,
        provider: &Arc<CryptoProvider>,
    ) -> Result<Self, TransportError> {
        if roots.is_empty() {
            tracing::warn!("No trust anchors loaded; all server certificates are untrusted");
            roots.roots.push(placeholder_anchor());
        }
        let inner =
            WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(provider))
                .build()
                .map_err(|e| TransportError::Tls(e.to_string()))?;
        Ok(Self {
            inner,
            algorithms: provider.signature_verification_algorithms,
        })
    }
}

impl ServerCertVerifier for TolerantVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        let result = self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        );
        match result {
            Ok(verified) => Ok(verified),
            Err(e) if is_tolerated(&e) => {
                tracing::debug!(?server_name, "Accepting server certificate despite: {e}");
                Ok(ServerCertVerified::assertion())
            }
            Err(e) => Err(e),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Platform trust anchors; unreadable entries are logged and skipped.
#[must_use]
pub fn native_roots() -> RootCertStore {
    let result = rustls_native_certs::load_native_certs();
    for e in &result.errors {
        tracing::debug!("Skipping native certificate source: {e}");
    }
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(result.certs);
    tracing::debug!(added, ignored, "Loaded native trust anchors");
    roots
}

/// Client configuration using the tolerant verifier over `roots`.
///
/// # Errors
/// Returns error if the protocol versions or verifier cannot be configured.
pub fn client_config(roots: RootCertStore) -> Result<ClientConfig, TransportError> {
    let provider = Arc::new(ring::default_provider());
    let verifier = TolerantVerifier::new(roots, &provider)?;
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(config)
}
