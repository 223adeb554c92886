//! rustls client configuration from [`TlsOptions`].
//!
//! - `ca` replaces the default webpki roots
//! - `reject_unauthorized = false` skips chain validation (signatures are still checked)
//! - `cert` + `key` enable client authentication

use std::sync::Arc;

use dbwire_core::TlsOptions;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{self, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;

use crate::error::TransportError;

/// Build a connector for one connection attempt.
pub(super) fn connector(options: &TlsOptions) -> Result<TlsConnector, TransportError> {
    Ok(TlsConnector::from(Arc::new(client_config(options)?)))
}

/// Parse `host` as a TLS server name (DNS name or IP address).
pub(super) fn server_name(host: &str) -> Result<ServerName<'static>, TransportError> {
    ServerName::try_from(host.to_string())
        .map_err(|_| TransportError::Tls(format!("invalid server name: {host}")))
}

fn client_config(options: &TlsOptions) -> Result<ClientConfig, TransportError> {
    let provider = Arc::new(crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Tls(format!("tls protocol version error: {e}")))?;

    let builder = if options.verifies_peer() {
        builder.with_root_certificates(root_store(options.ca.as_deref())?)
    } else {
        tracing::warn!("TLS certificate verification disabled (reject_unauthorized = false)");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoChainVerifier { provider }))
    };

    match options.client_auth() {
        Some((cert, key)) => builder
            .with_client_auth_cert(load_certs(cert)?, load_private_key(key)?)
            .map_err(|e| TransportError::Tls(format!("invalid client certificate: {e}"))),
        None => Ok(builder.with_no_client_auth()),
    }
}

fn root_store(ca: Option<&str>) -> Result<RootCertStore, TransportError> {
    let Some(pem) = ca else {
        return Ok(RootCertStore::from_iter(
            webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
        ));
    };

    let mut roots = RootCertStore::empty();
    for cert in load_certs(pem)? {
        roots
            .add(cert)
            .map_err(|e| TransportError::Tls(format!("failed to add CA cert: {e}")))?;
    }
    Ok(roots)
}

fn load_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let certs = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::Tls(format!("invalid PEM certificate: {e}")))?;

    if certs.is_empty() {
        return Err(TransportError::Tls(
            "no certificates found in PEM data".to_string(),
        ));
    }
    Ok(certs)
}

fn load_private_key(pem: &str) -> Result<PrivateKeyDer<'static>, TransportError> {
    rustls_pemfile::private_key(&mut pem.as_bytes())
        .map_err(|e| TransportError::Tls(format!("invalid PEM private key: {e}")))?
        .ok_or_else(|| TransportError::Tls("no private key found in PEM data".to_string()))
}

/// Accepts any certificate chain but still verifies handshake signatures.
#[derive(Debug)]
struct NoChainVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoChainVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
