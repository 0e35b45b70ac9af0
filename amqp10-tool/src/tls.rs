//! TLS client configuration for `amqps://` brokers

use std::sync::Arc;

use librustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{self, CryptoProvider},
    pki_types::{CertificateDer, ServerName, UnixTime},
    ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
};
use tokio_rustls::TlsConnector;

/// Whether the broker's certificate chain is validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateValidation {
    /// Validate against the bundled webpki trust anchors
    Verify,

    /// Accept any certificate the broker presents
    Skip,
}

impl CertificateValidation {
    pub fn from_insecure(insecure: bool) -> Self {
        if insecure {
            Self::Skip
        } else {
            Self::Verify
        }
    }
}

/// Builds the rustls client configuration
pub fn client_config(validation: CertificateValidation) -> Result<ClientConfig, librustls::Error> {
    let provider = Arc::new(crypto::ring::default_provider());
    let builder =
        ClientConfig::builder_with_provider(provider.clone()).with_safe_default_protocol_versions()?;

    let config = match validation {
        CertificateValidation::Verify => {
            let mut root_cert_store = RootCertStore::empty();
            root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder
                .with_root_certificates(root_cert_store)
                .with_no_client_auth()
        }
        CertificateValidation::Skip => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification::new(provider)))
            .with_no_client_auth(),
    };
    Ok(config)
}

/// Builds the connector handed to the connection builder
pub fn connector(validation: CertificateValidation) -> Result<TlsConnector, librustls::Error> {
    let config = client_config(validation)?;
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Accepts every server certificate.
///
/// Handshake signatures are still checked so that the peer must hold the key
/// of the certificate it presents.
#[derive(Debug)]
pub(crate) struct SkipServerVerification {
    provider: Arc<CryptoProvider>,
}

impl SkipServerVerification {
    pub(crate) fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, librustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, librustls::Error> {
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
    ) -> Result<HandshakeSignatureValid, librustls::Error> {
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
