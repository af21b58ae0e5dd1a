//! rustls client configuration and handshakes

use proxyhop_config::{ConfigError, TlsOptions};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::error::TunnelError;

/// Build a rustls client config from options.
///
/// The ring provider is selected explicitly so the result does not depend on
/// a process-wide default being installed.
pub fn client_config(options: &TlsOptions) -> Result<Arc<ClientConfig>, ConfigError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ConfigError::Tls(e.to_string()))?;

    let mut config = if options.danger_accept_invalid_certs {
        warn!("TLS certificate verification disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(SkipVerification::new(provider))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();

        if options.use_webpki_roots {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        for cert_der in &options.root_certs {
            roots
                .add(CertificateDer::from(cert_der.clone()))
                .map_err(|e| ConfigError::Tls(format!("Invalid root cert: {}", e)))?;
        }

        if roots.is_empty() {
            return Err(ConfigError::Tls(
                "No trust anchors: enable webpki roots or add root certificates".to_string(),
            ));
        }

        builder.with_root_certificates(roots).with_no_client_auth()
    };

    config.alpn_protocols = options
        .alpn_protocols
        .iter()
        .map(|s| s.as_bytes().to_vec())
        .collect();

    Ok(Arc::new(config))
}

/// Run a client handshake over `stream` with SNI and verification bound to `host`
pub async fn handshake<S>(
    connector: &TlsConnector,
    host: &str,
    stream: S,
) -> Result<TlsStream<S>, TunnelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| TunnelError::InvalidServerName(host.to_string()))?;

    debug!("TLS handshake with {}", host);

    connector
        .connect(server_name, stream)
        .await
        .map_err(|source| TunnelError::TlsHandshakeFailed {
            host: host.to_string(),
            source,
        })
}

// Certificate verifier that skips verification (INSECURE - only for testing!)
// Signatures are still checked so the handshake itself stays well-formed.
#[derive(Debug)]
struct SkipVerification {
    provider: Arc<CryptoProvider>,
}

impl SkipVerification {
    fn new(provider: Arc<CryptoProvider>) -> Arc<Self> {
        Arc::new(Self { provider })
    }
}

impl ServerCertVerifier for SkipVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
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
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_build() {
        let config = client_config(&TlsOptions::default()).unwrap();
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn test_alpn_protocols_applied() {
        let options = TlsOptions::default()
            .with_alpn_protocols(vec!["h2".to_string(), "http/1.1".to_string()]);
        let config = client_config(&options).unwrap();

        assert_eq!(
            config.alpn_protocols,
            vec![b"h2".to_vec(), b"http/1.1".to_vec()]
        );
    }

    #[test]
    fn test_invalid_root_cert_rejected() {
        let options = TlsOptions::default()
            .with_webpki_roots(false)
            .with_root_cert(vec![0x30, 0x03, 0x01, 0x01, 0xff]);

        assert!(matches!(client_config(&options), Err(ConfigError::Tls(_))));
    }

    #[test]
    fn test_empty_trust_store_rejected() {
        let options = TlsOptions::default().with_webpki_roots(false);
        assert!(client_config(&options).is_err());

        // Unless verification is off entirely
        let options = options.with_insecure_skip_verify();
        assert!(client_config(&options).is_ok());
    }
}
