//! TLS dialer decorator.
//!
//! Wraps any inner [`Dialer`] and runs a rustls client handshake over the
//! established stream. The SNI override is what makes domain fronting work:
//! the handshake presents `sni_override` while the inner dialer connects to
//! the real backend.

use super::dialer::{DialError, Dialer, IoStream};
use async_trait::async_trait;
use std::sync::Arc;

/// Decorator adding a TLS layer over any inner dialer.
pub struct TlsDialer<D: Dialer> {
    pub inner: D,
    pub config: Arc<rustls::ClientConfig>,
    /// SNI to present instead of the dialed host (fronting).
    pub sni_override: Option<String>,
    pub alpn: Option<Vec<Vec<u8>>>,
}

impl<D: Dialer> TlsDialer<D> {
    pub fn new(inner: D, config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            inner,
            config,
            sni_override: None,
            alpn: None,
        }
    }

    #[must_use]
    pub fn with_sni(mut self, sni: impl Into<String>) -> Self {
        self.sni_override = Some(sni.into());
        self
    }

    #[must_use]
    pub fn with_alpn(mut self, alpn: Vec<Vec<u8>>) -> Self {
        self.alpn = Some(alpn);
        self
    }
}

#[async_trait]
impl<D: Dialer + Send + Sync> Dialer for TlsDialer<D> {
    async fn connect(&self, host: &str, port: u16) -> Result<IoStream, DialError> {
        use rustls::pki_types::ServerName;
        use tokio_rustls::TlsConnector;

        let stream = self.inner.connect(host, port).await?;

        let sni_host = self.sni_override.as_deref().unwrap_or(host);
        let server_name = ServerName::try_from(sni_host.to_string())
            .map_err(|e| DialError::Tls(format!("invalid SNI host {sni_host:?}: {e}")))?;

        let config = if let Some(alpn) = &self.alpn {
            let mut c = (*self.config).clone();
            c.alpn_protocols = alpn.clone();
            Arc::new(c)
        } else {
            self.config.clone()
        };

        let connector = TlsConnector::from(config);
        let tls = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| DialError::Tls(format!("handshake with {sni_host}: {e}")))?;
        tracing::debug!(host, port, sni = sni_host, "tls established");
        Ok(Box::new(tls))
    }
}

/// Build a client config from the usual outbound TLS knobs.
///
/// Root trust comes from the webpki bundle; `ca_pem` adds extra anchors;
/// `insecure` disables verification entirely (testing against self-signed
/// servers — the caller is expected to have warned loudly already).
pub fn client_config(ca_pem: Option<&str>, insecure: bool) -> Result<Arc<rustls::ClientConfig>, DialError> {
    if insecure {
        let config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(danger::NoVerify::new()))
            .with_no_client_auth();
        return Ok(Arc::new(config));
    }

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(pem) = ca_pem {
        let mut reader = std::io::Cursor::new(pem.as_bytes());
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|e| DialError::Tls(format!("bad CA pem: {e}")))?;
            roots
                .add(cert)
                .map_err(|e| DialError::Tls(format!("unusable CA cert: {e}")))?;
        }
    }

    Ok(Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    ))
}

mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::CryptoProvider;
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};

    /// Certificate verifier that accepts everything. Signature checks are
    /// still delegated to the provider so the handshake stays well-formed.
    #[derive(Debug)]
    pub(super) struct NoVerify {
        provider: CryptoProvider,
    }

    impl NoVerify {
        pub(super) fn new() -> Self {
            Self {
                provider: rustls::crypto::ring::default_provider(),
            }
        }
    }

    impl ServerCertVerifier for NoVerify {
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
            dss: &rustls::DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls12_signature(
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
            dss: &rustls::DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls13_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.provider
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_config_builds() {
        let config = client_config(None, false).unwrap();
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn insecure_config_builds() {
        client_config(None, true).unwrap();
    }

    #[test]
    fn bad_ca_pem_is_rejected() {
        let err = client_config(Some("not a pem"), false);
        // rustls-pemfile silently skips garbage that never starts a block;
        // an empty result is acceptable, a parse error must map to Tls.
        if let Err(e) = err {
            assert!(matches!(e, DialError::Tls(_)));
        }
    }
}
