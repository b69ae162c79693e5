//! Protocol family modules and shared binding helpers.

pub mod direct;
pub mod dns;
pub mod httpinject;
pub mod legacyvpn;
pub mod obfs;
pub mod psiphon;
pub mod ssh;
pub mod stealth;
pub mod warp;

use serde::de::DeserializeOwned;
use ut_core::{CoreError, TlsOptions};
use ut_transport::{Dialer, TlsDialer};

/// Deserialize the protocol-specific slice of the options blob. Envelope
/// fields live beside protocol fields in the same object, so this never
/// rejects unknown keys.
pub(crate) fn parse_options<T: DeserializeOwned>(
    protocol: &str,
    options: &serde_json::Value,
) -> Result<T, CoreError> {
    serde_json::from_value(options.clone())
        .map_err(|e| CoreError::invalid_config(protocol, e.to_string()))
}

/// Wrap `inner` in a TLS layer built from the outbound's TLS options.
/// Config problems (bad CA pem) surface at bind time as `InvalidConfig`.
pub(crate) fn tls_layer(
    protocol: &str,
    inner: Box<dyn Dialer>,
    tls: &TlsOptions,
) -> Result<Box<dyn Dialer>, CoreError> {
    let config = ut_transport::tls::client_config(tls.ca_pem.as_deref(), tls.insecure)
        .map_err(|e| CoreError::invalid_config(protocol, e.to_string()))?;
    let mut dialer = TlsDialer::new(inner, config);
    if let Some(sni) = &tls.server_name {
        dialer = dialer.with_sni(sni.clone());
    }
    let alpn = tls.alpn_protocols();
    if !alpn.is_empty() {
        dialer = dialer.with_alpn(alpn);
    }
    Ok(Box::new(dialer))
}
