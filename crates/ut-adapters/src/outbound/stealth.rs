//! Steganographic-transport outbound.
//!
//! The carrier encodings themselves are out of scope; the transport is TLS
//! to the stealth server with the configured TLS knobs, and the variant is
//! validated at bind time so typos fail before any dial.

use crate::outbound::{parse_options, tls_layer};
use serde::Deserialize;
use std::sync::Arc;
use ut_core::{BoundOutbound, CoreError, NoopHandshake, OutboundConfig, ProtocolDescriptor};
use ut_transport::{Dialer, TcpDialer};

const VARIANTS: &[&str] = &[
    "steganographic",
    "icmp-tunnel",
    "dns-tunnel",
    "email-tunnel",
    "image-steganography",
    "audio-steganography",
    "carrier-steganography",
];

#[derive(Debug, Default, Deserialize)]
struct StealthOptions {
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    key: Option<String>,
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor {
        id: "stealth",
        default_port: 443,
        bind: Arc::new(bind),
    }
}

fn bind(options: &serde_json::Value) -> Result<BoundOutbound, CoreError> {
    let config = OutboundConfig::bind("stealth", 443, options)?;
    let opts: StealthOptions = parse_options("stealth", options)?;

    let variant = opts.protocol.as_deref().unwrap_or("steganographic");
    if !VARIANTS.contains(&variant) {
        return Err(CoreError::invalid_config(
            "stealth",
            format!("unknown protocol {variant:?}"),
        ));
    }
    if opts.key.as_deref().unwrap_or("").is_empty() {
        return Err(CoreError::invalid_config("stealth", "key is required"));
    }

    let tls = config.tls.clone().unwrap_or_default();
    let dialer = tls_layer("stealth", Box::new(TcpDialer) as Box<dyn Dialer>, &tls)?;

    Ok(BoundOutbound {
        config,
        dialer: Arc::from(dialer),
        handshake: Arc::new(NoopHandshake),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variant_and_key_are_validated() {
        let bound = bind(&json!({ "server": "img.example", "key": "k" })).unwrap();
        assert_eq!(bound.config.port, 443);

        let err = bind(&json!({ "server": "img.example", "key": "k", "protocol": "pigeon" }))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));

        let err = bind(&json!({ "server": "img.example" })).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }
}
