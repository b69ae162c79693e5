//! DNS tunnel outbound.
//!
//! The `protocol` field picks the variant; the well-known port follows it
//! (853 for DoT/DoQ, 443 for DoH, 53 otherwise) unless the config names one.
//! TLS variants get a TLS leg; the wire probe sends a length-prefixed empty
//! DNS header so middleboxes see plausible DoT framing right away.

use crate::outbound::{parse_options, tls_layer};
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use ut_core::{
    BoundOutbound, CoreError, HandshakeStrategy, NoopHandshake, OutboundConfig,
    ProtocolDescriptor,
};
use ut_transport::{Dialer, IoStream, TcpDialer};

#[derive(Debug, Default, Deserialize)]
struct DnsOptions {
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    resolver: Option<String>,
    #[serde(default)]
    bootstrap: Option<String>,
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor {
        id: "dns",
        default_port: 53,
        bind: Arc::new(bind),
    }
}

fn bind(options: &serde_json::Value) -> Result<BoundOutbound, CoreError> {
    let opts: DnsOptions = parse_options("dns", options)?;
    let variant = opts.protocol.as_deref().unwrap_or("tcp");

    let default_port = match variant {
        "dot" | "doq" => 853,
        "doh" => 443,
        "tcp" | "dnscrypt" | "slowdns" => 53,
        "udp" => {
            return Err(CoreError::invalid_config(
                "dns",
                "udp transport is not supported; use tcp or dot",
            ))
        }
        other => {
            return Err(CoreError::invalid_config(
                "dns",
                format!("unknown protocol {other:?}"),
            ))
        }
    };
    let config = OutboundConfig::bind("dns", default_port, options)?;

    if variant == "doh" && opts.url.is_none() {
        return Err(CoreError::invalid_config("dns", "url is required for doh"));
    }
    if opts.resolver.is_some() || opts.bootstrap.is_some() {
        tracing::debug!(
            resolver = opts.resolver.as_deref(),
            bootstrap = opts.bootstrap.as_deref(),
            "dns upstream configured"
        );
    }

    let mut dialer: Box<dyn Dialer> = Box::new(TcpDialer);
    let handshake: Arc<dyn HandshakeStrategy> = match variant {
        "dot" | "doq" => {
            let tls = config.tls.clone().unwrap_or_default();
            dialer = tls_layer("dns", dialer, &tls)?;
            Arc::new(WireProbe)
        }
        "doh" => {
            let tls = config.tls.clone().unwrap_or_default();
            dialer = tls_layer("dns", dialer, &tls)?;
            Arc::new(NoopHandshake)
        }
        "tcp" => Arc::new(WireProbe),
        _ => Arc::new(NoopHandshake),
    };

    Ok(BoundOutbound {
        config,
        dialer: Arc::from(dialer),
        handshake,
    })
}

/// Sends one length-prefixed empty DNS header (random id, RD set) and
/// leaves the stream open. Pure framing, no answer expected.
pub struct WireProbe;

/// Header only: id, flags, four zero counts.
const PROBE_LEN: u16 = 12;

#[async_trait]
impl HandshakeStrategy for WireProbe {
    fn name(&self) -> &'static str {
        "dns-wire-probe"
    }

    async fn perform(&self, mut stream: IoStream) -> Result<IoStream, CoreError> {
        let id: u16 = rand::thread_rng().gen();
        let mut msg = Vec::with_capacity(2 + PROBE_LEN as usize);
        msg.extend_from_slice(&PROBE_LEN.to_be_bytes());
        msg.extend_from_slice(&id.to_be_bytes());
        msg.extend_from_slice(&0x0100u16.to_be_bytes());
        msg.extend_from_slice(&[0u8; 8]);
        stream.write_all(&msg).await?;
        stream.flush().await?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::AsyncReadExt;
    use ut_transport::mem::DuplexDialer;

    #[test]
    fn variant_selects_default_port() {
        let bound = bind(&json!({ "server": "dns.example", "protocol": "dot" })).unwrap();
        assert_eq!(bound.config.port, 853);

        let bound = bind(&json!({ "server": "dns.example" })).unwrap();
        assert_eq!(bound.config.port, 53);

        let err = bind(&json!({ "server": "dns.example", "protocol": "udp" })).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }

    #[test]
    fn doh_requires_url() {
        let err = bind(&json!({ "server": "dns.example", "protocol": "doh" })).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn wire_probe_frames_an_empty_header() {
        let (dialer, mut peer) = DuplexDialer::new_pair();
        let stream = dialer.connect("x", 853).await.unwrap();

        WireProbe.perform(stream).await.unwrap();

        let mut buf = [0u8; 14];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..2], &[0x00, 0x0c]);
        // Flags: recursion desired, everything else clear.
        assert_eq!(&buf[4..6], &[0x01, 0x00]);
        assert_eq!(&buf[6..], &[0u8; 8]);
    }
}
