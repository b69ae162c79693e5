//! Obfuscated-transport outbounds: obfs4 and meek.
//!
//! obfs4 sends a node-id/public-key hello after connect. meek is pure
//! domain fronting: TLS to the real backend while presenting the fronting
//! domain as SNI, no post-connect exchange.

use crate::outbound::{parse_options, tls_layer};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use ut_core::{
    BoundOutbound, CoreError, HandshakeStrategy, NoopHandshake, OutboundConfig,
    ProtocolDescriptor,
};
use ut_transport::{Dialer, IoStream, TcpDialer};

#[derive(Debug, Default, Deserialize)]
struct ObfsOptions {
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    public_key: Option<String>,
    #[serde(default)]
    fronting_domain: Option<String>,
}

pub fn obfs4_descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor {
        id: "obfs4",
        default_port: 443,
        bind: Arc::new(bind_obfs4),
    }
}

fn bind_obfs4(options: &serde_json::Value) -> Result<BoundOutbound, CoreError> {
    let config = OutboundConfig::bind("obfs4", 443, options)?;
    let opts: ObfsOptions = parse_options("obfs4", options)?;

    let node_id = opts
        .node_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::invalid_config("obfs4", "node_id is required"))?;
    let public_key = opts
        .public_key
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::invalid_config("obfs4", "public_key is required"))?;

    Ok(BoundOutbound {
        config,
        dialer: Arc::new(TcpDialer),
        handshake: Arc::new(Obfs4Hello { node_id, public_key }),
    })
}

pub fn meek_descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor {
        id: "meek",
        default_port: 443,
        bind: Arc::new(bind_meek),
    }
}

fn bind_meek(options: &serde_json::Value) -> Result<BoundOutbound, CoreError> {
    let config = OutboundConfig::bind("meek", 443, options)?;
    let opts: ObfsOptions = parse_options("meek", options)?;

    let fronting = opts
        .fronting_domain
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::invalid_config("meek", "fronting_domain is required"))?;

    // The fronting domain wins over any configured server_name.
    let mut tls = config.tls.clone().unwrap_or_default();
    tls.server_name = Some(fronting);
    let dialer = tls_layer("meek", Box::new(TcpDialer), &tls)?;

    Ok(BoundOutbound {
        config,
        dialer: Arc::from(dialer),
        handshake: Arc::new(NoopHandshake),
    })
}

/// Client hello carrying the bridge identity. The full obfs4 key exchange
/// is out of scope; the frame here keeps the contract observable.
pub struct Obfs4Hello {
    node_id: String,
    public_key: String,
}

#[async_trait]
impl HandshakeStrategy for Obfs4Hello {
    fn name(&self) -> &'static str {
        "obfs4-hello"
    }

    async fn perform(&self, mut stream: IoStream) -> Result<IoStream, CoreError> {
        let hello = format!("{}:{}\r\n", self.node_id, self.public_key);
        stream.write_all(hello.as_bytes()).await?;
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
    fn obfs4_requires_bridge_identity() {
        let err = bind_obfs4(&json!({ "server": "bridge.example" })).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));

        let bound = bind_obfs4(&json!({
            "server": "bridge.example",
            "node_id": "4d3f",
            "public_key": "a1b2",
        }))
        .unwrap();
        assert_eq!(bound.config.port, 443);
    }

    #[test]
    fn meek_requires_fronting_domain() {
        let err = bind_meek(&json!({ "server": "cdn.example" })).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));

        bind_meek(&json!({
            "server": "cdn.example",
            "fronting_domain": "front.example",
        }))
        .unwrap();
    }

    #[tokio::test]
    async fn obfs4_hello_carries_identity() {
        let (dialer, mut peer) = DuplexDialer::new_pair();
        let stream = dialer.connect("x", 443).await.unwrap();

        let hello = Obfs4Hello {
            node_id: "4d3f".into(),
            public_key: "a1b2".into(),
        };
        hello.perform(stream).await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"4d3f:a1b2\r\n");
    }
}
