//! Legacy VPN outbound.
//!
//! The `protocol` field picks the family. Only the TCP-capable families are
//! carried: SSTP rides HTTPS and opens with its duplex POST, PPTP and
//! SoftEther are plain control channels on their well-known ports. The
//! UDP-only families (L2TP, IKEv2, GRE and their IPsec pairings) are
//! rejected at bind time.

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

/// Fixed SRA endpoint from the SSTP specification.
const SSTP_PATH: &str = "/sra_{BA195980-CD49-458b-9E23-C84E0B5B7DC6}/";

#[derive(Debug, Default, Deserialize)]
struct LegacyVpnOptions {
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    psk: Option<String>,
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor {
        id: "legacyvpn",
        default_port: 443,
        bind: Arc::new(bind),
    }
}

fn bind(options: &serde_json::Value) -> Result<BoundOutbound, CoreError> {
    let opts: LegacyVpnOptions = parse_options("legacyvpn", options)?;
    let variant = opts.protocol.as_deref().ok_or_else(|| {
        CoreError::invalid_config("legacyvpn", "protocol is required")
    })?;

    let default_port = match variant {
        "sstp" => 443,
        "pptp" => 1723,
        "softether" => 992,
        "l2tp" | "l2tp-ipsec" | "ikev2" | "ikev2-ipsec" | "gre" => {
            return Err(CoreError::invalid_config(
                "legacyvpn",
                format!("{variant} runs over udp and is not supported"),
            ))
        }
        other => {
            return Err(CoreError::invalid_config(
                "legacyvpn",
                format!("unknown protocol {other:?}"),
            ))
        }
    };
    let config = OutboundConfig::bind("legacyvpn", default_port, options)?;

    if opts.username.is_some() || opts.password.is_some() || opts.psk.is_some() {
        tracing::debug!(protocol = variant, "legacyvpn credentials configured");
    }

    let mut dialer: Box<dyn Dialer> = Box::new(TcpDialer);
    let handshake: Arc<dyn HandshakeStrategy> = match variant {
        "sstp" => {
            let tls = config.tls.clone().unwrap_or_default();
            dialer = tls_layer("legacyvpn", dialer, &tls)?;
            Arc::new(SstpHello {
                host: config.server.clone(),
            })
        }
        _ => Arc::new(NoopHandshake),
    };

    Ok(BoundOutbound {
        config,
        dialer: Arc::from(dialer),
        handshake,
    })
}

/// Opens the SSTP control channel with the duplex POST against the fixed SRA
/// path. The PPP negotiation that follows is left to the tunnel owner.
pub struct SstpHello {
    host: String,
}

#[async_trait]
impl HandshakeStrategy for SstpHello {
    fn name(&self) -> &'static str {
        "sstp-hello"
    }

    async fn perform(&self, mut stream: IoStream) -> Result<IoStream, CoreError> {
        let request = format!(
            "SSTP_DUPLEX_POST {SSTP_PATH} HTTP/1.1\r\nHost: {}\r\n\r\n",
            self.host
        );
        stream.write_all(request.as_bytes()).await?;
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
        let bound = bind(&json!({ "server": "vpn.example", "protocol": "sstp" })).unwrap();
        assert_eq!(bound.config.port, 443);
        assert_eq!(bound.handshake.name(), "sstp-hello");

        let bound = bind(&json!({ "server": "vpn.example", "protocol": "pptp" })).unwrap();
        assert_eq!(bound.config.port, 1723);

        let bound = bind(&json!({ "server": "vpn.example", "protocol": "softether" })).unwrap();
        assert_eq!(bound.config.port, 992);
    }

    #[test]
    fn udp_families_and_missing_protocol_are_rejected() {
        for variant in ["l2tp", "l2tp-ipsec", "ikev2", "ikev2-ipsec", "gre"] {
            let err =
                bind(&json!({ "server": "vpn.example", "protocol": variant })).unwrap_err();
            assert!(matches!(err, CoreError::InvalidConfig { .. }), "{variant}");
        }
        let err = bind(&json!({ "server": "vpn.example" })).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn sstp_hello_posts_the_sra_path() {
        let (dialer, mut peer) = DuplexDialer::new_pair();
        let stream = dialer.connect("x", 443).await.unwrap();

        SstpHello {
            host: "vpn.example".to_string(),
        }
        .perform(stream)
        .await
        .unwrap();

        let mut buf = vec![0u8; 256];
        let n = peer.read(&mut buf).await.unwrap();
        let req = String::from_utf8_lossy(&buf[..n]).to_string();
        assert!(req.starts_with(&format!("SSTP_DUPLEX_POST {SSTP_PATH} HTTP/1.1\r\n")));
        assert!(req.contains("Host: vpn.example\r\n"));
    }
}
