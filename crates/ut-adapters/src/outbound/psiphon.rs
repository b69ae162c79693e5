//! Psiphon-style outbound.
//!
//! TCP to the relay, an optional TLS leg fronted by `header_host`, then an
//! HTTP CONNECT exchange addressed at the relay itself. The SSH session that
//! rides the tunnel afterwards carries its own wire crypto and is out of
//! scope here; the tunnel is handed over once the relay answers 200.

use crate::outbound::{parse_options, tls_layer};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use ut_core::{
    BoundOutbound, CoreError, HandshakeStrategy, OutboundConfig, ProtocolDescriptor,
};
use ut_transport::{Dialer, IoStream, TcpDialer};

#[derive(Debug, Default, Deserialize)]
struct PsiphonOptions {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    use_tls: bool,
    #[serde(default)]
    header_host: Option<String>,
    #[serde(default)]
    obfuscate: bool,
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor {
        id: "psiphon",
        default_port: 22,
        bind: Arc::new(bind),
    }
}

fn bind(options: &serde_json::Value) -> Result<BoundOutbound, CoreError> {
    let config = OutboundConfig::bind("psiphon", 22, options)?;
    let opts: PsiphonOptions = parse_options("psiphon", options)?;

    if opts.username.as_deref().unwrap_or("").is_empty()
        || opts.password.as_deref().unwrap_or("").is_empty()
    {
        return Err(CoreError::invalid_config(
            "psiphon",
            "username and password are required",
        ));
    }
    if opts.obfuscate {
        tracing::debug!("psiphon obfuscation requested");
    }

    let header_host = opts
        .header_host
        .clone()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| config.server.clone());

    let mut dialer: Box<dyn Dialer> = Box::new(TcpDialer);
    if opts.use_tls {
        let mut tls = config.tls.clone().unwrap_or_default();
        if tls.server_name.is_none() {
            tls.server_name = Some(header_host.clone());
        }
        // Fronted relays present certificates for the fronting domain.
        tls.insecure = true;
        dialer = tls_layer("psiphon", dialer, &tls)?;
    }

    Ok(BoundOutbound {
        config: config.clone(),
        dialer: Arc::from(dialer),
        handshake: Arc::new(HttpTunnel {
            server: config.server,
            port: config.port,
            host: header_host,
        }),
    })
}

/// CONNECT exchange addressed at the relay itself: the request names the
/// relay as the target, `Host` carries the fronting name, and anything but a
/// 200 status fails the handshake.
pub struct HttpTunnel {
    server: String,
    port: u16,
    host: String,
}

#[async_trait]
impl HandshakeStrategy for HttpTunnel {
    fn name(&self) -> &'static str {
        "psiphon-http-tunnel"
    }

    async fn perform(&self, mut stream: IoStream) -> Result<IoStream, CoreError> {
        let request = format!(
            "CONNECT {}:{} HTTP/1.1\r\nHost: {}\r\n\r\n",
            self.server, self.port, self.host
        );
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;

        let mut line = Vec::with_capacity(64);
        let mut byte = [0u8; 1];
        loop {
            let n = stream.read(&mut byte).await?;
            if n == 0 {
                return Err(CoreError::handshake(
                    "psiphon",
                    "relay closed before status line",
                ));
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
            if line.len() > 8 * 1024 {
                return Err(CoreError::handshake("psiphon", "oversized status line"));
            }
        }
        let line = String::from_utf8_lossy(&line);
        let status = line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| {
                CoreError::handshake("psiphon", format!("bad status line {line:?}"))
            })?;
        if status != 200 {
            return Err(CoreError::handshake(
                "psiphon",
                format!("relay refused tunnel with status {status}"),
            ));
        }
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use ut_transport::mem::DuplexDialer;

    #[test]
    fn credentials_are_required() {
        let err = bind(&json!({ "server": "relay.example" })).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));

        let bound = bind(&json!({
            "server": "relay.example",
            "username": "u",
            "password": "p",
        }))
        .unwrap();
        assert_eq!(bound.config.port, 22);
        assert_eq!(bound.handshake.name(), "psiphon-http-tunnel");
    }

    #[tokio::test]
    async fn tunnel_request_carries_the_fronting_host() {
        let (dialer, mut peer) = DuplexDialer::new_pair();
        let stream = dialer.connect("x", 22).await.unwrap();

        let server = tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            let n = peer.read(&mut buf).await.unwrap();
            peer.write_all(b"HTTP/1.1 200 Connection established\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        let tunnel = HttpTunnel {
            server: "relay.example".to_string(),
            port: 8443,
            host: "front.example".to_string(),
        };
        tunnel.perform(stream).await.unwrap();

        let req = server.await.unwrap();
        assert!(req.starts_with("CONNECT relay.example:8443 HTTP/1.1\r\n"));
        assert!(req.contains("Host: front.example\r\n"));
    }

    #[tokio::test]
    async fn non_200_fails_the_handshake() {
        let (dialer, mut peer) = DuplexDialer::new_pair();
        let stream = dialer.connect("x", 22).await.unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            let _ = peer.read(&mut buf).await.unwrap();
            peer.write_all(b"HTTP/1.1 502 Bad Gateway\r\n").await.unwrap();
        });

        let tunnel = HttpTunnel {
            server: "relay.example".to_string(),
            port: 22,
            host: "relay.example".to_string(),
        };
        let err = tunnel.perform(stream).await.unwrap_err();
        assert!(matches!(err, CoreError::Handshake { .. }));
    }
}
