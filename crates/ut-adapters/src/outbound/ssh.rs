//! SSH-tunnel outbound.
//!
//! The `method` field selects how the raw transport is assembled: an HTTP
//! CONNECT proxy leg, a TLS leg, a payload-injection leg, or any combination
//! (`tls-proxy-payload` etc.). Whatever the chain, the post-connect exchange
//! is the SSH version banner swap.

use crate::outbound::{parse_options, tls_layer};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use ut_core::{
    BoundOutbound, CoreError, HandshakeStrategy, OutboundConfig, ProtocolDescriptor,
};
use ut_transport::{Dialer, HttpProxyDialer, IoStream, PayloadDialer, TcpDialer};

pub const CLIENT_BANNER: &str = "SSH-2.0-UTP-Core_1.0";

/// RFC 4253 caps the version line at 255 bytes including CRLF.
const MAX_BANNER: usize = 255;

#[derive(Debug, Default, Deserialize)]
struct SshOptions {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    tls: bool,
    #[serde(default)]
    proxy_server: Option<String>,
    #[serde(default)]
    proxy_port: Option<u16>,
    #[serde(default)]
    proxy_method: Option<String>,
    #[serde(default)]
    payload: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
struct Method {
    proxy: bool,
    payload: bool,
    tls: bool,
}

fn parse_method(method: &str, tls_flag: bool) -> Result<Method, CoreError> {
    let (proxy, payload, tls) = match method {
        "" | "direct" => (false, false, false),
        "proxy" => (true, false, false),
        "payload" => (false, true, false),
        "proxy-payload" => (true, true, false),
        "tls" => (false, false, true),
        "tls-proxy" => (true, false, true),
        "tls-payload" => (false, true, true),
        "tls-proxy-payload" => (true, true, true),
        other => {
            return Err(CoreError::invalid_config(
                "ssh",
                format!("unknown method {other:?}"),
            ))
        }
    };
    Ok(Method {
        proxy,
        payload,
        tls: tls || tls_flag,
    })
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor {
        id: "ssh",
        default_port: 22,
        bind: Arc::new(bind),
    }
}

fn bind(options: &serde_json::Value) -> Result<BoundOutbound, CoreError> {
    let config = OutboundConfig::bind("ssh", 22, options)?;
    let opts: SshOptions = parse_options("ssh", options)?;
    let method = parse_method(opts.method.as_deref().unwrap_or("direct"), opts.tls)?;

    let mut dialer: Box<dyn Dialer> = Box::new(TcpDialer);
    if method.proxy {
        let host = opts.proxy_server.clone().ok_or_else(|| {
            CoreError::invalid_config("ssh", "proxy_server is required for proxy methods")
        })?;
        let port = opts.proxy_port.ok_or_else(|| {
            CoreError::invalid_config("ssh", "proxy_port is required for proxy methods")
        })?;
        match opts.proxy_method.as_deref().unwrap_or("http") {
            "http" => {}
            other => {
                return Err(CoreError::invalid_config(
                    "ssh",
                    format!("unsupported proxy_method {other:?}"),
                ))
            }
        }
        dialer = Box::new(HttpProxyDialer::new(dialer, host, port));
    }
    if method.tls {
        let tls = config.tls.clone().unwrap_or_default();
        dialer = tls_layer("ssh", dialer, &tls)?;
    }
    if method.payload {
        let payload = opts.payload.clone().unwrap_or_default().into_bytes();
        dialer = Box::new(PayloadDialer::new(dialer, payload));
    }

    Ok(BoundOutbound {
        config,
        dialer: Arc::from(dialer),
        handshake: Arc::new(VersionExchange::default()),
    })
}

/// SSH protocol version exchange: send our banner, read and sanity-check
/// the server's.
pub struct VersionExchange {
    banner: String,
}

impl Default for VersionExchange {
    fn default() -> Self {
        Self {
            banner: CLIENT_BANNER.to_string(),
        }
    }
}

#[async_trait]
impl HandshakeStrategy for VersionExchange {
    fn name(&self) -> &'static str {
        "ssh-version-exchange"
    }

    async fn perform(&self, mut stream: IoStream) -> Result<IoStream, CoreError> {
        stream
            .write_all(format!("{}\r\n", self.banner).as_bytes())
            .await?;
        stream.flush().await?;

        let mut line = Vec::with_capacity(64);
        let mut byte = [0u8; 1];
        loop {
            let n = stream.read(&mut byte).await?;
            if n == 0 {
                return Err(CoreError::handshake("ssh", "server closed during banner"));
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
            if line.len() > MAX_BANNER {
                return Err(CoreError::handshake("ssh", "oversized server banner"));
            }
        }
        let banner = String::from_utf8_lossy(&line);
        let banner = banner.trim_end_matches('\r');
        if !banner.starts_with("SSH-") {
            return Err(CoreError::handshake(
                "ssh",
                format!("unexpected server banner {banner:?}"),
            ));
        }
        tracing::debug!(server_banner = %banner, "ssh version exchanged");
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
    fn method_variants() {
        let m = parse_method("direct", false).unwrap();
        assert_eq!(m, Method { proxy: false, payload: false, tls: false });
        let m = parse_method("tls-proxy-payload", false).unwrap();
        assert_eq!(m, Method { proxy: true, payload: true, tls: true });
        // Bare `tls: true` upgrades any method.
        let m = parse_method("proxy", true).unwrap();
        assert_eq!(m, Method { proxy: true, payload: false, tls: true });
        assert!(parse_method("carrier-pigeon", false).is_err());
    }

    #[test]
    fn proxy_method_requires_proxy_fields() {
        let err = bind(&json!({ "server": "a.example", "method": "proxy" })).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));

        bind(&json!({
            "server": "a.example",
            "method": "proxy",
            "proxy_server": "proxy.internal",
            "proxy_port": 3128,
        }))
        .unwrap();
    }

    #[tokio::test]
    async fn version_exchange_swaps_banners() {
        let (dialer, mut peer) = DuplexDialer::new_pair();
        let stream = dialer.connect("x", 22).await.unwrap();

        let server = tokio::spawn(async move {
            let mut buf = vec![0u8; 128];
            let n = peer.read(&mut buf).await.unwrap();
            peer.write_all(b"SSH-2.0-OpenSSH_9.6\r\n").await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        VersionExchange::default().perform(stream).await.unwrap();
        let client_banner = server.await.unwrap();
        assert_eq!(client_banner, format!("{CLIENT_BANNER}\r\n"));
    }

    #[tokio::test]
    async fn non_ssh_server_is_rejected() {
        let (dialer, mut peer) = DuplexDialer::new_pair();
        let stream = dialer.connect("x", 22).await.unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 128];
            let _ = peer.read(&mut buf).await.unwrap();
            peer.write_all(b"220 smtp.example ESMTP\r\n").await.unwrap();
        });

        let err = VersionExchange::default().perform(stream).await.unwrap_err();
        assert!(matches!(err, CoreError::Handshake { .. }));
    }
}
