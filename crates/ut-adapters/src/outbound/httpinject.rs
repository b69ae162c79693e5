//! HTTP injection outbound.
//!
//! Writes a crafted HTTP request immediately after connect, either a raw
//! payload template or a request assembled from `method`/`path`/`headers`.
//! Templates may use `[host]`, `[port]` and `[crlf]` placeholders. An
//! optional `expected_status` turns the handshake into a response check.

use crate::outbound::parse_options;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use ut_core::{
    BoundOutbound, CoreError, HandshakeStrategy, NoopHandshake, OutboundConfig,
    ProtocolDescriptor,
};
use ut_transport::{Dialer, IoStream, PayloadDialer, TcpDialer};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; utp-core)";

#[derive(Debug, Default, Deserialize)]
struct HttpInjectOptions {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    user_agent: Option<String>,
    /// BTreeMap keeps header order stable across binds.
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    payload: Option<String>,
    #[serde(default)]
    expected_status: Option<u16>,
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor {
        id: "httpinject",
        default_port: 80,
        bind: Arc::new(bind),
    }
}

fn bind(options: &serde_json::Value) -> Result<BoundOutbound, CoreError> {
    let config = OutboundConfig::bind("httpinject", 80, options)?;
    let opts: HttpInjectOptions = parse_options("httpinject", options)?;

    let host = opts.host.clone().unwrap_or_else(|| config.server.clone());
    let request = match opts.payload.as_deref().filter(|p| !p.is_empty()) {
        Some(template) => expand_placeholders(template, &host, config.port),
        None => build_request(
            opts.method.as_deref().unwrap_or("GET"),
            opts.path.as_deref().unwrap_or("/"),
            &host,
            opts.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT),
            &opts.headers,
        ),
    };

    let dialer = PayloadDialer::new(TcpDialer, request.into_bytes());
    let handshake: Arc<dyn HandshakeStrategy> = match opts.expected_status {
        Some(expected) => Arc::new(StatusCheck { expected }),
        None => Arc::new(NoopHandshake),
    };

    Ok(BoundOutbound {
        config,
        dialer: Arc::new(dialer),
        handshake,
    })
}

fn expand_placeholders(template: &str, host: &str, port: u16) -> String {
    template
        .replace("[host]", host)
        .replace("[port]", &port.to_string())
        .replace("[crlf]", "\r\n")
}

fn build_request(
    method: &str,
    path: &str,
    host: &str,
    user_agent: &str,
    headers: &BTreeMap<String, String>,
) -> String {
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: {user_agent}\r\n");
    for (name, value) in headers {
        req.push_str(&format!("{name}: {value}\r\n"));
    }
    req.push_str("\r\n");
    req
}

/// Reads the HTTP status line after the injected request and compares the
/// status code.
pub struct StatusCheck {
    expected: u16,
}

#[async_trait]
impl HandshakeStrategy for StatusCheck {
    fn name(&self) -> &'static str {
        "http-status-check"
    }

    async fn perform(&self, mut stream: IoStream) -> Result<IoStream, CoreError> {
        let mut line = Vec::with_capacity(64);
        let mut byte = [0u8; 1];
        loop {
            let n = stream.read(&mut byte).await?;
            if n == 0 {
                return Err(CoreError::handshake(
                    "httpinject",
                    "server closed before status line",
                ));
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
            if line.len() > 8 * 1024 {
                return Err(CoreError::handshake("httpinject", "oversized status line"));
            }
        }
        let line = String::from_utf8_lossy(&line);
        let status = line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| {
                CoreError::handshake("httpinject", format!("bad status line {line:?}"))
            })?;
        if status != self.expected {
            return Err(CoreError::handshake(
                "httpinject",
                format!("expected status {}, got {status}", self.expected),
            ));
        }
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::AsyncWriteExt;
    use ut_transport::mem::DuplexDialer;

    #[test]
    fn placeholders_expand() {
        let out = expand_placeholders(
            "GET / HTTP/1.1[crlf]Host: [host]:[port][crlf][crlf]",
            "cdn.example",
            8080,
        );
        assert_eq!(out, "GET / HTTP/1.1\r\nHost: cdn.example:8080\r\n\r\n");
    }

    #[test]
    fn default_request_is_well_formed() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Session".to_string(), "abc".to_string());
        let req = build_request("POST", "/upload", "cdn.example", "ua/1.0", &headers);
        assert!(req.starts_with("POST /upload HTTP/1.1\r\nHost: cdn.example\r\n"));
        assert!(req.contains("X-Session: abc\r\n"));
        assert!(req.ends_with("\r\n\r\n"));
    }

    #[test]
    fn bind_defaults_to_get_request() {
        let bound = bind(&json!({ "server": "cdn.example" })).unwrap();
        assert_eq!(bound.config.port, 80);
        assert_eq!(bound.handshake.name(), "noop");
    }

    #[tokio::test]
    async fn status_check_accepts_expected_and_rejects_others() {
        let (dialer, mut peer) = DuplexDialer::new_pair();
        let stream = dialer.connect("x", 80).await.unwrap();
        tokio::spawn(async move {
            peer.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await.unwrap();
        });
        StatusCheck { expected: 200 }.perform(stream).await.unwrap();

        let (dialer, mut peer) = DuplexDialer::new_pair();
        let stream = dialer.connect("x", 80).await.unwrap();
        tokio::spawn(async move {
            peer.write_all(b"HTTP/1.1 503 Unavailable\r\n\r\n")
                .await
                .unwrap();
        });
        let err = StatusCheck { expected: 200 }.perform(stream).await.unwrap_err();
        assert!(matches!(err, CoreError::Handshake { .. }));
    }
}
