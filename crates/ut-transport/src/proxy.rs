//! HTTP CONNECT proxy dialer decorator.
//!
//! Dials the proxy endpoint with the inner dialer, issues a `CONNECT` for the
//! requested target, and validates the status line before handing the tunnel
//! back as a plain stream.

use super::dialer::{DialError, Dialer, IoStream};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Upper bound on the CONNECT response head we are willing to buffer.
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

pub struct HttpProxyDialer<D: Dialer> {
    pub inner: D,
    pub proxy_host: String,
    pub proxy_port: u16,
}

impl<D: Dialer> HttpProxyDialer<D> {
    pub fn new(inner: D, proxy_host: impl Into<String>, proxy_port: u16) -> Self {
        Self {
            inner,
            proxy_host: proxy_host.into(),
            proxy_port,
        }
    }
}

#[async_trait]
impl<D: Dialer + Send + Sync> Dialer for HttpProxyDialer<D> {
    async fn connect(&self, host: &str, port: u16) -> Result<IoStream, DialError> {
        let mut stream = self.inner.connect(&self.proxy_host, self.proxy_port).await?;

        let request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n\r\n");
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;

        let head = read_response_head(&mut stream).await?;
        let status_line = head.lines().next().unwrap_or_default();
        if !is_connect_established(status_line) {
            return Err(DialError::Proxy(format!(
                "CONNECT to {host}:{port} via {}:{} refused: {status_line}",
                self.proxy_host, self.proxy_port
            )));
        }

        tracing::debug!(host, port, proxy = %self.proxy_host, "proxy tunnel established");
        Ok(stream)
    }
}

/// Read until the end of the response head (`\r\n\r\n`).
async fn read_response_head(stream: &mut IoStream) -> Result<String, DialError> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(DialError::Proxy("proxy closed during CONNECT".into()));
        }
        head.push(byte[0]);
        if head.ends_with(b"\r\n\r\n") {
            break;
        }
        if head.len() > MAX_RESPONSE_HEAD {
            return Err(DialError::Proxy("oversized CONNECT response".into()));
        }
    }
    String::from_utf8(head).map_err(|_| DialError::Proxy("non-utf8 CONNECT response".into()))
}

fn is_connect_established(status_line: &str) -> bool {
    let mut parts = status_line.split_whitespace();
    matches!(
        (parts.next(), parts.next()),
        (Some(version), Some("200")) if version.starts_with("HTTP/")
    )
}
