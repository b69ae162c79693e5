//! Core dialer abstraction.
//!
//! A [`Dialer`] turns a `(host, port)` pair into an established byte stream.
//! Concrete implementations range from plain TCP to layered decorators
//! (TLS, HTTP CONNECT, payload injection); all of them erase to the same
//! boxed [`IoStream`] so the lifecycle layer never learns the wire format.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;

/// Errors surfaced while establishing a raw transport.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls: {0}")]
    Tls(String),

    /// Proxy refused or mangled the tunnel request.
    #[error("proxy: {0}")]
    Proxy(String),

    #[error("not supported")]
    NotSupported,

    /// Timeouts are reported as `Other("timeout")`.
    #[error("other: {0}")]
    Other(String),
}

impl From<tokio::time::error::Elapsed> for DialError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        DialError::Other("timeout".into())
    }
}

impl DialError {
    /// Transient errors are worth another attempt; protocol-level refusals
    /// are not.
    pub fn is_transient(&self) -> bool {
        match self {
            DialError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            DialError::Other(msg) => msg == "timeout",
            _ => false,
        }
    }
}

/// Marker trait for full-duplex async byte streams.
pub trait AsyncReadWrite: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send {}

impl<T> AsyncReadWrite for T where T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send {}

impl std::fmt::Debug for dyn AsyncReadWrite + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AsyncReadWrite")
    }
}

/// Boxed, thread-safe byte stream with a static lifetime.
pub type IoStream = Box<dyn AsyncReadWrite + 'static>;

/// Async dialer: establish a connection to `host:port`.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<IoStream, DialError>;
}

#[async_trait]
impl<D> Dialer for Box<D>
where
    D: Dialer + ?Sized,
{
    async fn connect(&self, host: &str, port: u16) -> Result<IoStream, DialError> {
        (**self).connect(host, port).await
    }
}

#[async_trait]
impl<D> Dialer for Arc<D>
where
    D: Dialer + ?Sized,
{
    async fn connect(&self, host: &str, port: u16) -> Result<IoStream, DialError> {
        (**self).connect(host, port).await
    }
}

/// Plain TCP dialer. Stateless, reusable, sets `TCP_NODELAY` on success.
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn connect(&self, host: &str, port: u16) -> Result<IoStream, DialError> {
        let stream = TcpStream::connect((host, port)).await?;
        // Tunnel traffic is latency-sensitive; Nagle hurts more than it helps.
        let _ = stream.set_nodelay(true);
        tracing::debug!(host, port, "tcp connected");
        Ok(Box::new(stream))
    }
}

/// Closure-backed dialer, used to inject custom connect logic in tests
/// and instrumentation.
pub struct FnDialer<F> {
    inner: Arc<F>,
}

impl<F> Clone for FnDialer<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F> FnDialer<F> {
    pub fn new(f: F) -> Self {
        Self { inner: Arc::new(f) }
    }
}

#[async_trait]
impl<F> Dialer for FnDialer<F>
where
    F: Send
        + Sync
        + Fn(
            &str,
            u16,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<IoStream, DialError>> + Send + 'static>,
        >,
{
    async fn connect(&self, host: &str, port: u16) -> Result<IoStream, DialError> {
        (self.inner)(host, port).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_dialer_delegates_to_closure() {
        let dialer = FnDialer::new(|_host: &str, _port: u16| {
            Box::pin(async { Err::<IoStream, _>(DialError::NotSupported) })
                as std::pin::Pin<
                    Box<dyn std::future::Future<Output = Result<IoStream, DialError>> + Send>,
                >
        });
        let err = dialer.connect("example.com", 443).await.unwrap_err();
        assert!(matches!(err, DialError::NotSupported));
    }

    #[test]
    fn transient_classification() {
        let refused = DialError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(refused.is_transient());
        assert!(DialError::Other("timeout".into()).is_transient());
        assert!(!DialError::NotSupported.is_transient());
        assert!(!DialError::Tls("bad cert".into()).is_transient());
    }
}
