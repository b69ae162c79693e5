//! Post-connect handshake strategies.
//!
//! A strategy consumes the freshly dialed stream, performs its protocol
//! negotiation, and returns the stream (possibly wrapped) on success. On
//! failure the stream is dropped with the error; the lifecycle layer treats
//! a handshake failure like a dial failure and may retry on a fresh stream.

use crate::error::CoreError;
use async_trait::async_trait;
use ut_transport::IoStream;

#[async_trait]
pub trait HandshakeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn perform(&self, stream: IoStream) -> Result<IoStream, CoreError>;
}

/// Pass-through strategy for protocols with no post-connect exchange.
pub struct NoopHandshake;

#[async_trait]
impl HandshakeStrategy for NoopHandshake {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn perform(&self, stream: IoStream) -> Result<IoStream, CoreError> {
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use ut_transport::Dialer;

    #[tokio::test]
    async fn noop_returns_the_stream_untouched() {
        let (dialer, mut peer) = ut_transport::mem::DuplexDialer::new_pair();
        let stream = dialer.connect("x", 1).await.unwrap();

        let mut stream = NoopHandshake.perform(stream).await.unwrap();
        stream.write_all(b"hello").await.unwrap();

        let mut buf = [0u8; 5];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }
}
