//! Payload injection dialer decorator.
//!
//! Some censorship-evasion setups expect a fixed byte blob (usually a crafted
//! HTTP request) on the wire immediately after the transport opens, before
//! the real protocol starts. This decorator writes that blob and hands the
//! stream on unchanged.

use super::dialer::{DialError, Dialer, IoStream};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

pub struct PayloadDialer<D: Dialer> {
    pub inner: D,
    pub payload: Vec<u8>,
}

impl<D: Dialer> PayloadDialer<D> {
    pub fn new(inner: D, payload: Vec<u8>) -> Self {
        Self { inner, payload }
    }
}

#[async_trait]
impl<D: Dialer + Send + Sync> Dialer for PayloadDialer<D> {
    async fn connect(&self, host: &str, port: u16) -> Result<IoStream, DialError> {
        let mut stream = self.inner.connect(host, port).await?;
        if !self.payload.is_empty() {
            stream.write_all(&self.payload).await?;
            stream.flush().await?;
            tracing::debug!(host, port, bytes = self.payload.len(), "payload injected");
        }
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::DuplexDialer;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn payload_written_before_traffic() {
        let (dialer, mut server) = DuplexDialer::new_pair();
        let payload = PayloadDialer::new(dialer, b"GET / HTTP/1.1\r\n\r\n".to_vec());

        let mut stream = payload.connect("x", 80).await.unwrap();
        stream.write_all(b"data").await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert!(buf[..n].starts_with(b"GET / HTTP/1.1\r\n\r\n"));
    }

    #[tokio::test]
    async fn empty_payload_is_a_no_op() {
        let (dialer, mut server) = DuplexDialer::new_pair();
        let payload = PayloadDialer::new(dialer, Vec::new());

        let mut stream = payload.connect("x", 80).await.unwrap();
        stream.write_all(b"data").await.unwrap();

        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"data");
    }
}
