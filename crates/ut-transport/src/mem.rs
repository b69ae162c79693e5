//! In-memory duplex transport for tests.
//!
//! `DuplexDialer` hands out one half of a `tokio::io::duplex` pipe when
//! `connect` is called and returns the other half to the test as the "server"
//! side. Each dialer connects exactly once; a second connect yields
//! `DialError::NotSupported`. Testing only — no real network is involved.

use super::dialer::{DialError, Dialer, IoStream};
use async_trait::async_trait;
use tokio::io::duplex;
use tokio::sync::Mutex;

pub struct DuplexDialer {
    // Consumed on first connect via Option::take.
    cli: Mutex<Option<tokio::io::DuplexStream>>,
}

impl DuplexDialer {
    /// Create a dialer/server pair over a 4 KiB in-memory pipe.
    pub fn new_pair() -> (Self, tokio::io::DuplexStream) {
        let (a, b) = duplex(4096);
        (
            Self {
                cli: Mutex::new(Some(a)),
            },
            b,
        )
    }
}

#[async_trait]
impl Dialer for DuplexDialer {
    async fn connect(&self, _host: &str, _port: u16) -> Result<IoStream, DialError> {
        let mut guard = self.cli.lock().await;
        let s = guard.take().ok_or(DialError::NotSupported)?;
        Ok(Box::new(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn duplex_round_trip() {
        let (dialer, mut server) = DuplexDialer::new_pair();
        let mut client = dialer.connect("ignored", 0).await.unwrap();

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn second_connect_fails() {
        let (dialer, _server) = DuplexDialer::new_pair();
        let _ = dialer.connect("x", 0).await.unwrap();
        assert!(matches!(
            dialer.connect("x", 0).await,
            Err(DialError::NotSupported)
        ));
    }
}
