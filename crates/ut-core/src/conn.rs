//! Per-connection stream wrapper with activity tracking.
//!
//! Wraps the single logical stream of an outbound. Every successful non-zero
//! read or write refreshes `last_activity`, which drives idle detection in
//! the supervisor; byte counts feed the metrics registry.

use crate::error::CoreError;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use ut_transport::IoStream;

pub struct TrackedStream {
    stream: IoStream,
    protocol: String,
    read_timeout: Duration,
    write_timeout: Duration,
    last_activity: Instant,
}

impl TrackedStream {
    pub fn new(
        stream: IoStream,
        protocol: impl Into<String>,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            protocol: protocol.into(),
            read_timeout,
            write_timeout,
            last_activity: Instant::now(),
        }
    }

    /// Read with the configured per-operation deadline.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, CoreError> {
        let n = timeout(self.read_timeout, self.stream.read(buf))
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "read timeout")
            })??;
        if n > 0 {
            self.last_activity = Instant::now();
            ut_metrics::add_bytes(&self.protocol, ut_metrics::DIR_RX, n as u64);
        }
        Ok(n)
    }

    /// Write the whole buffer with the configured per-operation deadline.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), CoreError> {
        timeout(self.write_timeout, async {
            self.stream.write_all(data).await?;
            self.stream.flush().await
        })
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout"))??;
        if !data.is_empty() {
            self.last_activity = Instant::now();
            ut_metrics::add_bytes(&self.protocol, ut_metrics::DIR_TX, data.len() as u64);
        }
        Ok(())
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn is_idle(&self, threshold: Duration) -> bool {
        self.idle_for() >= threshold
    }

    pub async fn shutdown(&mut self) -> Result<(), CoreError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
