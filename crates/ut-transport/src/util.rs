//! Transport timeout helpers.

use crate::dialer::{DialError, Dialer, IoStream};
use std::time::Duration;
use tokio::time::timeout;

/// Lower/upper clamps keep broken configs from producing instant failures
/// or connects that hang for minutes.
const MIN_DIAL_TIMEOUT: Duration = Duration::from_millis(10);
const MAX_DIAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Dial with a deadline. Elapsed deadlines surface as `Other("timeout")`.
pub async fn dial_with_timeout<D: Dialer + ?Sized>(
    dialer: &D,
    host: &str,
    port: u16,
    deadline: Duration,
) -> Result<IoStream, DialError> {
    let deadline = deadline.clamp(MIN_DIAL_TIMEOUT, MAX_DIAL_TIMEOUT);
    timeout(deadline, dialer.connect(host, port)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialer::FnDialer;

    #[tokio::test]
    async fn slow_dial_times_out() {
        let dialer = FnDialer::new(|_h: &str, _p: u16| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Err::<IoStream, _>(DialError::NotSupported)
            })
                as std::pin::Pin<
                    Box<dyn std::future::Future<Output = Result<IoStream, DialError>> + Send>,
                >
        });

        let err = dial_with_timeout(&dialer, "slow.example", 1, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, DialError::Other(ref m) if m == "timeout"));
    }
}
