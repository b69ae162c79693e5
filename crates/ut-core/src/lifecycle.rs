//! Outbound lifecycle manager.
//!
//! One [`Outbound`] owns one logical connection. Establishment is lazy: the
//! first `route` call dials and handshakes, later calls reuse the stream.
//! The state lives in an `AtomicU8` for the lock-free fast path; the slow
//! path double-checks under an establish mutex so concurrent callers trigger
//! at most one dial. `Failed` and `Closed` are sticky: a failed or closed
//! outbound never dials again, callers construct a new instance to retry.

use crate::config::OutboundConfig;
use crate::conn::TrackedStream;
use crate::error::CoreError;
use crate::handshake::HandshakeStrategy;
use crate::registry::BoundOutbound;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ut_transport::{dial_with_timeout, Dialer, IoStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    Idle = 0,
    Connecting = 1,
    Handshaking = 2,
    Ready = 3,
    Failed = 4,
    Closed = 5,
}

impl ConnState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnState::Idle,
            1 => ConnState::Connecting,
            2 => ConnState::Handshaking,
            3 => ConnState::Ready,
            4 => ConnState::Failed,
            _ => ConnState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnState::Idle => "idle",
            ConnState::Connecting => "connecting",
            ConnState::Handshaking => "handshaking",
            ConnState::Ready => "ready",
            ConnState::Failed => "failed",
            ConnState::Closed => "closed",
        }
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

pub struct Outbound {
    config: OutboundConfig,
    dialer: Arc<dyn Dialer>,
    handshake: Arc<dyn HandshakeStrategy>,
    state: AtomicU8,
    /// Serializes establishment; never held across user I/O.
    establish: Mutex<()>,
    /// The single logical stream. Also the lock under which `Ready`/`Closed`
    /// are published, so close and establish cannot interleave.
    stream: Mutex<Option<TrackedStream>>,
    /// Set once when establishment fails for good; carries the attempts
    /// actually spent.
    terminal: OnceCell<(u32, String)>,
    cancel: CancellationToken,
}

impl Outbound {
    pub fn new(bound: BoundOutbound) -> Self {
        Self {
            config: bound.config,
            dialer: bound.dialer,
            handshake: bound.handshake,
            state: AtomicU8::new(ConnState::Idle as u8),
            establish: Mutex::new(()),
            stream: Mutex::new(None),
            terminal: OnceCell::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn protocol(&self) -> &str {
        &self.config.protocol
    }

    pub fn config(&self) -> &OutboundConfig {
        &self.config
    }

    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Closed is absorbing: once `close` has published it, establishment
    /// progress transitions must not resurrect the state machine.
    fn set_state(&self, next: ConnState) {
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                (cur != ConnState::Closed as u8).then_some(next as u8)
            });
    }

    fn stored_failure(&self) -> CoreError {
        let (attempts, reason) = match self.terminal.get() {
            Some((a, r)) => (*a, r.clone()),
            None => (0, "establishment failed".to_string()),
        };
        CoreError::OutboundFailed {
            protocol: self.config.protocol.clone(),
            attempts,
            reason,
        }
    }

    /// Forward `data` through the managed connection, establishing it first
    /// if necessary. Writes are serialized on the stream lock; there is no
    /// internal buffering or reordering.
    pub async fn route(&self, data: &[u8]) -> Result<(), CoreError> {
        match self.state() {
            ConnState::Ready => {}
            ConnState::Closed => return Err(CoreError::Closed),
            ConnState::Failed => return Err(self.stored_failure()),
            _ => self.ensure_connected().await?,
        }

        let mut guard = self.stream.lock().await;
        // State may have moved while we waited for the lock.
        match self.state() {
            ConnState::Closed => return Err(CoreError::Closed),
            ConnState::Failed => return Err(self.stored_failure()),
            _ => {}
        }
        let stream = guard.as_mut().ok_or(CoreError::Closed)?;
        stream.write_all(data).await
    }

    /// Make sure the connection is established. Safe to call concurrently:
    /// exactly one caller runs the attempt loop, the rest wait on the
    /// establish lock and observe the outcome.
    pub async fn ensure_connected(&self) -> Result<(), CoreError> {
        match self.state() {
            ConnState::Ready => return Ok(()),
            ConnState::Closed => return Err(CoreError::Closed),
            ConnState::Failed => return Err(self.stored_failure()),
            _ => {}
        }

        let _establishing = self.establish.lock().await;
        // Double check: a concurrent caller may have finished while we
        // waited for the lock.
        match self.state() {
            ConnState::Ready => return Ok(()),
            ConnState::Closed => return Err(CoreError::Closed),
            ConnState::Failed => return Err(self.stored_failure()),
            _ => {}
        }

        self.establish_locked().await
    }

    /// The attempt loop. Caller holds the establish lock. Dial errors with
    /// no prospect of a different outcome end the loop before the budget is
    /// spent.
    async fn establish_locked(&self) -> Result<(), CoreError> {
        let policy = self.config.retry.clone();
        let protocol = self.config.protocol.clone();
        let mut attempt = 0u32;
        let mut last_error = String::new();

        while policy.has_attempt(attempt) {
            if self.cancel.is_cancelled() {
                return Err(CoreError::Closed);
            }
            if attempt > 0 {
                ut_metrics::inc_retry(&protocol);
            }

            match self.attempt_once().await {
                Ok(stream) => {
                    let mut guard = self.stream.lock().await;
                    if self.cancel.is_cancelled() {
                        // close() won the race; the fresh stream is dropped.
                        return Err(CoreError::Closed);
                    }
                    *guard = Some(TrackedStream::new(
                        stream,
                        &*protocol,
                        self.config.read_timeout,
                        self.config.write_timeout,
                    ));
                    self.set_state(ConnState::Ready);
                    ut_metrics::inc_active_connections();
                    drop(guard);
                    info!(
                        protocol = %protocol,
                        server = %self.config.server,
                        port = self.config.port,
                        attempt,
                        "outbound ready"
                    );
                    return Ok(());
                }
                Err(CoreError::Closed) => return Err(CoreError::Closed),
                Err(e) => {
                    last_error = e.to_string();
                    let retryable = match &e {
                        CoreError::Dial { source, .. } => source.is_transient(),
                        _ => true,
                    };
                    warn!(
                        protocol = %protocol,
                        server = %self.config.server,
                        attempt,
                        retryable,
                        error = %e,
                        "establish attempt failed"
                    );
                    if !retryable {
                        attempt += 1;
                        break;
                    }
                    if policy.has_attempt(attempt + 1) {
                        let delay = policy.delay_for(attempt);
                        debug!(protocol = %protocol, ?delay, "backing off");
                        tokio::select! {
                            _ = self.cancel.cancelled() => return Err(CoreError::Closed),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
            attempt += 1;
        }

        if self.cancel.is_cancelled() {
            return Err(CoreError::Closed);
        }
        // `attempt` counts what was actually spent, which is less than the
        // budget when a non-transient dial error ends the loop early.
        self.terminal.set((attempt, last_error)).ok();
        self.set_state(ConnState::Failed);
        Err(self.stored_failure())
    }

    /// One dial plus handshake. Both legs race against cancellation and the
    /// connect timeout.
    async fn attempt_once(&self) -> Result<IoStream, CoreError> {
        let protocol = &self.config.protocol;

        self.set_state(ConnState::Connecting);
        let dial = dial_with_timeout(
            self.dialer.as_ref(),
            &self.config.server,
            self.config.port,
            self.config.connect_timeout,
        );
        let stream = tokio::select! {
            _ = self.cancel.cancelled() => return Err(CoreError::Closed),
            res = dial => res.map_err(|e| {
                ut_metrics::inc_connect_attempt(protocol, "error");
                CoreError::Dial {
                    protocol: protocol.clone(),
                    source: e,
                }
            })?,
        };
        ut_metrics::inc_connect_attempt(protocol, "ok");

        self.set_state(ConnState::Handshaking);
        let handshake = tokio::time::timeout(
            self.config.connect_timeout,
            self.handshake.perform(stream),
        );
        let stream = tokio::select! {
            _ = self.cancel.cancelled() => return Err(CoreError::Closed),
            res = handshake => match res {
                Ok(Ok(s)) => s,
                Ok(Err(e)) => {
                    ut_metrics::inc_handshake(protocol, "error");
                    return Err(e);
                }
                Err(_) => {
                    ut_metrics::inc_handshake(protocol, "error");
                    return Err(CoreError::handshake(protocol, "timeout"));
                }
            },
        };
        ut_metrics::inc_handshake(protocol, "ok");
        debug!(protocol = %protocol, strategy = self.handshake.name(), "handshake complete");
        Ok(stream)
    }

    /// Idempotent teardown. Cancels any in-flight establishment, shuts the
    /// stream down, and decrements the live-connection gauge exactly once.
    pub async fn close(&self) {
        self.cancel.cancel();
        let mut guard = self.stream.lock().await;
        let prev = self.state.swap(ConnState::Closed as u8, Ordering::SeqCst);
        if let Some(mut stream) = guard.take() {
            let _ = stream.shutdown().await;
        }
        drop(guard);
        if prev == ConnState::Ready as u8 {
            ut_metrics::dec_active_connections();
        }
        if prev != ConnState::Closed as u8 {
            info!(protocol = %self.config.protocol, "outbound closed");
        }
    }

    /// Idle check against the configured idle timeout.
    pub async fn is_idle(&self) -> bool {
        self.stream
            .lock()
            .await
            .as_ref()
            .map(|s| s.is_idle(self.config.idle_timeout))
            .unwrap_or(false)
    }

    /// Time since the last read or write on the managed stream.
    pub async fn idle_for(&self) -> Option<Duration> {
        self.stream.lock().await.as_ref().map(|s| s.idle_for())
    }
}
