//! ut-metrics: unified metric registration plus a lightweight Prometheus
//! text exporter.
//!
//! Off by default; set `UT_METRICS_ADDR=127.0.0.1:9090` and call
//! [`spawn_exporter_from_env`] to expose `/metrics`. Callers go through the
//! `inc_*`/`add_*` helpers so no other crate touches prometheus types.

use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Method, Request, Response, StatusCode};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Direction label values for byte counters.
pub const DIR_TX: &str = "tx";
pub const DIR_RX: &str = "rx";

static CONNECT_ATTEMPT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "outbound_connect_attempt_total",
        "Outbound dial attempts by protocol and result",
        &["protocol", "result"],
    )
});

static HANDSHAKE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "outbound_handshake_total",
        "Outbound handshakes by protocol and result",
        &["protocol", "result"],
    )
});

static RETRY_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "outbound_retry_total",
        "Connection establishment retries by protocol",
        &["protocol"],
    )
});

static BYTES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "outbound_bytes_total",
        "Bytes forwarded through outbounds by protocol and direction",
        &["protocol", "dir"],
    )
});

static ACTIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "outbound_active_connections",
        "Outbound connections currently in the Ready state",
    )
    .expect("valid gauge definition");
    REGISTRY.register(Box::new(gauge.clone())).ok();
    gauge
});

fn register_counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let vec =
        IntCounterVec::new(Opts::new(name, help), labels).expect("valid counter definition");
    REGISTRY.register(Box::new(vec.clone())).ok();
    vec
}

pub fn inc_connect_attempt(protocol: &str, result: &str) {
    CONNECT_ATTEMPT_TOTAL
        .with_label_values(&[protocol, result])
        .inc();
}

pub fn inc_handshake(protocol: &str, result: &str) {
    HANDSHAKE_TOTAL.with_label_values(&[protocol, result]).inc();
}

pub fn inc_retry(protocol: &str) {
    RETRY_TOTAL.with_label_values(&[protocol]).inc();
}

pub fn add_bytes(protocol: &str, dir: &str, n: u64) {
    BYTES_TOTAL.with_label_values(&[protocol, dir]).inc_by(n);
}

pub fn inc_active_connections() {
    ACTIVE_CONNECTIONS.inc();
}

pub fn dec_active_connections() {
    ACTIVE_CONNECTIONS.dec();
}

/// Current value of the live-connection gauge (tests and admin surfaces).
pub fn active_connections() -> i64 {
    ACTIVE_CONNECTIONS.get()
}

/// Render the registry in Prometheus text format.
pub fn export_prometheus() -> String {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buf) {
        warn!(error = %e, "metrics encode failed");
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

async fn handle(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => Ok(Response::new(Body::from(export_prometheus()))),
        _ => {
            let mut resp = Response::new(Body::empty());
            *resp.status_mut() = StatusCode::NOT_FOUND;
            Ok(resp)
        }
    }
}

/// Serve `/metrics` on `addr` until the task is dropped.
pub async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "metrics exporter listening");
    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = Http::new().serve_connection(stream, service_fn(handle)).await {
                warn!(error = %e, "metrics connection error");
            }
        });
    }
}

/// Spawn the exporter when `UT_METRICS_ADDR` is set; otherwise do nothing.
pub fn spawn_exporter_from_env() -> Option<JoinHandle<()>> {
    let addr: SocketAddr = std::env::var("UT_METRICS_ADDR").ok()?.parse().ok()?;
    Some(tokio::spawn(async move {
        if let Err(e) = serve(addr).await {
            warn!(error = %e, "metrics exporter stopped");
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_in_text_format() {
        inc_connect_attempt("test-proto", "ok");
        inc_handshake("test-proto", "ok");
        inc_retry("test-proto");
        add_bytes("test-proto", DIR_TX, 42);

        let text = export_prometheus();
        assert!(text.contains("outbound_connect_attempt_total"));
        assert!(text.contains("outbound_bytes_total"));
    }

    #[test]
    fn gauge_moves_both_ways() {
        let before = active_connections();
        inc_active_connections();
        assert_eq!(active_connections(), before + 1);
        dec_active_connections();
        assert_eq!(active_connections(), before);
    }
}
