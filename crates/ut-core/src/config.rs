//! Configuration binding for outbounds.
//!
//! Protocol options arrive as a raw `serde_json::Value` blob from the config
//! file. Binding extracts the common envelope, applies defaults, validates,
//! and hands per-protocol fields through untouched. Binding performs no I/O;
//! a bound config can exist for an unreachable server.

use crate::error::CoreError;
use serde::Deserialize;
use std::time::Duration;
use ut_transport::RetryPolicy;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// TLS material carried opaquely to the transport layer. The core never
/// parses PEM blobs; it only moves them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsOptions {
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default, alias = "ca")]
    pub ca_pem: Option<String>,
    #[serde(default, alias = "cert")]
    pub cert_pem: Option<String>,
    #[serde(default, alias = "key")]
    pub key_pem: Option<String>,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub alpn: Vec<String>,
    #[serde(default)]
    pub next_proto: Option<String>,
}

impl TlsOptions {
    /// ALPN list, falling back to the single `next_proto` field used by
    /// older configs.
    pub fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        if !self.alpn.is_empty() {
            self.alpn.iter().map(|p| p.as_bytes().to_vec()).collect()
        } else {
            self.next_proto
                .iter()
                .map(|p| p.as_bytes().to_vec())
                .collect()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Validated common record shared by every outbound, whatever the protocol.
#[derive(Debug, Clone)]
pub struct OutboundConfig {
    pub protocol: String,
    pub server: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub retry: RetryPolicy,
    pub tls: Option<TlsOptions>,
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Deserialize)]
struct RetrySettings {
    #[serde(default)]
    max_attempts: Option<u32>,
    #[serde(default)]
    base_delay_ms: Option<u64>,
    #[serde(default)]
    backoff: Option<f64>,
    #[serde(default)]
    jitter: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawCommon {
    #[serde(default)]
    server: Option<String>,
    #[serde(default, alias = "server_port")]
    port: Option<u16>,
    #[serde(default)]
    connect_timeout_sec: Option<u64>,
    #[serde(default)]
    read_timeout_sec: Option<u64>,
    #[serde(default)]
    write_timeout_sec: Option<u64>,
    #[serde(default)]
    idle_timeout_sec: Option<u64>,
    #[serde(default)]
    retry: Option<RetrySettings>,
    // The bare `tls` key is a protocol-level boolean in some configs, so the
    // envelope only claims `tls_config`.
    #[serde(default)]
    tls_config: Option<TlsOptions>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl OutboundConfig {
    /// Bind the common envelope out of a raw options blob.
    ///
    /// `default_port` comes from the protocol descriptor; a descriptor with
    /// `default_port == 0` makes an explicit port mandatory.
    pub fn bind(
        protocol: &str,
        default_port: u16,
        options: &serde_json::Value,
    ) -> Result<Self, CoreError> {
        let raw: RawCommon = serde_json::from_value(options.clone())
            .map_err(|e| CoreError::invalid_config(protocol, e.to_string()))?;

        let server = raw.server.unwrap_or_default();
        if server.is_empty() {
            return Err(CoreError::invalid_config(protocol, "server is required"));
        }
        let port = raw.port.unwrap_or(default_port);
        if port == 0 {
            return Err(CoreError::invalid_config(protocol, "port is required"));
        }

        let retry = match raw.retry {
            Some(r) => {
                let defaults = RetryPolicy::default();
                RetryPolicy::new(
                    r.max_attempts.unwrap_or(defaults.max_attempts),
                    r.base_delay_ms
                        .map(Duration::from_millis)
                        .unwrap_or(defaults.base_delay),
                    r.backoff.unwrap_or(defaults.backoff),
                )
                .with_jitter(r.jitter.unwrap_or(defaults.jitter))
            }
            None => RetryPolicy::default(),
        };

        let credentials = if raw.username.is_some() || raw.password.is_some() {
            Some(Credentials {
                username: raw.username,
                password: raw.password,
            })
        } else {
            None
        };

        Ok(Self {
            protocol: protocol.to_string(),
            server,
            port,
            connect_timeout: raw
                .connect_timeout_sec
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            read_timeout: raw
                .read_timeout_sec
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_READ_TIMEOUT),
            write_timeout: raw
                .write_timeout_sec
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_WRITE_TIMEOUT),
            idle_timeout: raw
                .idle_timeout_sec
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_IDLE_TIMEOUT),
            retry,
            tls: raw.tls_config,
            credentials,
        })
    }
}
