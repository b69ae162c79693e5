//! WARP endpoint outbound.
//!
//! Carries the registration-style knobs (keys, license, team) and validates
//! them per mode. The WireGuard wire crypto itself is out of scope; the
//! transport is a plain TCP fallback with no post-connect exchange.

use crate::outbound::parse_options;
use serde::Deserialize;
use std::sync::Arc;
use ut_core::{BoundOutbound, CoreError, NoopHandshake, OutboundConfig, ProtocolDescriptor};
use ut_transport::TcpDialer;

#[derive(Debug, Default, Deserialize)]
struct WarpOptions {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    public_key: Option<String>,
    #[serde(default)]
    license_key: Option<String>,
    #[serde(default)]
    team_id: Option<String>,
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor {
        id: "warp",
        default_port: 2408,
        bind: Arc::new(bind),
    }
}

fn bind(options: &serde_json::Value) -> Result<BoundOutbound, CoreError> {
    let config = OutboundConfig::bind("warp", 2408, options)?;
    let opts: WarpOptions = parse_options("warp", options)?;

    match opts.mode.as_deref().unwrap_or("wireguard") {
        "wireguard" => {
            if opts.private_key.as_deref().unwrap_or("").is_empty()
                || opts.public_key.as_deref().unwrap_or("").is_empty()
            {
                return Err(CoreError::invalid_config(
                    "warp",
                    "private_key and public_key are required",
                ));
            }
        }
        "warp+" => {
            if opts.license_key.as_deref().unwrap_or("").is_empty() {
                return Err(CoreError::invalid_config(
                    "warp",
                    "license_key is required for warp+",
                ));
            }
        }
        "team" => {
            if opts.team_id.as_deref().unwrap_or("").is_empty() {
                return Err(CoreError::invalid_config(
                    "warp",
                    "team_id is required for team mode",
                ));
            }
        }
        other => {
            return Err(CoreError::invalid_config(
                "warp",
                format!("unknown mode {other:?}"),
            ))
        }
    }

    Ok(BoundOutbound {
        config,
        dialer: Arc::new(TcpDialer),
        handshake: Arc::new(NoopHandshake),
    })
}
