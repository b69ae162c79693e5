//! Plain TCP passthrough. No well-known port, so the config must name one.

use std::sync::Arc;
use ut_core::{BoundOutbound, CoreError, NoopHandshake, OutboundConfig, ProtocolDescriptor};
use ut_transport::TcpDialer;

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor {
        id: "direct",
        default_port: 0,
        bind: Arc::new(bind),
    }
}

fn bind(options: &serde_json::Value) -> Result<BoundOutbound, CoreError> {
    let config = OutboundConfig::bind("direct", 0, options)?;
    Ok(BoundOutbound {
        config,
        dialer: Arc::new(TcpDialer),
        handshake: Arc::new(NoopHandshake),
    })
}
