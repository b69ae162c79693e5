//! Protocol registry.
//!
//! Registration is explicit and happens once at startup: adapters add their
//! descriptors to a [`RegistryBuilder`], the app builds an immutable
//! [`Registry`] and installs it as the global snapshot. Lookups after that
//! are lock-free reads; there is no way to mutate a built registry.

use crate::config::OutboundConfig;
use crate::error::CoreError;
use crate::handshake::HandshakeStrategy;
use crate::lifecycle::Outbound;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use ut_transport::Dialer;

/// Result of binding raw options for one protocol: everything the lifecycle
/// layer needs, with no I/O performed yet.
pub struct BoundOutbound {
    pub config: OutboundConfig,
    pub dialer: Arc<dyn Dialer>,
    pub handshake: Arc<dyn HandshakeStrategy>,
}

impl std::fmt::Debug for BoundOutbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundOutbound")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

pub type BindFn =
    Arc<dyn Fn(&serde_json::Value) -> Result<BoundOutbound, CoreError> + Send + Sync>;

pub struct ProtocolDescriptor {
    pub id: &'static str,
    /// Well-known port applied when the config omits one; `0` means the
    /// config must name a port explicitly.
    pub default_port: u16,
    pub bind: BindFn,
}

#[derive(Default)]
pub struct RegistryBuilder {
    descriptors: HashMap<&'static str, ProtocolDescriptor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, desc: ProtocolDescriptor) -> Result<(), CoreError> {
        if self.descriptors.contains_key(desc.id) {
            return Err(CoreError::DuplicateProtocol(desc.id.to_string()));
        }
        tracing::debug!(protocol = desc.id, "protocol registered");
        self.descriptors.insert(desc.id, desc);
        Ok(())
    }

    pub fn build(self) -> Registry {
        Registry {
            descriptors: self.descriptors,
        }
    }
}

pub struct Registry {
    descriptors: HashMap<&'static str, ProtocolDescriptor>,
}

impl Registry {
    pub fn lookup(&self, id: &str) -> Option<&ProtocolDescriptor> {
        self.descriptors.get(id)
    }

    /// Registered protocol ids, sorted for stable log output.
    pub fn protocols(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.descriptors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Look up `id`, bind `options`, and wrap the result into a fresh
    /// [`Outbound`] in the `Idle` state.
    pub fn bind(&self, id: &str, options: &serde_json::Value) -> Result<Outbound, CoreError> {
        let desc = self
            .lookup(id)
            .ok_or_else(|| CoreError::UnknownProtocol(id.to_string()))?;
        let bound = (desc.bind)(options)?;
        Ok(Outbound::new(bound))
    }
}

static GLOBAL: OnceCell<Registry> = OnceCell::new();

/// Install the process-wide registry. The first call wins; later calls are
/// ignored with a warning.
pub fn install_global(registry: Registry) {
    if GLOBAL.set(registry).is_err() {
        tracing::warn!("global registry already installed; ignoring");
    }
}

pub fn global() -> Option<&'static Registry> {
    GLOBAL.get()
}
