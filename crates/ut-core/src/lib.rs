//! ut-core: the outbound dispatch-and-lifecycle layer of utp-core.
//!
//! Protocol adapters contribute [`ProtocolDescriptor`]s; the app builds the
//! [`Registry`] once and binds config blobs into [`Outbound`]s. Each outbound
//! manages one lazily established connection: dial through a
//! [`ut_transport::Dialer`], negotiate via a [`HandshakeStrategy`], then
//! forward bytes through a [`TrackedStream`] until closed.

pub mod config;
pub mod conn;
pub mod error;
pub mod handshake;
pub mod lifecycle;
pub mod registry;

pub use config::{Credentials, OutboundConfig, TlsOptions};
pub use conn::TrackedStream;
pub use error::CoreError;
pub use handshake::{HandshakeStrategy, NoopHandshake};
pub use lifecycle::{ConnState, Outbound};
pub use registry::{
    global, install_global, BindFn, BoundOutbound, ProtocolDescriptor, Registry, RegistryBuilder,
};
