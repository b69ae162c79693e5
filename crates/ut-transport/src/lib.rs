//! ut-transport: raw transport establishment for utp-core outbounds.
//!
//! Everything an outbound needs to obtain a byte stream lives here:
//! - [`Dialer`]: the async dial abstraction and its basic implementations
//! - decorators ([`TlsDialer`], [`HttpProxyDialer`], [`PayloadDialer`]) that
//!   compose over any inner dialer
//! - [`RetryPolicy`]: exponential backoff with jitter for connect attempts
//! - [`mem::DuplexDialer`]: in-memory pipe for network-less tests

pub mod dialer;
pub mod mem;
pub mod payload;
pub mod proxy;
pub mod retry;
pub mod tls;
pub mod util;

pub use dialer::{AsyncReadWrite, DialError, Dialer, FnDialer, IoStream, TcpDialer};
pub use payload::PayloadDialer;
pub use proxy::HttpProxyDialer;
pub use retry::RetryPolicy;
pub use tls::TlsDialer;
pub use util::dial_with_timeout;
