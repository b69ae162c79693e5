//! ut-adapters: per-protocol outbound bindings.
//!
//! Each module under [`outbound`] owns one protocol family: its typed config
//! struct, the dial chain assembled from ut-transport decorators, and the
//! post-connect handshake strategy. [`register_all`] wires every descriptor
//! into a registry builder; the app calls it exactly once at startup.

pub mod outbound;
pub mod register;

pub use register::register_all;
