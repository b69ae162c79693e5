//! Explicit protocol registration.

use crate::outbound;
use ut_core::{CoreError, RegistryBuilder};

/// Register every built-in protocol descriptor. Call once at startup,
/// before the registry is built and installed.
pub fn register_all(builder: &mut RegistryBuilder) -> Result<(), CoreError> {
    builder.register(outbound::direct::descriptor())?;
    builder.register(outbound::ssh::descriptor())?;
    builder.register(outbound::dns::descriptor())?;
    builder.register(outbound::obfs::obfs4_descriptor())?;
    builder.register(outbound::obfs::meek_descriptor())?;
    builder.register(outbound::httpinject::descriptor())?;
    builder.register(outbound::psiphon::descriptor())?;
    builder.register(outbound::legacyvpn::descriptor())?;
    builder.register(outbound::warp::descriptor())?;
    builder.register(outbound::stealth::descriptor())?;
    Ok(())
}
