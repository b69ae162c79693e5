//! Environment-driven logging setup.
//!
//! `UT_LOG_LEVEL` takes an `EnvFilter` directive (default `info`);
//! `UT_LOG_FORMAT` selects `compact` or `json` output.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

pub fn init() -> Result<()> {
    let level = std::env::var("UT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let format = std::env::var("UT_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.compact().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("logging init: {e}"))?;
    Ok(())
}
