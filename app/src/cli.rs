//! Command-line entry points.
//!
//! `run` binds every configured outbound and serves until interrupted;
//! `check` stops after binding, so a bad config fails fast with no network
//! I/O either way (establishment is lazy).

use crate::{config_loader, logging};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use ut_core::{Outbound, Registry, RegistryBuilder};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "utp-core", version, about = "Pluggable outbound tunnel core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run with the given config until interrupted
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate the config and exit
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init()?;
    match cli.command {
        Command::Run { config } => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("building runtime")?;
            rt.block_on(serve(&config))
        }
        Command::Check { config } => {
            let (_, outbounds) = bind_all(&config)?;
            info!(outbounds = outbounds.len(), "config ok");
            Ok(())
        }
    }
}

fn build_registry() -> Result<Registry> {
    let mut builder = RegistryBuilder::new();
    ut_adapters::register_all(&mut builder)?;
    Ok(builder.build())
}

/// Load the config and bind every outbound. Binding is pure, so this is
/// shared between `run` and `check`.
fn bind_all(path: &Path) -> Result<(Registry, Vec<Arc<Outbound>>)> {
    let config = config_loader::load(path)?;
    let registry = build_registry()?;

    let mut outbounds = Vec::with_capacity(config.outbounds.len());
    for entry in &config.outbounds {
        let outbound = registry
            .bind(&entry.protocol, &entry.options_value())
            .with_context(|| format!("binding outbound {:?}", entry.tag()))?;
        info!(tag = entry.tag(), protocol = %entry.protocol, "outbound bound");
        outbounds.push(Arc::new(outbound));
    }
    Ok((registry, outbounds))
}

async fn serve(path: &Path) -> Result<()> {
    let (registry, outbounds) = bind_all(path)?;
    info!(protocols = ?registry.protocols(), "protocol registry ready");
    ut_core::install_global(registry);

    let _exporter = ut_metrics::spawn_exporter_from_env();
    info!(outbounds = outbounds.len(), "utp-core started");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    let closing = async {
        for outbound in &outbounds {
            outbound.close().await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, closing).await.is_err() {
        warn!(grace = ?SHUTDOWN_GRACE, "shutdown grace period expired");
    } else {
        info!("all outbounds closed");
    }
    Ok(())
}
