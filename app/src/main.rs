mod cli;
mod config_loader;
mod logging;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
