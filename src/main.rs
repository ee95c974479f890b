use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vulnwatch::{cli::Cli, store::local::LocalStateStore};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let store = LocalStateStore::new(cli.state_dir.clone());
    cli.run(store)
}
