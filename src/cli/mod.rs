use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod commands;

use crate::audit::Auditor;
use crate::inventory::HostInventory;
use crate::notify::ConsoleNotifier;
use crate::remote::vulners::VulnersClient;
use crate::store::{Domain, StateStore};

#[derive(Parser)]
#[command(name = "vulnwatch")]
#[command(about = "Host vulnerability audit against the Vulners database")]
#[command(version)]
pub struct Cli {
    /// Vulners API key (falls back to the VULNERS_API_KEY environment variable)
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Plugin inventory manifest
    #[arg(long, global = true, default_value = "plugins.json")]
    pub plugins_file: PathBuf,

    /// Directory holding the persisted per-domain snapshots
    #[arg(long, global = true, default_value = "state")]
    pub state_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Audit both domains and notify if anything new was found
    Run,

    /// Print the latest snapshot for one domain
    Report {
        /// Domain to report on: "os" or "plugins"
        domain: String,

        /// Scan now instead of serving the stored snapshot
        #[arg(short, long)]
        refresh: bool,
    },

    /// Show when each domain last completed a scan
    Status,
}

impl Cli {
    pub fn run(self, store: impl StateStore + Sync) -> Result<()> {
        match self.command {
            Commands::Run => {
                let auditor = self.build_auditor(store)?;
                commands::run::handle(&auditor)
            }

            Commands::Report { ref domain, refresh } => {
                let domain = Domain::from_str(domain).map_err(anyhow::Error::msg)?;
                let auditor = self.build_auditor(store)?;
                commands::report::handle(&auditor, domain, refresh)
            }

            Commands::Status => commands::status::handle(&store),
        }
    }

    fn build_auditor<S: StateStore + Sync>(
        &self,
        store: S,
    ) -> Result<Auditor<VulnersClient, HostInventory, S, ConsoleNotifier>> {
        let api = VulnersClient::new(resolve_api_key(self.api_key.clone())?)?;
        let inventory = HostInventory::new(self.plugins_file.clone());

        Ok(Auditor::new(api, inventory, store, ConsoleNotifier))
    }
}

fn resolve_api_key(flag: Option<String>) -> Result<String> {
    if let Some(key) = flag {
        return Ok(key);
    }

    match std::env::var("VULNERS_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => anyhow::bail!("No API key provided. Pass --api-key or set VULNERS_API_KEY."),
    }
}
