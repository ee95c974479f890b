use anyhow::Result;
use colored::Colorize;

use crate::audit::{Auditor, DomainStatus};
use crate::inventory::Inventory;
use crate::notify::Notifier;
use crate::remote::ScanApi;
use crate::store::StateStore;

pub fn handle<A, I, S, N>(auditor: &Auditor<A, I, S, N>) -> Result<()>
where
    A: ScanApi + Sync,
    I: Inventory + Sync,
    S: StateStore + Sync,
    N: Notifier + Sync,
{
    println!();
    println!("{}", "=== Starting Host Audit ===".bold().cyan());
    println!();

    let summary = auditor.run();

    for outcome in summary.domains() {
        match outcome.status {
            DomainStatus::Failed => println!(
                "{} {} audit failed, stored state left untouched",
                "[ERROR]".red(),
                outcome.domain
            ),
            _ => println!(
                "{} {} audit complete ({} new finding{})",
                "[SUCCESS]".green(),
                outcome.domain,
                outcome.findings.len(),
                if outcome.findings.len() == 1 { "" } else { "s" }
            ),
        }
    }
    println!();

    if summary.has_findings() {
        // Details were already rendered by the notifier.
        std::process::exit(1);
    }

    println!("{}", "✓ No new vulnerabilities found!".green().bold());
    println!();

    Ok(())
}
