use anyhow::Result;
use colored::Colorize;

use crate::audit::{Auditor, DomainStatus};
use crate::inventory::Inventory;
use crate::notify::Notifier;
use crate::remote::ScanApi;
use crate::store::{Domain, StateStore};

pub fn handle<A, I, S, N>(auditor: &Auditor<A, I, S, N>, domain: Domain, refresh: bool) -> Result<()>
where
    A: ScanApi + Sync,
    I: Inventory + Sync,
    S: StateStore + Sync,
    N: Notifier + Sync,
{
    let report = auditor.report(domain, refresh);

    println!();
    println!(
        "{}",
        format!("=== {} Report ===", domain).bold().cyan()
    );
    println!();

    match report.status {
        DomainStatus::Fresh => println!("Source:    {}", "fresh scan".green()),
        DomainStatus::Cached => println!("Source:    {}", "stored snapshot".dimmed()),
        DomainStatus::Failed => {
            println!("Source:    {}", "scan failed".red().bold());
        }
    }
    match report.last_scan {
        Some(ts) => println!("Last scan: {}", ts),
        None => println!("Last scan: {}", "never".yellow()),
    }
    println!();

    if report.status == DomainStatus::Failed {
        anyhow::bail!("{} audit failed, no snapshot to show", domain);
    }

    if report.snapshot.is_empty() {
        println!("{}", "✓ No known vulnerabilities recorded.".green());
        println!();
        return Ok(());
    }

    for (subject, ids) in &report.snapshot.subjects {
        println!("{}", format!("• {}", subject).bold());
        for id in ids {
            match report.snapshot.details.get(id) {
                Some(detail) => println!(
                    "    {} ({} {})",
                    id.as_str().yellow(),
                    detail.score,
                    detail.severity.dimmed()
                ),
                None => println!("    {}", id.as_str().yellow()),
            }
        }
    }
    println!();

    if !report.snapshot.safe_subjects.is_empty() {
        println!(
            "Not affected: {} subject{}",
            report.snapshot.safe_subjects.len(),
            if report.snapshot.safe_subjects.len() == 1 { "" } else { "s" }
        );
    }

    if let Some(ref fix) = report.snapshot.cumulative_fix {
        println!("{}", "Suggested fix:".bold());
        println!("  {}", fix.cyan());
    }
    println!();

    Ok(())
}
