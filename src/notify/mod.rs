use colored::Colorize;

use crate::audit::AuditSummary;
use crate::error::AuditError;

/// Delivery seam for the joint new-findings report. One notification per
/// run, covering both domains.
pub trait Notifier {
    fn notify(&self, summary: &AuditSummary) -> Result<(), AuditError>;
}

/// Renders the joint report to stdout.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, summary: &AuditSummary) -> Result<(), AuditError> {
        println!();
        println!(
            "{}",
            format!("⚠ {} NEW VULNERABILITIES FOUND", summary.total_findings())
                .red()
                .bold()
        );
        println!();

        for outcome in summary.domains() {
            if outcome.findings.is_empty() {
                continue;
            }

            println!(
                "{}",
                format!("{} findings:", capitalize(outcome.domain.as_str()))
                    .red()
                    .bold()
            );
            println!();
            for finding in &outcome.findings {
                println!(
                    "  • {} ({} {})",
                    finding.subject.yellow().bold(),
                    finding.top.score,
                    finding.top.severity.dimmed()
                );
                if !finding.top.title.is_empty() {
                    println!("    {}", finding.top.title);
                }
                println!(
                    "    Ids: {}",
                    finding
                        .vuln_ids
                        .iter()
                        .map(|id| id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                        .cyan()
                );
            }
            println!();
        }

        println!("{}", "Recommended Actions:".bold());
        println!("  1. Apply vendor security updates for the affected packages");
        println!("  2. Update or disable vulnerable plugins");
        println!("  3. Re-run the audit after patching to confirm the fix");
        println!();

        Ok(())
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
