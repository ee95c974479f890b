use anyhow::Result;
use colored::Colorize;

use crate::store::{Domain, StateStore};

pub fn handle(store: &impl StateStore) -> Result<()> {
    println!();
    println!("{}", "=== Audit Status ===".bold().cyan());
    println!();

    for domain in Domain::ALL {
        match store.last_scan(domain)? {
            Some(ts) => println!("{:<8} last scanned {}", domain.as_str(), ts),
            None => println!("{:<8} {}", domain.as_str(), "never scanned".yellow()),
        }
    }
    println!();

    Ok(())
}
