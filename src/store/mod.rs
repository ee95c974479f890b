use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::diff::FlatFinding;
use crate::core::snapshot::Snapshot;
use crate::error::AuditError;

pub mod local;

/// One of the two scan categories, processed independently but notified
/// jointly. Also the key under which state is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Os,
    Plugins,
}

impl Domain {
    pub const ALL: [Domain; 2] = [Domain::Os, Domain::Plugins];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Os => "os",
            Domain::Plugins => "plugins",
        }
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "os" => Ok(Domain::Os),
            "plugins" => Ok(Domain::Plugins),
            other => Err(format!(
                "unknown domain '{}' (expected 'os' or 'plugins')",
                other
            )),
        }
    }
}

/// Persisted record for one domain: the last snapshot, when it was taken,
/// and the delta computed against its predecessor. Read at cycle start,
/// overwritten wholesale at cycle end. No partial updates, no history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    pub snapshot: Snapshot,

    #[serde(rename = "lastScan")]
    pub last_scan: DateTime<Utc>,

    #[serde(rename = "lastFindings", default)]
    pub last_findings: Vec<FlatFinding>,
}

/// Persistence abstraction for per-domain audit state
pub trait StateStore {
    /// Load the stored state for a domain, `None` on first run
    fn read(&self, domain: Domain) -> Result<Option<StoredState>, AuditError>;

    /// Overwrite the stored state for a domain
    fn write(&self, domain: Domain, state: &StoredState) -> Result<(), AuditError>;

    /// Timestamp of the last successful scan for a domain
    fn last_scan(&self, domain: Domain) -> Result<Option<DateTime<Utc>>, AuditError> {
        Ok(self.read(domain)?.map(|state| state.last_scan))
    }
}
