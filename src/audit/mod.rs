use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::core::diff::{diff, FlatFinding};
use crate::core::normalize::{normalize_os, normalize_plugins};
use crate::core::snapshot::{PluginScanRecord, Snapshot};
use crate::error::AuditError;
use crate::inventory::Inventory;
use crate::notify::Notifier;
use crate::remote::ScanApi;
use crate::store::{Domain, StateStore, StoredState};

/// How a domain report was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainStatus {
    /// A refresh ran and the snapshot is from this invocation.
    Fresh,
    /// Served from the stored snapshot without touching the network.
    Cached,
    /// The cycle aborted; stored state, if any, was left untouched.
    Failed,
}

/// Outcome of one domain's audit cycle within a full run.
#[derive(Debug, Clone)]
pub struct DomainOutcome {
    pub domain: Domain,
    pub status: DomainStatus,
    pub findings: Vec<FlatFinding>,
}

/// Joint result of a full run over both domains.
#[derive(Debug, Clone)]
pub struct AuditSummary {
    pub os: DomainOutcome,
    pub plugins: DomainOutcome,
}

impl AuditSummary {
    pub fn domains(&self) -> [&DomainOutcome; 2] {
        [&self.os, &self.plugins]
    }

    pub fn total_findings(&self) -> usize {
        self.os.findings.len() + self.plugins.findings.len()
    }

    pub fn has_findings(&self) -> bool {
        self.total_findings() > 0
    }
}

/// Snapshot-backed view of one domain for the presentation layer.
#[derive(Debug, Clone)]
pub struct DomainReport {
    pub domain: Domain,
    pub status: DomainStatus,
    pub snapshot: Snapshot,
    pub last_scan: Option<DateTime<Utc>>,
}

/// Last successful scan time per domain, `None` when a domain has never
/// completed a refresh.
#[derive(Debug, Clone)]
pub struct LastScans {
    pub os: Option<DateTime<Utc>>,
    pub plugins: Option<DateTime<Utc>>,
}

/// Drives audit cycles over both domains against injected collaborators.
pub struct Auditor<A, I, S, N> {
    api: A,
    inventory: I,
    store: S,
    notifier: N,
}

impl<A, I, S, N> Auditor<A, I, S, N>
where
    A: ScanApi + Sync,
    I: Inventory + Sync,
    S: StateStore + Sync,
    N: Notifier + Sync,
{
    pub fn new(api: A, inventory: I, store: S, notifier: N) -> Self {
        Self {
            api,
            inventory,
            store,
            notifier,
        }
    }

    /// Run one full audit over both domains and notify once if anything new
    /// was found.
    ///
    /// The domains have no data dependency on each other and run in
    /// parallel; the join is the barrier before the notify decision. A
    /// notification failure is logged and swallowed, never escalated.
    pub fn run(&self) -> AuditSummary {
        let (os, plugins) = rayon::join(
            || self.run_domain(Domain::Os),
            || self.run_domain(Domain::Plugins),
        );

        let summary = AuditSummary { os, plugins };

        if summary.has_findings() {
            info!(count = summary.total_findings(), "new vulnerabilities found");
            if let Err(err) = self.notifier.notify(&summary) {
                warn!(error = %err, "notification delivery failed");
            }
        } else {
            debug!("no new findings, skipping notification");
        }

        summary
    }

    /// Serve one domain's results, from the store when possible.
    ///
    /// Without `refresh`, a stored snapshot is returned as-is; a refresh (or
    /// a first run with nothing stored) performs the full fetch, normalize,
    /// diff and persist cycle. A failed refresh reports an empty snapshot
    /// with `Failed` status so callers can tell it apart from "nothing new".
    pub fn report(&self, domain: Domain, refresh: bool) -> DomainReport {
        if !refresh {
            match self.store.read(domain) {
                Ok(Some(state)) => {
                    return DomainReport {
                        domain,
                        status: DomainStatus::Cached,
                        snapshot: state.snapshot,
                        last_scan: Some(state.last_scan),
                    };
                }
                Ok(None) => debug!(domain = %domain, "no stored snapshot, refreshing"),
                Err(err) => warn!(domain = %domain, error = %err, "could not read stored snapshot"),
            }
        }

        match self.refresh_domain(domain) {
            Ok(state) => DomainReport {
                domain,
                status: DomainStatus::Fresh,
                snapshot: state.snapshot,
                last_scan: Some(state.last_scan),
            },
            Err(err) => {
                warn!(domain = %domain, error = %err, "audit cycle aborted");
                DomainReport {
                    domain,
                    status: DomainStatus::Failed,
                    snapshot: Snapshot::empty(),
                    last_scan: self.store.last_scan(domain).ok().flatten(),
                }
            }
        }
    }

    pub fn last_scan_times(&self) -> LastScans {
        LastScans {
            os: self.read_last_scan(Domain::Os),
            plugins: self.read_last_scan(Domain::Plugins),
        }
    }

    fn read_last_scan(&self, domain: Domain) -> Option<DateTime<Utc>> {
        match self.store.last_scan(domain) {
            Ok(ts) => ts,
            Err(err) => {
                warn!(domain = %domain, error = %err, "could not read last scan time");
                None
            }
        }
    }

    fn run_domain(&self, domain: Domain) -> DomainOutcome {
        match self.refresh_domain(domain) {
            Ok(state) => {
                info!(
                    domain = %domain,
                    findings = state.last_findings.len(),
                    "audit cycle complete"
                );
                DomainOutcome {
                    domain,
                    status: DomainStatus::Fresh,
                    findings: state.last_findings,
                }
            }
            Err(err) => {
                warn!(domain = %domain, error = %err, "audit cycle aborted");
                DomainOutcome {
                    domain,
                    status: DomainStatus::Failed,
                    findings: Vec::new(),
                }
            }
        }
    }

    /// One fetch, normalize, diff, persist cycle for a domain.
    ///
    /// Persisting happens whenever fetch and normalize succeeded; the diff
    /// is per-subject tolerant and cannot veto the write, which keeps
    /// forward progress even when the previous snapshot is troublesome.
    fn refresh_domain(&self, domain: Domain) -> Result<StoredState, AuditError> {
        let current = match domain {
            Domain::Os => self.fetch_os()?,
            Domain::Plugins => self.fetch_plugins()?,
        };

        // A read failure here must not block the cycle: treat it as a first
        // run and let the persist below repair the state file.
        let previous = match self.store.read(domain) {
            Ok(previous) => previous,
            Err(err) => {
                warn!(domain = %domain, error = %err, "could not read previous snapshot, treating as first run");
                None
            }
        };

        let findings = diff(previous.as_ref().map(|state| &state.snapshot), &current);

        let state = StoredState {
            snapshot: current,
            last_scan: Utc::now(),
            last_findings: findings,
        };
        self.store.write(domain, &state)?;

        Ok(state)
    }

    fn fetch_os(&self) -> Result<Snapshot, AuditError> {
        let release = self.inventory.os_release()?;

        let supported = self.api.supported_os()?;
        let packager = supported
            .get(&release.id)
            .copied()
            .ok_or_else(|| AuditError::UnsupportedOs(release.id.clone()))?;

        let packages = self.inventory.os_packages(packager)?;
        let report = self.api.audit_os(&release.id, &release.version, &packages)?;
        let details = self.api.vuln_details(&report.all_vuln_ids())?;

        Ok(normalize_os(&report, details))
    }

    fn fetch_plugins(&self) -> Result<Snapshot, AuditError> {
        let plugins = self.inventory.plugins()?;
        let records = self.api.audit_plugins(&plugins)?;
        let ids = PluginScanRecord::collect_ids(&records);
        let details = self.api.vuln_details(&ids)?;

        Ok(normalize_plugins(&records, details))
    }
}
