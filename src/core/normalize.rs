use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::core::snapshot::{OsScanReport, PluginScanRecord, Snapshot, ALL_CVE_KEY};
use crate::core::vuln::{DetailTable, VulnId};

/// Normalize a raw OS audit into a [`Snapshot`].
///
/// Drops the `all_cve` aggregate key and any package with no ids (no finding
/// is possible for them), and carries through the cumulative fix command and
/// the clean-package list.
pub fn normalize_os(report: &OsScanReport, details: DetailTable) -> Snapshot {
    let mut subjects = BTreeMap::new();

    for (package, ids) in &report.packages {
        if package == ALL_CVE_KEY {
            continue;
        }
        if ids.is_empty() {
            debug!(package = %package, "package has no findings, dropped from snapshot");
            continue;
        }
        subjects.insert(package.clone(), ids.clone());
    }

    let cumulative_fix = if report.cumulative_fix.is_empty() {
        None
    } else {
        Some(report.cumulative_fix.clone())
    };

    build_snapshot(subjects, details, cumulative_fix, report.safe_packages.clone())
}

/// Normalize raw plugin audit records into a [`Snapshot`].
///
/// The subject key is the plugin's `package` identifier. Version is
/// metadata, not identity, so a plugin stays the same subject across
/// upgrades. Records with no ids become safe subjects.
pub fn normalize_plugins(records: &[PluginScanRecord], details: DetailTable) -> Snapshot {
    let mut subjects = BTreeMap::new();
    let mut safe_subjects = Vec::new();

    for record in records {
        if record.id.is_empty() {
            debug!(plugin = %record.package, "plugin has no findings, recorded as safe");
            safe_subjects.push(record.package.clone());
            continue;
        }
        subjects.insert(record.package.clone(), record.id.clone());
    }

    build_snapshot(subjects, details, None, safe_subjects)
}

/// Assemble the snapshot and restrict its detail table to referenced ids.
/// A referenced id missing from the table is logged as an
/// internal-consistency fault; the snapshot is still produced.
fn build_snapshot(
    subjects: BTreeMap<String, Vec<VulnId>>,
    details: DetailTable,
    cumulative_fix: Option<String>,
    safe_subjects: Vec<String>,
) -> Snapshot {
    let referenced: Vec<&VulnId> = subjects.values().flatten().collect();

    let details: DetailTable = details
        .into_iter()
        .filter(|(id, _)| referenced.contains(&id))
        .collect();

    let snapshot = Snapshot {
        subjects,
        details,
        cumulative_fix,
        safe_subjects,
    };

    for id in snapshot.missing_details() {
        warn!(id = %id, "vulnerability referenced by a subject has no detail entry");
    }

    snapshot
}
