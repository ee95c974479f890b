use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::vuln::{DetailTable, VulnId};

/// Aggregate key the OS audit carries alongside real package entries; it
/// holds the union of every package's ids and is never a subject itself.
pub const ALL_CVE_KEY: &str = "all_cve";

/// Normalized result of one scan domain at a point in time.
///
/// Subjects map to the vulnerability ids found for them; every referenced id
/// resolves in `details` of the *same* snapshot. Detail tables may differ
/// between runs, so ids must never be resolved against another snapshot's
/// table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Subject name → vulnerability ids, in scanner order. BTreeMap keeps
    /// iteration deterministic across runs.
    pub subjects: BTreeMap<String, Vec<VulnId>>,

    pub details: DetailTable,

    /// Cumulative remediation command for the OS domain, when the scanner
    /// provides one.
    #[serde(rename = "cumulativeFix", default, skip_serializing_if = "Option::is_none")]
    pub cumulative_fix: Option<String>,

    /// Subjects that were scanned and came back clean.
    #[serde(rename = "safeSubjects", default)]
    pub safe_subjects: Vec<String>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            subjects: BTreeMap::new(),
            details: DetailTable::new(),
            cumulative_fix: None,
            safe_subjects: Vec::new(),
        }
    }

    /// A snapshot with no subjects is treated the same as an absent one by
    /// the delta engine.
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn vuln_ids(&self, subject: &str) -> Option<&[VulnId]> {
        self.subjects.get(subject).map(Vec::as_slice)
    }

    /// Ids referenced by a subject but absent from the detail table.
    /// A non-empty result is an internal-consistency fault.
    pub fn missing_details(&self) -> Vec<&VulnId> {
        self.subjects
            .values()
            .flatten()
            .filter(|id| !self.details.contains_key(*id))
            .collect()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Raw OS audit result as produced by the scanner API: per-package merged
/// id lists (including the [`ALL_CVE_KEY`] aggregate), the cumulative fix
/// command, and the submitted packages no vulnerability matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsScanReport {
    pub packages: BTreeMap<String, Vec<VulnId>>,

    #[serde(rename = "cumulativeFix", default)]
    pub cumulative_fix: String,

    #[serde(rename = "safePackages", default)]
    pub safe_packages: Vec<String>,
}

impl OsScanReport {
    /// Union of every package's ids, for the bulk detail fetch. Prefers the
    /// scanner's own aggregate entry when present.
    pub fn all_vuln_ids(&self) -> Vec<VulnId> {
        if let Some(all) = self.packages.get(ALL_CVE_KEY) {
            return all.clone();
        }

        let mut ids = Vec::new();
        for (name, pkg_ids) in &self.packages {
            if name == ALL_CVE_KEY {
                continue;
            }
            for id in pkg_ids {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }
}

/// Raw plugin audit record: the scan response joined against the submitted
/// plugin inventory. `package` is the stable identity; `version` and `name`
/// are metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginScanRecord {
    pub package: String,
    pub version: String,
    pub name: String,
    pub id: Vec<VulnId>,
}

impl PluginScanRecord {
    /// Unique ids across a set of records, preserving first-seen order.
    pub fn collect_ids(records: &[PluginScanRecord]) -> Vec<VulnId> {
        let mut ids = Vec::new();
        for record in records {
            for id in &record.id {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }
}
