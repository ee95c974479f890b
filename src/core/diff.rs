use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::snapshot::Snapshot;
use crate::core::vuln::{resolve_max, DetailTable, VulnDetail, VulnId};
use crate::error::AuditError;

/// One newly-vulnerable subject: the ids that are new relative to the
/// previous snapshot and the highest-severity detail among them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatFinding {
    pub subject: String,

    #[serde(rename = "vulnIds")]
    pub vuln_ids: Vec<VulnId>,

    pub top: VulnDetail,
}

/// Compute the newly-vulnerable subjects in `current` relative to
/// `previous`.
///
/// Pure over the two snapshots:
/// - absent or structurally empty `previous`: every subject with at least
///   one id is a finding with its full id set;
/// - subject absent from `previous`: finding with the full current id set;
/// - subject present in both: finding with only the ids not already in the
///   previous set (empty previous set counts as empty, not an error);
/// - subjects only in `previous` never appear; the diff is one-directional.
///
/// Ids are resolved against `current`'s detail table only; a subject whose
/// ids cannot be resolved is logged and skipped so one corrupt record does
/// not blank the whole delta. Output is sorted by top score, descending,
/// with a stable sort over the snapshot's deterministic subject order.
pub fn diff(previous: Option<&Snapshot>, current: &Snapshot) -> Vec<FlatFinding> {
    let previous = previous.filter(|s| !s.is_empty());
    let mut findings = Vec::new();

    for (subject, ids) in &current.subjects {
        if ids.is_empty() {
            continue;
        }

        let new_ids: Vec<VulnId> = match previous.and_then(|p| p.subjects.get(subject)) {
            Some(old) => ids.iter().filter(|id| !old.contains(id)).cloned().collect(),
            None => ids.clone(),
        };

        if new_ids.is_empty() {
            continue;
        }

        match flatten(subject, new_ids, &current.details) {
            Ok(finding) => findings.push(finding),
            Err(err) => {
                warn!(subject = %subject, error = %err, "skipping subject with unresolvable vulnerability");
            }
        }
    }

    findings.sort_by(|a, b| {
        b.top
            .score
            .partial_cmp(&a.top.score)
            .unwrap_or(Ordering::Equal)
    });

    findings
}

fn flatten(
    subject: &str,
    vuln_ids: Vec<VulnId>,
    details: &DetailTable,
) -> Result<FlatFinding, AuditError> {
    let top = resolve_max(&vuln_ids, details)?.clone();
    Ok(FlatFinding {
        subject: subject.to_string(),
        vuln_ids,
        top,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn id(s: &str) -> VulnId {
        VulnId::new(s).unwrap()
    }

    fn detail(score: f64) -> VulnDetail {
        VulnDetail {
            score,
            vulners_score: None,
            title: String::new(),
            severity: String::new(),
        }
    }

    /// Snapshot from (subject, ids) pairs; details get score = 5.0 unless
    /// overridden via `scores`.
    fn snapshot(subjects: &[(&str, &[&str])], scores: &[(&str, f64)]) -> Snapshot {
        let mut map = BTreeMap::new();
        let mut details = DetailTable::new();

        for (subject, ids) in subjects {
            map.insert(
                subject.to_string(),
                ids.iter().map(|s| id(s)).collect::<Vec<_>>(),
            );
            for raw in ids.iter() {
                let score = scores
                    .iter()
                    .find(|(name, _)| name == raw)
                    .map(|(_, s)| *s)
                    .unwrap_or(5.0);
                details.insert(id(raw), detail(score));
            }
        }

        Snapshot {
            subjects: map,
            details,
            cumulative_fix: None,
            safe_subjects: Vec::new(),
        }
    }

    #[test]
    fn test_first_run_reports_every_vulnerable_subject() {
        // P1: diff(absent, current) = one finding per non-empty subject.
        let current = snapshot(&[("bash", &["CVE-1"]), ("nginx", &["CVE-2", "CVE-3"])], &[]);

        let findings = diff(None, &current);

        assert_eq!(findings.len(), 2);
        let subjects: Vec<&str> = findings.iter().map(|f| f.subject.as_str()).collect();
        assert!(subjects.contains(&"bash"));
        assert!(subjects.contains(&"nginx"));
    }

    #[test]
    fn test_empty_previous_snapshot_treated_as_absent() {
        let previous = Snapshot::empty();
        let current = snapshot(&[("nginx", &["CVE-1"])], &[]);

        let findings = diff(Some(&previous), &current);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].vuln_ids, vec![id("CVE-1")]);
    }

    #[test]
    fn test_diff_against_self_is_empty() {
        // P2: no id is new relative to itself.
        let snap = snapshot(&[("bash", &["CVE-1"]), ("nginx", &["CVE-2", "CVE-3"])], &[]);

        assert!(diff(Some(&snap), &snap).is_empty());
    }

    #[test]
    fn test_new_subject_reported_with_full_id_set() {
        // P3
        let previous = snapshot(&[("bash", &["CVE-1"])], &[]);
        let current = snapshot(
            &[("bash", &["CVE-1"]), ("nginx", &["CVE-2", "CVE-3"])],
            &[],
        );

        let findings = diff(Some(&previous), &current);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].subject, "nginx");
        assert_eq!(findings[0].vuln_ids, vec![id("CVE-2"), id("CVE-3")]);
    }

    #[test]
    fn test_incremental_ids_reported_only() {
        // P4: previous {A}, current {A, B} -> finding with exactly {B}.
        let previous = snapshot(&[("nginx", &["CVE-A"])], &[]);
        let current = snapshot(&[("nginx", &["CVE-A", "CVE-B"])], &[]);

        let findings = diff(Some(&previous), &current);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].vuln_ids, vec![id("CVE-B")]);
    }

    #[test]
    fn test_id_at_first_position_counts_as_known() {
        // A match at index 0 of the previous list is still a match.
        let previous = snapshot(&[("nginx", &["CVE-A", "CVE-B"])], &[]);
        let current = snapshot(&[("nginx", &["CVE-A", "CVE-B"])], &[]);

        assert!(diff(Some(&previous), &current).is_empty());
    }

    #[test]
    fn test_findings_sorted_by_score_descending() {
        // P5: {A:5, B:9} resolves max to B; output ordered by max score.
        let current = snapshot(
            &[("low", &["CVE-A"]), ("high", &["CVE-A", "CVE-B"])],
            &[("CVE-A", 5.0), ("CVE-B", 9.0)],
        );

        let findings = diff(None, &current);

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].subject, "high");
        assert_eq!(findings[0].top.score, 9.0);
        assert_eq!(findings[1].subject, "low");
        assert_eq!(findings[1].top.score, 5.0);
    }

    #[test]
    fn test_dropped_subject_produces_no_finding() {
        // P6: subjects only in previous are silent.
        let previous = snapshot(&[("gone", &["CVE-1"]), ("nginx", &["CVE-2"])], &[]);
        let current = snapshot(&[("nginx", &["CVE-2"])], &[]);

        assert!(diff(Some(&previous), &current).is_empty());
    }

    #[test]
    fn test_same_package_new_ids_after_version_change() {
        // Plugin identity survives a version change; only CVE-2 is new.
        let previous = snapshot(&[("plugin-a", &["CVE-1"])], &[]);
        let current = snapshot(&[("plugin-a", &["CVE-1", "CVE-2"])], &[]);

        let findings = diff(Some(&previous), &current);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].subject, "plugin-a");
        assert_eq!(findings[0].vuln_ids, vec![id("CVE-2")]);
    }

    #[test]
    fn test_unresolvable_subject_skipped_not_fatal() {
        // One corrupt record must not blank the whole delta.
        let mut current = snapshot(&[("bad", &["CVE-1"]), ("good", &["CVE-2"])], &[]);
        current.details.remove(&id("CVE-1"));

        let findings = diff(None, &current);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].subject, "good");
    }

    #[test]
    fn test_ids_resolved_against_current_table() {
        // The previous snapshot's detail table must never be consulted.
        let mut previous = snapshot(&[("nginx", &["CVE-A"])], &[("CVE-A", 1.0)]);
        previous.details.insert(id("CVE-B"), detail(9.9));

        let current = snapshot(&[("nginx", &["CVE-A", "CVE-B"])], &[("CVE-B", 3.0)]);

        let findings = diff(Some(&previous), &current);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].top.score, 3.0);
    }
}
