use std::collections::HashMap;
use std::fmt::Display;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// Vulnerability identifier (e.g., "CVE-2025-55183" or a vendor id like
/// "WPVDB-10021").
///
/// The scanner API mixes CVE ids with its own document ids, so validation is
/// deliberately loose: non-empty, no whitespace, bounded length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VulnId(String);

impl VulnId {
    pub fn new(s: impl AsRef<str>) -> Result<Self> {
        let s = s.as_ref();

        if s.is_empty() {
            anyhow::bail!("Vulnerability id cannot be empty");
        }

        if s.len() > 128 {
            anyhow::bail!("Vulnerability id cannot exceed 128 characters");
        }

        if s.chars().any(|c| c.is_whitespace()) {
            anyhow::bail!("Vulnerability id cannot contain whitespace: '{}'", s);
        }

        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for VulnId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VulnId {
    type Error = anyhow::Error;
    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<VulnId> for String {
    fn from(id: VulnId) -> String {
        id.0
    }
}

impl Display for VulnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Details for one vulnerability, as fetched from the scanner's document
/// search. Immutable once fetched; keyed by [`VulnId`] within the snapshot
/// that fetched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnDetail {
    pub score: f64,

    #[serde(rename = "vulnersScore", default, skip_serializing_if = "Option::is_none")]
    pub vulners_score: Option<f64>,

    pub title: String,

    #[serde(rename = "severityText", default)]
    pub severity: String,
}

/// Lookup table from id to detail, scoped to a single snapshot.
pub type DetailTable = HashMap<VulnId, VulnDetail>;

/// Pick the highest-severity entry among `ids`.
///
/// Linear scan in input order; only a strictly greater score replaces the
/// current champion, so ties keep the first-encountered entry. Every id must
/// resolve in `details`; a miss is an internal-consistency fault
/// ([`AuditError::UnknownVuln`]) the caller decides how to contain.
pub fn resolve_max<'a>(ids: &[VulnId], details: &'a DetailTable) -> Result<&'a VulnDetail, AuditError> {
    let mut top: Option<&VulnDetail> = None;

    for id in ids {
        let detail = details
            .get(id)
            .ok_or_else(|| AuditError::UnknownVuln(id.clone()))?;

        match top {
            Some(current) if detail.score <= current.score => {}
            _ => top = Some(detail),
        }
    }

    top.ok_or(AuditError::EmptyVulnSet)
}
