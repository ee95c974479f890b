use std::collections::HashMap;

use crate::core::snapshot::{OsScanReport, PluginScanRecord};
use crate::core::vuln::{DetailTable, VulnId};
use crate::error::AuditError;
use crate::inventory::{Packager, PluginInfo};

pub mod vulners;

/// Remote vulnerability scanner seam.
///
/// Every call is blocking, short-lived and bounded by a request timeout;
/// there are no retries. A failed call aborts the affected domain's cycle
/// for this invocation only.
pub trait ScanApi {
    /// Supported operating systems and their package manager
    fn supported_os(&self) -> Result<HashMap<String, Packager>, AuditError>;

    /// Audit an OS package inventory
    fn audit_os(
        &self,
        os: &str,
        version: &str,
        packages: &[String],
    ) -> Result<OsScanReport, AuditError>;

    /// Audit an installed-plugin inventory
    fn audit_plugins(&self, plugins: &[PluginInfo]) -> Result<Vec<PluginScanRecord>, AuditError>;

    /// Bulk-fetch details for a set of vulnerability ids
    fn vuln_details(&self, ids: &[VulnId]) -> Result<DetailTable, AuditError>;
}
