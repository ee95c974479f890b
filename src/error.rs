use thiserror::Error;

use crate::core::vuln::VulnId;

/// Failure taxonomy for an audit cycle.
///
/// `Network` and `BadResponse` abort only the affected domain's cycle;
/// `UnknownVuln` is caught per subject during diffing; `MissingApiKey`
/// surfaces before any network call is made.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("remote scanner unreachable: {0}")]
    Network(String),

    #[error("remote scanner returned a bad response: {0}")]
    BadResponse(String),

    #[error("vulnerability '{0}' is missing from the snapshot detail table")]
    UnknownVuln(VulnId),

    #[error("cannot resolve severity over an empty vulnerability set")]
    EmptyVulnSet,

    #[error("no API key configured (pass --api-key or set VULNERS_API_KEY)")]
    MissingApiKey,

    #[error("operating system '{0}' is not supported by the scanner")]
    UnsupportedOs(String),

    #[error("failed to collect local inventory: {0}")]
    Inventory(String),

    #[error("state store failure: {0}")]
    Store(String),

    #[error("notification delivery failed: {0}")]
    Notify(String),
}
