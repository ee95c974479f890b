use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::core::snapshot::{OsScanReport, PluginScanRecord, ALL_CVE_KEY};
use crate::core::vuln::{DetailTable, VulnDetail, VulnId};
use crate::error::AuditError;
use crate::inventory::{Packager, PluginInfo};
use crate::remote::ScanApi;

const DEFAULT_BASE_URL: &str = "https://vulners.com/api/v3";
const USER_AGENT: &str = concat!("vulnwatch/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocking client for the Vulners v3 scanner API.
pub struct VulnersClient {
    http: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
}

impl VulnersClient {
    /// Build a client. Fails with [`AuditError::MissingApiKey`] before any
    /// network call when no key is configured.
    pub fn new(api_key: impl Into<String>) -> Result<Self, AuditError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AuditError::MissingApiKey);
        }

        let http = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AuditError::Network(err.to_string()))?;

        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Override the API base URL (self-hosted mirrors).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn get(&self, path: &str) -> Result<Value, AuditError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.http.get(&url).send().map_err(transport_error)?;
        decode_response(path, response)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, AuditError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .map_err(transport_error)?;
        decode_response(path, response)
    }
}

impl ScanApi for VulnersClient {
    fn supported_os(&self) -> Result<HashMap<String, Packager>, AuditError> {
        let data = self.get("agent/supported/")?;
        Ok(parse_supported_os(&data))
    }

    fn audit_os(
        &self,
        os: &str,
        version: &str,
        packages: &[String],
    ) -> Result<OsScanReport, AuditError> {
        let body = json!({
            "os": os,
            "version": version,
            "package": packages,
            "apiKey": self.api_key,
        });

        let data = self.post("audit/audit/", &body)?;
        Ok(parse_os_audit(&data, packages))
    }

    fn audit_plugins(&self, plugins: &[PluginInfo]) -> Result<Vec<PluginScanRecord>, AuditError> {
        let packages: Vec<Value> = plugins
            .iter()
            .map(|p| json!({"software": p.package, "version": p.version}))
            .collect();

        let body = json!({
            "os": "",
            "osVersion": "",
            "packages": packages,
            "apiKey": self.api_key,
        });

        let data = self.post("burp/packages/", &body)?;
        Ok(parse_plugin_audit(&data, plugins))
    }

    fn vuln_details(&self, ids: &[VulnId]) -> Result<DetailTable, AuditError> {
        if ids.is_empty() {
            debug!("no vulnerability ids to look up");
            return Ok(DetailTable::new());
        }

        let id_strings: Vec<&str> = ids.iter().map(VulnId::as_str).collect();
        let body = json!({
            "id": id_strings,
            "apiKey": self.api_key,
        });

        let data = self.post("search/id/", &body)?;
        Ok(parse_vuln_details(&data))
    }
}

fn transport_error(err: reqwest::Error) -> AuditError {
    if err.is_timeout() {
        AuditError::Network(format!("request timed out: {}", err))
    } else {
        AuditError::Network(err.to_string())
    }
}

/// Check HTTP status and the service's own result flag, then unwrap the
/// `data` payload.
fn decode_response(path: &str, response: reqwest::blocking::Response) -> Result<Value, AuditError> {
    let status = response.status();
    if !status.is_success() {
        return Err(AuditError::BadResponse(format!(
            "{} returned HTTP {}",
            path, status
        )));
    }

    let body: Value = response
        .json()
        .map_err(|err| AuditError::BadResponse(format!("{}: unparseable body: {}", path, err)))?;

    unwrap_data(path, body)
}

fn unwrap_data(path: &str, mut body: Value) -> Result<Value, AuditError> {
    if body.get("result").and_then(Value::as_str) != Some("OK") {
        return Err(AuditError::BadResponse(format!(
            "{}: service reported a non-OK result",
            path
        )));
    }

    Ok(body.get_mut("data").map(Value::take).unwrap_or(Value::Null))
}

fn parse_supported_os(data: &Value) -> HashMap<String, Packager> {
    let mut supported = HashMap::new();

    if let Some(map) = data.get("supported").and_then(Value::as_object) {
        for (os, info) in map {
            let packager = match info.get("packager").and_then(Value::as_str) {
                Some("rpm") => Packager::Rpm,
                Some("deb") => Packager::Deb,
                other => {
                    warn!(os = %os, packager = ?other, "skipping OS with unknown packager");
                    continue;
                }
            };
            supported.insert(os.clone(), packager);
        }
    }

    supported
}

/// Flatten the audit payload into per-package merged id lists.
///
/// The response nests ids as `packages[pkg][vuln][].cvelist`; each package's
/// lists are merged and deduped in response order, an `all_cve` aggregate is
/// appended, and submitted packages the scanner did not match are reported
/// as safe.
fn parse_os_audit(data: &Value, submitted: &[String]) -> OsScanReport {
    let mut packages: BTreeMap<String, Vec<VulnId>> = BTreeMap::new();
    let mut all_cve: Vec<VulnId> = Vec::new();

    if let Some(map) = data.get("packages").and_then(Value::as_object) {
        for (package, buckets) in map {
            let mut ids: Vec<VulnId> = Vec::new();

            let entries = buckets
                .as_object()
                .into_iter()
                .flat_map(|b| b.values())
                .filter_map(Value::as_array)
                .flatten();

            for entry in entries {
                let cvelist = entry
                    .get("cvelist")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str);

                for raw in cvelist {
                    match VulnId::new(raw) {
                        Ok(id) if !ids.contains(&id) => ids.push(id),
                        Ok(_) => {}
                        Err(err) => warn!(package = %package, error = %err, "skipping malformed id"),
                    }
                }
            }

            if ids.is_empty() {
                continue;
            }

            for id in &ids {
                if !all_cve.contains(id) {
                    all_cve.push(id.clone());
                }
            }
            packages.insert(package.clone(), ids);
        }
    }

    let safe_packages = submitted
        .iter()
        .filter(|pkg| !packages.contains_key(*pkg))
        .cloned()
        .collect();

    packages.insert(ALL_CVE_KEY.to_string(), all_cve);

    OsScanReport {
        packages,
        cumulative_fix: data
            .get("cumulativeFix")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        safe_packages,
    }
}

/// Join the plugin scan response against the submitted inventory: one
/// record per submitted plugin, with the matched ids or an empty list.
fn parse_plugin_audit(data: &Value, plugins: &[PluginInfo]) -> Vec<PluginScanRecord> {
    let mut matched: HashMap<&str, Vec<VulnId>> = HashMap::new();

    let vulnerabilities = data
        .get("vulnerabilities")
        .and_then(Value::as_array)
        .into_iter()
        .flatten();

    for vuln in vulnerabilities {
        let Some(package) = vuln.get("package").and_then(Value::as_str) else {
            continue;
        };

        let ids = vuln
            .get("id")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter_map(|raw| match VulnId::new(raw) {
                Ok(id) => Some(id),
                Err(err) => {
                    warn!(package = %package, error = %err, "skipping malformed id");
                    None
                }
            })
            .collect();

        matched.insert(package, ids);
    }

    plugins
        .iter()
        .map(|plugin| PluginScanRecord {
            package: plugin.package.clone(),
            version: plugin.version.clone(),
            name: plugin.name.clone(),
            id: matched.get(plugin.package.as_str()).cloned().unwrap_or_default(),
        })
        .collect()
}

fn parse_vuln_details(data: &Value) -> DetailTable {
    let mut details = DetailTable::new();

    if let Some(documents) = data.get("documents").and_then(Value::as_object) {
        for (raw_id, info) in documents {
            let id = match VulnId::new(raw_id) {
                Ok(id) => id,
                Err(err) => {
                    warn!(id = %raw_id, error = %err, "skipping document with malformed id");
                    continue;
                }
            };

            details.insert(
                id,
                VulnDetail {
                    score: info
                        .pointer("/cvss/score")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0),
                    vulners_score: info
                        .pointer("/enchantments/vulnersScore")
                        .and_then(Value::as_f64),
                    title: info
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    severity: info
                        .pointer("/cvss2/severity")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                },
            );
        }
    }

    details
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> VulnId {
        VulnId::new(s).unwrap()
    }

    #[test]
    fn test_client_requires_api_key() {
        assert!(matches!(
            VulnersClient::new(""),
            Err(AuditError::MissingApiKey)
        ));
        assert!(matches!(
            VulnersClient::new("   "),
            Err(AuditError::MissingApiKey)
        ));
        assert!(VulnersClient::new("key-123").is_ok());
    }

    #[test]
    fn test_unwrap_data_rejects_non_ok_result() {
        let body = json!({"result": "ERROR", "data": {"error": "bad key"}});

        let err = unwrap_data("audit/audit/", body).unwrap_err();
        assert!(matches!(err, AuditError::BadResponse(_)));
    }

    #[test]
    fn test_unwrap_data_returns_payload() {
        let body = json!({"result": "OK", "data": {"packages": {}}});

        let data = unwrap_data("audit/audit/", body).unwrap();
        assert!(data.get("packages").is_some());
    }

    #[test]
    fn test_parse_supported_os() {
        let data = json!({
            "supported": {
                "debian": {"packager": "deb"},
                "centos": {"packager": "rpm"},
                "exotic": {"packager": "pacman"},
            }
        });

        let supported = parse_supported_os(&data);
        assert_eq!(supported.get("debian"), Some(&Packager::Deb));
        assert_eq!(supported.get("centos"), Some(&Packager::Rpm));
        assert!(!supported.contains_key("exotic"));
    }

    #[test]
    fn test_parse_os_audit_merges_and_dedupes_cvelists() {
        let data = json!({
            "packages": {
                "nginx 1.18.0 amd64": {
                    "NGINX_VULN_A": [
                        {"cvelist": ["CVE-2021-1", "CVE-2021-2"]},
                        {"cvelist": ["CVE-2021-2"]},
                    ],
                    "NGINX_VULN_B": [
                        {"cvelist": ["CVE-2021-3"]},
                    ],
                }
            },
            "cumulativeFix": "apt-get install nginx=1.20.1",
        });

        let submitted = vec![
            "nginx 1.18.0 amd64".to_string(),
            "bash 5.1 amd64".to_string(),
        ];
        let report = parse_os_audit(&data, &submitted);

        assert_eq!(
            report.packages.get("nginx 1.18.0 amd64"),
            Some(&vec![id("CVE-2021-1"), id("CVE-2021-2"), id("CVE-2021-3")])
        );
        assert_eq!(report.cumulative_fix, "apt-get install nginx=1.20.1");
        assert_eq!(report.safe_packages, vec!["bash 5.1 amd64".to_string()]);
    }

    #[test]
    fn test_parse_os_audit_builds_aggregate_entry() {
        let data = json!({
            "packages": {
                "bash": {"V1": [{"cvelist": ["CVE-1"]}]},
                "nginx": {"V2": [{"cvelist": ["CVE-1", "CVE-2"]}]},
            }
        });

        let report = parse_os_audit(&data, &[]);

        let all = report.packages.get(ALL_CVE_KEY).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains(&id("CVE-1")));
        assert!(all.contains(&id("CVE-2")));
    }

    #[test]
    fn test_parse_os_audit_empty_payload() {
        let report = parse_os_audit(&json!({}), &["bash 5.1 amd64".to_string()]);

        assert_eq!(report.packages.len(), 1); // only the aggregate entry
        assert!(report.packages.get(ALL_CVE_KEY).unwrap().is_empty());
        assert_eq!(report.safe_packages.len(), 1);
        assert!(report.cumulative_fix.is_empty());
    }

    #[test]
    fn test_parse_plugin_audit_joins_inventory() {
        let data = json!({
            "vulnerabilities": [
                {"package": "plugin-a", "id": ["CVE-1", "CVE-2"]},
            ]
        });

        let plugins = vec![
            PluginInfo {
                name: "Plugin A".to_string(),
                version: "1.0".to_string(),
                package: "plugin-a".to_string(),
            },
            PluginInfo {
                name: "Plugin B".to_string(),
                version: "2.0".to_string(),
                package: "plugin-b".to_string(),
            },
        ];

        let records = parse_plugin_audit(&data, &plugins);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].package, "plugin-a");
        assert_eq!(records[0].id, vec![id("CVE-1"), id("CVE-2")]);
        assert_eq!(records[1].package, "plugin-b");
        assert!(records[1].id.is_empty());
    }

    #[test]
    fn test_parse_vuln_details() {
        let data = json!({
            "documents": {
                "CVE-2021-1": {
                    "title": "Buffer overflow in example",
                    "cvss": {"score": 9.8},
                    "cvss2": {"severity": "HIGH"},
                    "enchantments": {"vulnersScore": 9.1},
                },
                "CVE-2021-2": {
                    "title": "Sparse document",
                },
            }
        });

        let details = parse_vuln_details(&data);

        let full = details.get(&id("CVE-2021-1")).unwrap();
        assert_eq!(full.score, 9.8);
        assert_eq!(full.vulners_score, Some(9.1));
        assert_eq!(full.title, "Buffer overflow in example");
        assert_eq!(full.severity, "HIGH");

        let sparse = details.get(&id("CVE-2021-2")).unwrap();
        assert_eq!(sparse.score, 0.0);
        assert!(sparse.vulners_score.is_none());
    }
}
