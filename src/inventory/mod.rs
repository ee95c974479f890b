use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AuditError;
use crate::json::read_json;

/// Package manager of a supported OS, as reported by the scanner's
/// supported-OS table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Packager {
    Rpm,
    Deb,
}

/// OS identity parsed from /etc/os-release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsRelease {
    pub id: String,
    pub version: String,
}

/// Installed plugin as listed by the local manifest. `package` is the
/// stable identifier submitted to the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub package: String,
}

/// Local inventory collaborators: what is installed on this host.
pub trait Inventory {
    fn os_release(&self) -> Result<OsRelease, AuditError>;

    /// One line per installed package, in the format the scanner expects
    /// for the given package manager.
    fn os_packages(&self, packager: Packager) -> Result<Vec<String>, AuditError>;

    fn plugins(&self) -> Result<Vec<PluginInfo>, AuditError>;
}

/// Inventory of the host vulnwatch runs on: /etc/os-release, the native
/// package manager, and a JSON plugin manifest.
pub struct HostInventory {
    plugins_file: PathBuf,
}

impl HostInventory {
    pub fn new(plugins_file: PathBuf) -> Self {
        Self { plugins_file }
    }
}

impl Inventory for HostInventory {
    fn os_release(&self) -> Result<OsRelease, AuditError> {
        let content = std::fs::read_to_string("/etc/os-release")
            .map_err(|err| AuditError::Inventory(format!("/etc/os-release: {}", err)))?;

        parse_os_release(&content)
            .ok_or_else(|| AuditError::Inventory("/etc/os-release lacks ID or VERSION_ID".to_string()))
    }

    fn os_packages(&self, packager: Packager) -> Result<Vec<String>, AuditError> {
        let output = match packager {
            Packager::Rpm => Command::new("rpm")
                .args(["-qa", "--qf", "%{NAME}-%{VERSION}-%{RELEASE}.%{ARCH}\n"])
                .output(),
            Packager::Deb => Command::new("dpkg-query")
                .args(["-W", "-f", "${Status} ${Package} ${Version} ${Architecture}\n"])
                .output(),
        }
        .map_err(|err| AuditError::Inventory(format!("package query failed: {}", err)))?;

        if !output.status.success() {
            return Err(AuditError::Inventory(format!(
                "package query exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let packages = match packager {
            Packager::Rpm => stdout
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Packager::Deb => parse_dpkg_output(&stdout),
        };

        debug!(count = packages.len(), "collected installed packages");
        Ok(packages)
    }

    fn plugins(&self) -> Result<Vec<PluginInfo>, AuditError> {
        let exists = self
            .plugins_file
            .try_exists()
            .map_err(|err| AuditError::Inventory(format!("{}: {}", self.plugins_file.display(), err)))?;
        if !exists {
            return Err(AuditError::Inventory(format!(
                "plugin manifest not found: {}",
                self.plugins_file.display()
            )));
        }

        read_json(&self.plugins_file).map_err(|err| AuditError::Inventory(err.to_string()))
    }
}

/// Parse /etc/os-release content into the fields the scanner needs.
/// VERSION_ID is commonly quoted; quotes are trimmed.
fn parse_os_release(content: &str) -> Option<OsRelease> {
    let mut id = None;
    let mut version = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "ID" => id = Some(value.trim_matches('"').to_string()),
            "VERSION_ID" => version = Some(value.trim_matches('"').to_string()),
            _ => {}
        }
    }

    Some(OsRelease {
        id: id?,
        version: version?,
    })
}

/// Keep only packages in state "install ok" and reduce each line to
/// "package version architecture", the format the audit endpoint expects
/// for dpkg hosts.
fn parse_dpkg_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [state, ok, _installed, package, version, arch]
                    if *state == "install" && *ok == "ok" =>
                {
                    Some(format!("{} {} {}", package, version, arch))
                }
                _ => None,
            }
        })
        .collect()
}
