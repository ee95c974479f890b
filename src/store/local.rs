use std::{fs, path::PathBuf};

use crate::error::AuditError;
use crate::json::{read_json, write_json};
use crate::store::{Domain, StateStore, StoredState};

/// File-backed state store: one pretty-printed JSON file per domain under a
/// state directory (`os.json`, `plugins.json`).
pub struct LocalStateStore {
    state_dir: PathBuf,
}

impl LocalStateStore {
    pub fn new(state_dir: PathBuf) -> Self {
        Self { state_dir }
    }

    fn state_path(&self, domain: Domain) -> PathBuf {
        self.state_dir.join(format!("{}.json", domain.as_str()))
    }
}

impl StateStore for LocalStateStore {
    fn read(&self, domain: Domain) -> Result<Option<StoredState>, AuditError> {
        let path = self.state_path(domain);

        let exists = path
            .try_exists()
            .map_err(|err| AuditError::Store(format!("{}: {}", path.display(), err)))?;
        if !exists {
            return Ok(None);
        }

        let state = read_json(&path).map_err(|err| AuditError::Store(err.to_string()))?;
        Ok(Some(state))
    }

    fn write(&self, domain: Domain, state: &StoredState) -> Result<(), AuditError> {
        fs::create_dir_all(&self.state_dir)
            .map_err(|err| AuditError::Store(format!("{}: {}", self.state_dir.display(), err)))?;

        write_json(&self.state_path(domain), state)
            .map_err(|err| AuditError::Store(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    use crate::core::snapshot::Snapshot;
    use crate::core::vuln::{VulnDetail, VulnId};

    fn sample_state(subject: &str, scanned_at: i64) -> StoredState {
        let id = VulnId::new("CVE-2025-0001").unwrap();

        let mut snapshot = Snapshot::empty();
        snapshot.subjects.insert(subject.to_string(), vec![id.clone()]);
        snapshot.details.insert(
            id,
            VulnDetail {
                score: 7.5,
                vulners_score: Some(7.1),
                title: "Test vulnerability".to_string(),
                severity: "HIGH".to_string(),
            },
        );

        StoredState {
            snapshot,
            last_scan: Utc.timestamp_opt(scanned_at, 0).unwrap(),
            last_findings: Vec::new(),
        }
    }

    #[test]
    fn test_read_absent_state_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(temp_dir.path().to_path_buf());

        assert!(store.read(Domain::Os).unwrap().is_none());
        assert!(store.last_scan(Domain::Os).unwrap().is_none());
    }

    #[test]
    fn test_store_law_roundtrip() {
        // Law: write(x) -> read() = x
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(temp_dir.path().to_path_buf());

        let state = sample_state("nginx", 1_700_000_000);
        store.write(Domain::Os, &state).unwrap();

        let loaded = store.read(Domain::Os).unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_store_law_wholesale_overwrite() {
        // Law: write(y) after write(x) -> read() = y
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(temp_dir.path().to_path_buf());

        store
            .write(Domain::Os, &sample_state("nginx", 1_700_000_000))
            .unwrap();
        store
            .write(Domain::Os, &sample_state("bash", 1_700_100_000))
            .unwrap();

        let loaded = store.read(Domain::Os).unwrap().unwrap();
        assert!(loaded.snapshot.vuln_ids("bash").is_some());
        assert!(loaded.snapshot.vuln_ids("nginx").is_none());
    }

    #[test]
    fn test_store_domains_are_independent() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(temp_dir.path().to_path_buf());

        store
            .write(Domain::Os, &sample_state("nginx", 1_700_000_000))
            .unwrap();

        assert!(store.read(Domain::Plugins).unwrap().is_none());

        store
            .write(Domain::Plugins, &sample_state("plugin-a", 1_700_200_000))
            .unwrap();

        let os = store.read(Domain::Os).unwrap().unwrap();
        let plugins = store.read(Domain::Plugins).unwrap().unwrap();
        assert!(os.snapshot.vuln_ids("nginx").is_some());
        assert!(plugins.snapshot.vuln_ids("plugin-a").is_some());
    }

    #[test]
    fn test_last_scan_matches_written_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(temp_dir.path().to_path_buf());

        let state = sample_state("nginx", 1_700_000_000);
        store.write(Domain::Os, &state).unwrap();

        assert_eq!(store.last_scan(Domain::Os).unwrap(), Some(state.last_scan));
    }

    #[test]
    fn test_corrupt_state_file_is_store_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(temp_dir.path().to_path_buf());

        std::fs::write(temp_dir.path().join("os.json"), "{not json").unwrap();

        let err = store.read(Domain::Os).unwrap_err();
        assert!(matches!(err, AuditError::Store(_)));
    }

    #[test]
    fn test_write_creates_state_dir() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("state");
        let store = LocalStateStore::new(nested);

        store
            .write(Domain::Os, &sample_state("nginx", 1_700_000_000))
            .unwrap();

        assert!(store.read(Domain::Os).unwrap().is_some());
    }
}
