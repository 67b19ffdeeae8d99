//! Verification evidence files under `.wm/verification-evidence/`.
//!
//! Readers never fail. A missing or malformed evidence file reads as absent;
//! a malformed phase file is reported by id so the phase check can name it.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::Result;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::core::types::{PhaseEvidence, PhaseRecord, VerificationEvidence};
use crate::io::paths::{WmPaths, write_json_atomic};

#[derive(Debug, Clone)]
pub struct EvidenceStore {
    paths: WmPaths,
}

impl EvidenceStore {
    pub fn new(paths: WmPaths) -> Self {
        Self { paths }
    }

    pub fn read(&self, key: &str) -> Option<VerificationEvidence> {
        read_optional(&self.paths.evidence_path(key))
    }

    pub fn write(&self, key: &str, evidence: &VerificationEvidence) -> Result<()> {
        let path = self.paths.evidence_path(key);
        write_json_atomic(&path, evidence)?;
        debug!(path = %path.display(), passed = evidence.passed, "wrote verification evidence");
        Ok(())
    }

    /// Every `<key>.phase-<id>.json`, ordered by phase id.
    ///
    /// A file whose body omits `phaseId` takes it from the file name. A file
    /// that exists but does not parse is reported as [`PhaseRecord::Unreadable`].
    pub fn read_phases(&self, key: &str) -> Vec<PhaseRecord> {
        let prefix = format!("{key}.phase-");
        let Ok(read_dir) = fs::read_dir(&self.paths.evidence_dir) else {
            return Vec::new();
        };
        let mut phases = Vec::new();
        for entry in read_dir.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(phase_id) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };
            let record = match read_optional::<PhaseEvidence>(&entry.path()) {
                Some(mut phase) => {
                    if phase.phase_id.is_empty() {
                        phase.phase_id = phase_id.to_string();
                    }
                    PhaseRecord::Parsed(phase)
                }
                None => PhaseRecord::Unreadable {
                    phase_id: phase_id.to_string(),
                },
            };
            phases.push(record);
        }
        phases.sort_by(|a, b| a.phase_id().cmp(b.phase_id()));
        phases
    }

    pub fn write_phase(&self, key: &str, phase: &PhaseEvidence) -> Result<()> {
        write_json_atomic(&self.paths.phase_evidence_path(key, &phase.phase_id), phase)
    }
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "unreadable evidence, treating as absent");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "malformed evidence, treating as absent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn store() -> (tempfile::TempDir, EvidenceStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = EvidenceStore::new(WmPaths::new(temp.path()));
        (temp, store)
    }

    #[test]
    fn round_trips_and_treats_garbage_as_absent() {
        let (temp, store) = store();
        assert_eq!(store.read("issue-1"), None);

        let evidence = VerificationEvidence {
            passed: true,
            verified_at: Some(Utc::now()),
            command: Some("just ci".to_string()),
            exit_code: Some(0),
        };
        store.write("issue-1", &evidence).expect("write");
        assert_eq!(store.read("issue-1"), Some(evidence));

        let path = WmPaths::new(temp.path()).evidence_path("issue-2");
        fs::write(&path, "not json").expect("write");
        assert_eq!(store.read("issue-2"), None);
    }

    #[test]
    fn phases_are_scoped_to_key() {
        let (temp, store) = store();
        for (key, id) in [("issue-1", "2"), ("issue-1", "1"), ("issue-9", "1")] {
            store
                .write_phase(
                    key,
                    &PhaseEvidence {
                        phase_id: id.to_string(),
                        overall_passed: true,
                        timestamp: Some(Utc::now()),
                    },
                )
                .expect("write phase");
        }
        fs::write(
            WmPaths::new(temp.path()).phase_evidence_path("issue-1", "3"),
            r#"{"overallPassed": false}"#,
        )
        .expect("write");

        let ids: Vec<String> = store
            .read_phases("issue-1")
            .iter()
            .map(|p| p.phase_id().to_string())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn truncated_phase_file_is_reported_unreadable() {
        let (temp, store) = store();
        store
            .write_phase(
                "issue-1",
                &PhaseEvidence {
                    phase_id: "1".to_string(),
                    overall_passed: true,
                    timestamp: Some(Utc::now()),
                },
            )
            .expect("write phase");
        fs::write(
            WmPaths::new(temp.path()).phase_evidence_path("issue-1", "2"),
            r#"{"overallPassed": tru"#,
        )
        .expect("write");

        let phases = store.read_phases("issue-1");
        assert_eq!(phases.len(), 2);
        assert!(matches!(&phases[0], PhaseRecord::Parsed(p) if p.overall_passed));
        assert_eq!(
            phases[1],
            PhaseRecord::Unreadable {
                phase_id: "2".to_string()
            }
        );
    }
}
