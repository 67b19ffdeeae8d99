//! [`ExitSignals`] backed by the real repository, task store, and evidence files.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::core::exit::{ExitSignals, PushState};
use crate::core::test_patterns::AddedLine;
use crate::core::types::{NativeTask, PhaseRecord, VerificationEvidence};
use crate::io::evidence::EvidenceStore;
use crate::io::git::Git;
use crate::io::task_store::TaskStore;

#[derive(Debug, Clone)]
pub struct RepoSignals {
    session_id: String,
    git: Git,
    tasks: TaskStore,
    evidence: EvidenceStore,
}

impl RepoSignals {
    pub fn new(
        session_id: impl Into<String>,
        git: Git,
        tasks: TaskStore,
        evidence: EvidenceStore,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            git,
            tasks,
            evidence,
        }
    }
}

impl ExitSignals for RepoSignals {
    fn tasks(&self) -> Result<Vec<NativeTask>> {
        self.tasks.load(&self.session_id)
    }

    fn verification_evidence(&self, key: &str) -> Option<VerificationEvidence> {
        self.evidence.read(key)
    }

    fn phase_evidence(&self, key: &str) -> Vec<PhaseRecord> {
        self.evidence.read_phases(key)
    }

    fn latest_commit_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.git.latest_commit_time()
    }

    fn changed_files(&self, diff_base: &str) -> Result<Vec<String>> {
        self.git.changed_files(diff_base)
    }

    fn added_lines(&self, diff_base: &str, paths: &[String]) -> Result<Vec<AddedLine>> {
        self.git.added_lines(diff_base, paths)
    }

    fn tracked_changes(&self) -> Result<Vec<String>> {
        self.git.tracked_changes()
    }

    fn push_state(&self) -> Result<PushState> {
        self.git.push_state()
    }
}
