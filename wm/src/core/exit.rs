//! Exit-condition validator.
//!
//! [`can_exit`] decides whether a session may stop. It is pure over the
//! [`ExitSignals`] it is handed: every repository, task, or evidence fact comes
//! through that trait, so the decision logic is testable without git or a
//! filesystem.
//!
//! Check order:
//! 1. Escape-hatch session types pass immediately.
//! 2. Pending tasks (one reason per task, capped).
//! 3. Implementation-class mode checks: verification evidence, per-phase
//!    evidence, new-test heuristic. Steps 2 and 3 accumulate.
//! 4. Only when 2–3 found nothing: uncommitted tracked changes, then push state.
//!
//! Every check yields a [`CheckOutcome`]. [`CheckOutcome::into_failure`] is the
//! single place where `Indeterminate` (tooling failure) degrades to a pass.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::core::modes::ModeConfig;
use crate::core::settings::WmConfig;
use crate::core::tasks::{open_blockers, pending_tasks};
use crate::core::test_patterns::{AddedLine, TestFileMatcher, count_new_tests};
use crate::core::types::{NativeTask, PhaseRecord, SessionState, VerificationEvidence};

/// Session types that carry no completion contract.
pub const ESCAPE_HATCH_SESSION_TYPES: [&str; 3] = ["freeform", "qa", "default"];

/// Pending tasks listed individually before summarizing the rest.
pub const MAX_TASKS_SHOWN: usize = 5;

/// Tracked files listed individually in the uncommitted-changes reason.
const MAX_FILES_SHOWN: usize = 5;

/// Remediation category attached to a failed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    PendingTasks,
    VerificationNotRun,
    VerificationFailed,
    VerificationStale,
    PhaseVerificationMissing,
    PhaseVerificationFailed,
    TestsMissing,
    UncommittedChanges,
    UnpushedCommits,
}

impl ArtifactType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingTasks => "pending_tasks",
            Self::VerificationNotRun => "verification_not_run",
            Self::VerificationFailed => "verification_failed",
            Self::VerificationStale => "verification_stale",
            Self::PhaseVerificationMissing => "phase_verification_missing",
            Self::PhaseVerificationFailed => "phase_verification_failed",
            Self::TestsMissing => "tests_missing",
            Self::UncommittedChanges => "uncommitted_changes",
            Self::UnpushedCommits => "unpushed_commits",
        }
    }
}

/// Reasons produced by one failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub artifact: ArtifactType,
    pub reasons: Vec<String>,
}

impl Failure {
    fn one(artifact: ArtifactType, reason: impl Into<String>) -> Self {
        Self {
            artifact,
            reasons: vec![reason.into()],
        }
    }
}

/// Three-way result of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Fail(Failure),
    /// The check could not be evaluated (tooling failure, timeout, no remote).
    Indeterminate(String),
}

impl CheckOutcome {
    /// Map an outcome to the failure it contributes.
    ///
    /// `Indeterminate` degrades to a pass for this check only; the caller still
    /// evaluates every other check normally.
    pub fn into_failure(self, check: &str) -> Option<Failure> {
        match self {
            Self::Pass => None,
            Self::Fail(failure) => Some(failure),
            Self::Indeterminate(why) => {
                debug!(check, why = %why, "check indeterminate, treating as pass");
                None
            }
        }
    }
}

/// Whether HEAD is reachable from a remote-tracking branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Pushed,
    NotPushed,
    NoRemote,
}

/// Facts the validator needs from the outside world.
///
/// `Err` from a query means the underlying tool failed. Evidence queries are
/// infallible: unreadable evidence is absent evidence, and an unreadable
/// phase file comes back as [`PhaseRecord::Unreadable`].
pub trait ExitSignals {
    fn tasks(&self) -> Result<Vec<NativeTask>>;
    fn verification_evidence(&self, key: &str) -> Option<VerificationEvidence>;
    fn phase_evidence(&self, key: &str) -> Vec<PhaseRecord>;
    fn latest_commit_time(&self) -> Result<Option<DateTime<Utc>>>;
    fn changed_files(&self, diff_base: &str) -> Result<Vec<String>>;
    fn added_lines(&self, diff_base: &str, paths: &[String]) -> Result<Vec<AddedLine>>;
    /// Tracked files with uncommitted modifications (untracked files excluded).
    fn tracked_changes(&self) -> Result<Vec<String>>;
    fn push_state(&self) -> Result<PushState>;
}

/// Final decision with every reason, in check order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitVerdict {
    pub ok: bool,
    pub reasons: Vec<String>,
    /// Artifact of the first failed check.
    pub artifact_type: Option<ArtifactType>,
    /// Artifacts of every failed check, in order.
    pub artifacts: Vec<ArtifactType>,
}

impl ExitVerdict {
    pub fn allow() -> Self {
        Self {
            ok: true,
            reasons: Vec::new(),
            artifact_type: None,
            artifacts: Vec::new(),
        }
    }

    fn from_failures(failures: Vec<Failure>) -> Self {
        if failures.is_empty() {
            return Self::allow();
        }
        let artifacts: Vec<ArtifactType> = failures.iter().map(|f| f.artifact).collect();
        Self {
            ok: false,
            reasons: failures.into_iter().flat_map(|f| f.reasons).collect(),
            artifact_type: artifacts.first().copied(),
            artifacts,
        }
    }
}

pub fn is_escape_hatch(session_type: &str) -> bool {
    ESCAPE_HATCH_SESSION_TYPES.contains(&session_type)
}

/// Decide whether the session may stop.
///
/// `mode` is the resolved config of `state.current_mode`, or `None` when the
/// mode is unknown (no mode-specific checks apply).
pub fn can_exit<S: ExitSignals>(
    state: &SessionState,
    mode: Option<&ModeConfig>,
    config: &WmConfig,
    signals: &S,
) -> ExitVerdict {
    if is_escape_hatch(&state.session_type) {
        return ExitVerdict::allow();
    }

    let mut failures = Vec::new();
    failures.extend(check_tasks(signals).into_failure("tasks"));

    if let Some(mode) = mode.filter(|mode| mode.is_implementation()) {
        let key = state.evidence_key();
        let baseline = Baseline::from_signals(signals);
        if config.verification_required() {
            failures.extend(
                check_verification(&key, signals.verification_evidence(&key), &baseline)
                    .into_failure("verification"),
            );
        }
        if mode.phased_verification {
            failures.extend(
                check_phases(&key, &signals.phase_evidence(&key), &baseline)
                    .into_failure("phase_verification"),
            );
        }
        if mode.require_new_tests {
            failures.extend(check_new_tests(config, signals).into_failure("new_tests"));
        }
    }

    if failures.is_empty() {
        failures.extend(check_worktree(signals).into_failure("worktree"));
    }
    if failures.is_empty() {
        failures.extend(check_pushed(signals).into_failure("push"));
    }

    ExitVerdict::from_failures(failures)
}

/// Timestamp evidence must not predate.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Baseline {
    Commit(DateTime<Utc>),
    NoCommits,
    Unknown(String),
}

impl Baseline {
    fn from_signals<S: ExitSignals>(signals: &S) -> Self {
        match signals.latest_commit_time() {
            Ok(Some(at)) => Self::Commit(at),
            Ok(None) => Self::NoCommits,
            Err(err) => Self::Unknown(format!("{err:#}")),
        }
    }
}

/// Freshness of a timestamp against the baseline.
enum Freshness {
    Fresh,
    Stale { commit: DateTime<Utc> },
    Unknown(String),
}

fn freshness(at: Option<DateTime<Utc>>, baseline: &Baseline) -> Freshness {
    match baseline {
        Baseline::NoCommits => Freshness::Fresh,
        Baseline::Unknown(why) => Freshness::Unknown(why.clone()),
        Baseline::Commit(commit) => match at {
            Some(at) if at >= *commit => Freshness::Fresh,
            _ => Freshness::Stale { commit: *commit },
        },
    }
}

fn check_tasks<S: ExitSignals>(signals: &S) -> CheckOutcome {
    let all = match signals.tasks() {
        Ok(all) => all,
        Err(err) => return CheckOutcome::Indeterminate(format!("read tasks: {err:#}")),
    };
    let pending = pending_tasks(&all);
    if pending.is_empty() {
        return CheckOutcome::Pass;
    }
    let mut reasons: Vec<String> = pending
        .iter()
        .take(MAX_TASKS_SHOWN)
        .map(|task| describe_pending(task, &all))
        .collect();
    if pending.len() > MAX_TASKS_SHOWN {
        reasons.push(format!(
            "+{} more pending tasks",
            pending.len() - MAX_TASKS_SHOWN
        ));
    }
    CheckOutcome::Fail(Failure {
        artifact: ArtifactType::PendingTasks,
        reasons,
    })
}

fn describe_pending(task: &NativeTask, all: &[NativeTask]) -> String {
    let mut line = format!("Task #{} is {}: {}", task.id, task.status, task.subject);
    let blockers = open_blockers(task, all);
    if !blockers.is_empty() {
        let ids: Vec<String> = blockers.iter().map(|b| format!("#{}", b.id)).collect();
        line.push_str(&format!(" (blocked by {})", ids.join(", ")));
    }
    line
}

fn check_verification(
    key: &str,
    evidence: Option<VerificationEvidence>,
    baseline: &Baseline,
) -> CheckOutcome {
    let Some(evidence) = evidence else {
        return CheckOutcome::Fail(Failure::one(
            ArtifactType::VerificationNotRun,
            format!("Verification has not been run for {key}"),
        ));
    };
    if !evidence.passed {
        return CheckOutcome::Fail(Failure::one(
            ArtifactType::VerificationFailed,
            format!("Verification for {key} did not pass"),
        ));
    }
    match freshness(evidence.verified_at, baseline) {
        Freshness::Fresh => CheckOutcome::Pass,
        Freshness::Stale { commit } => CheckOutcome::Fail(Failure::one(
            ArtifactType::VerificationStale,
            format!(
                "Verification for {key} is stale: verified {}, latest commit {}",
                describe_time(evidence.verified_at),
                commit.to_rfc3339()
            ),
        )),
        Freshness::Unknown(why) => CheckOutcome::Indeterminate(why),
    }
}

fn check_phases(key: &str, phases: &[PhaseRecord], baseline: &Baseline) -> CheckOutcome {
    if phases.is_empty() {
        return CheckOutcome::Fail(Failure::one(
            ArtifactType::PhaseVerificationMissing,
            format!("No phase verification evidence found for {key}"),
        ));
    }
    let mut reasons = Vec::new();
    for record in phases {
        let phase = match record {
            PhaseRecord::Parsed(phase) => phase,
            PhaseRecord::Unreadable { phase_id } => {
                reasons.push(format!(
                    "Phase {phase_id} evidence is unreadable; re-verify phase {phase_id}"
                ));
                continue;
            }
        };
        if !phase.overall_passed {
            reasons.push(format!(
                "Phase {} verification did not pass; fix the failures and re-verify phase {}",
                phase.phase_id, phase.phase_id
            ));
            continue;
        }
        match freshness(phase.timestamp, baseline) {
            Freshness::Fresh => {}
            Freshness::Stale { .. } => reasons.push(format!(
                "Phase {} verification predates the latest commit; re-verify phase {}",
                phase.phase_id, phase.phase_id
            )),
            Freshness::Unknown(why) => {
                debug!(phase = %phase.phase_id, why = %why, "phase freshness unknown");
            }
        }
    }
    if reasons.is_empty() {
        CheckOutcome::Pass
    } else {
        CheckOutcome::Fail(Failure {
            artifact: ArtifactType::PhaseVerificationFailed,
            reasons,
        })
    }
}

fn check_new_tests<S: ExitSignals>(config: &WmConfig, signals: &S) -> CheckOutcome {
    let (matcher, invalid) = TestFileMatcher::new(&config.project.test_file_pattern);
    if !invalid.is_empty() {
        debug!(invalid = ?invalid, "ignoring invalid test file patterns");
    }
    if matcher.is_empty() {
        return CheckOutcome::Pass;
    }
    let base = config.project.diff_base.as_str();
    let changed = match signals.changed_files(base) {
        Ok(changed) => changed,
        Err(err) => return CheckOutcome::Indeterminate(format!("diff vs {base}: {err:#}")),
    };
    let test_files: Vec<String> = matcher.filter(&changed).into_iter().cloned().collect();
    if test_files.is_empty() {
        return CheckOutcome::Fail(Failure::one(
            ArtifactType::TestsMissing,
            format!("No test files changed since {base}; add tests covering the change"),
        ));
    }
    let added = match signals.added_lines(base, &test_files) {
        Ok(added) => added,
        Err(err) => return CheckOutcome::Indeterminate(format!("diff lines vs {base}: {err:#}")),
    };
    if count_new_tests(&added) == 0 {
        return CheckOutcome::Fail(Failure::one(
            ArtifactType::TestsMissing,
            format!(
                "Test files changed since {base} ({}) but no new test functions were added",
                test_files.join(", ")
            ),
        ));
    }
    CheckOutcome::Pass
}

fn check_worktree<S: ExitSignals>(signals: &S) -> CheckOutcome {
    let changed = match signals.tracked_changes() {
        Ok(changed) => changed,
        Err(err) => return CheckOutcome::Indeterminate(format!("git status: {err:#}")),
    };
    if changed.is_empty() {
        return CheckOutcome::Pass;
    }
    let mut listed: Vec<&str> = changed.iter().take(MAX_FILES_SHOWN).map(String::as_str).collect();
    let more = changed.len().saturating_sub(MAX_FILES_SHOWN);
    let suffix = if more > 0 {
        listed.push("…");
        format!(" (+{more} more)")
    } else {
        String::new()
    };
    CheckOutcome::Fail(Failure::one(
        ArtifactType::UncommittedChanges,
        format!(
            "Uncommitted changes in {} tracked file(s): {}{suffix}",
            changed.len(),
            listed.join(", ")
        ),
    ))
}

fn check_pushed<S: ExitSignals>(signals: &S) -> CheckOutcome {
    match signals.push_state() {
        Ok(PushState::Pushed) => CheckOutcome::Pass,
        Ok(PushState::NotPushed) => CheckOutcome::Fail(Failure::one(
            ArtifactType::UnpushedCommits,
            "Current commit is not pushed to any remote branch",
        )),
        Ok(PushState::NoRemote) => CheckOutcome::Indeterminate("no remotes configured".to_string()),
        Err(err) => CheckOutcome::Indeterminate(format!("push state: {err:#}")),
    }
}

fn describe_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "at an unknown time".to_string())
}
