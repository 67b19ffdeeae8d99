//! Runs the exit validator against a real session and renders the outcome.
//!
//! Shared by the stop hook and `wm can-exit`.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::exit::{ArtifactType, ExitSignals, ExitVerdict, can_exit};
use crate::core::tasks::first_pending;
use crate::core::types::SessionState;
use crate::io::guidance::{ESCAPE_HATCH, GuidanceEngine, GuidanceInputs};
use crate::io::session_store::StoreError;
use crate::workspace::Workspace;

/// Remediation attached to a blocked verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Guidance {
    pub artifact_type: ArtifactType,
    pub next_step: String,
    pub escape_hatch: String,
}

/// Verdict plus the text shown to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub verdict: ExitVerdict,
    pub guidance: Option<Guidance>,
    /// Full block reason for the stop hook; `None` when the session may exit.
    pub block_reason: Option<String>,
}

/// `wm can-exit --json` document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitReportJson<'a> {
    pub can_exit: bool,
    pub reasons: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<&'a Guidance>,
}

impl ExitReport {
    pub fn ok(&self) -> bool {
        self.verdict.ok
    }

    pub fn to_json(&self) -> ExitReportJson<'_> {
        ExitReportJson {
            can_exit: self.verdict.ok,
            reasons: &self.verdict.reasons,
            guidance: self.guidance.as_ref(),
        }
    }
}

/// Load the session and evaluate it.
///
/// A session with no state on disk is evaluated as a fresh default session.
/// Malformed state and invalid ids are errors.
pub fn check_session(ws: &Workspace, session_id: &str) -> Result<ExitReport, StoreError> {
    let state = match ws.sessions.read(session_id) {
        Ok(state) => state,
        Err(StoreError::NotFound(_)) => {
            debug!(session = session_id, "no state, evaluating as default session");
            SessionState::new(session_id)
        }
        Err(err) => return Err(err),
    };
    Ok(evaluate(ws, &state))
}

/// Evaluate an already-loaded session.
#[instrument(skip_all, fields(session = %state.session_id, mode = %state.current_mode))]
pub fn evaluate(ws: &Workspace, state: &SessionState) -> ExitReport {
    let config = ws.workflow_config();
    let modes = ws.modes();
    let mode = match modes.resolve(&state.current_mode) {
        Ok(mode) => Some(mode),
        Err(err) => {
            debug!(err = %err, "current mode not configured, skipping mode checks");
            None
        }
    };
    let signals = ws.signals(&state.session_id);
    let verdict = can_exit(state, mode, &config, &signals);
    if verdict.ok {
        return ExitReport {
            verdict,
            guidance: None,
            block_reason: None,
        };
    }

    let inputs = GuidanceInputs {
        key: state.evidence_key(),
        verify_command: config.verify_command.clone(),
        code_reviewer: config.reviews.code_reviewer.clone(),
        test_file_patterns: config.project.test_file_pattern.clone(),
        test_command: config.project.test_command.clone(),
        first_task: signals
            .tasks()
            .ok()
            .and_then(|tasks| first_pending(&tasks).map(|task| task.id.clone())),
        branch: ws.git().current_branch().ok().flatten(),
    };
    render(verdict, &inputs)
}

fn render(verdict: ExitVerdict, inputs: &GuidanceInputs) -> ExitReport {
    let engine = GuidanceEngine::new();
    let guidance = verdict.artifact_type.map(|artifact| Guidance {
        artifact_type: artifact,
        next_step: engine
            .next_step(artifact, inputs)
            .unwrap_or_else(|err| {
                warn!(err = %err, "next step template failed");
                String::new()
            }),
        escape_hatch: ESCAPE_HATCH.to_string(),
    });
    let block_reason = match engine.block_reason(&verdict, inputs) {
        Ok(reason) => reason,
        Err(err) => {
            warn!(err = %err, "block reason template failed");
            format!("{}\n\n{ESCAPE_HATCH}", verdict.reasons.join("\n"))
        }
    };
    ExitReport {
        verdict,
        guidance,
        block_reason: Some(block_reason),
    }
}
