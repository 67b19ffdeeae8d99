//! Session lifecycle commands: enter a mode, record verification, report, prune.

use std::fmt;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::core::history::{enter_mode, visited_modes};
use crate::core::types::{SessionState, VerificationEvidence};
use crate::io::config::resolve_mode;
use crate::io::session_store::StoreError;
use crate::io::verify::{
    DEFAULT_OUTPUT_LIMIT_BYTES, DEFAULT_VERIFY_TIMEOUT, VerifyRequest, VerifyRunner,
    run_verification,
};
use crate::workspace::Workspace;

/// Session for a CLI command: flag, `WM_SESSION_ID`, then the latest session.
pub fn cli_session(ws: &Workspace, explicit: Option<&str>) -> Result<String> {
    ws.resolve_session(explicit, None, true)?
        .map(|(id, _)| id)
        .ok_or_else(|| anyhow!("no session: pass --session or set WM_SESSION_ID"))
}

/// Read state, treating a missing document as a fresh session. Malformed state is an error.
fn read_or_new(ws: &Workspace, session_id: &str) -> Result<SessionState, StoreError> {
    match ws.sessions.read(session_id) {
        Ok(state) => Ok(state),
        Err(StoreError::NotFound(_)) => Ok(SessionState::new(session_id)),
        Err(err) => Err(err),
    }
}

/// Move the session into `mode` (name or alias), optionally tracking an issue.
#[instrument(skip(ws, now))]
pub fn enter(
    ws: &Workspace,
    session_id: &str,
    mode: &str,
    issue: Option<u64>,
    now: DateTime<Utc>,
) -> Result<SessionState> {
    let modes = ws.modes();
    let canonical = resolve_mode(&modes, mode)?.name.clone();
    let mut state = read_or_new(ws, session_id)?;
    enter_mode(&mut state, &canonical, now);
    if let Some(issue) = issue {
        state.issue_number = Some(issue);
    }
    ws.sessions.write(session_id, &state)?;
    info!(session = session_id, mode = %canonical, "entered mode");
    Ok(state)
}

/// Run `verify_command` and record evidence under the session's evidence key.
#[instrument(skip(ws, runner))]
pub fn verify<R: VerifyRunner>(
    ws: &Workspace,
    session_id: &str,
    runner: &R,
) -> Result<(String, VerificationEvidence)> {
    let config = ws.workflow_config();
    let command = config
        .verify_command
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| anyhow!("no verify_command configured in wm.yaml"))?
        .to_string();
    let state = read_or_new(ws, session_id)?;
    let key = state.evidence_key();
    let request = VerifyRequest {
        workdir: ws.root().to_path_buf(),
        command,
        log_path: ws.paths.session_dir(session_id).join("verify.log"),
        timeout: DEFAULT_VERIFY_TIMEOUT,
        output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
    };
    let evidence = run_verification(runner, &request)?;
    ws.evidence
        .write(&key, &evidence)
        .with_context(|| format!("record evidence for {key}"))?;
    Ok((key, evidence))
}

/// Sessions whose state is older than the retention window.
///
/// A retention of zero days keeps everything.
#[instrument(skip(ws, now))]
pub fn prune(ws: &Workspace, now: SystemTime, dry_run: bool) -> Result<Vec<String>> {
    let days = ws.workflow_config().session_retention_days;
    if days == 0 {
        debug!("retention disabled");
        return Ok(Vec::new());
    }
    let window = Duration::from_secs(u64::from(days) * 24 * 60 * 60);
    let Some(cutoff) = now.checked_sub(window) else {
        return Ok(Vec::new());
    };
    let mut pruned = Vec::new();
    for (id, modified) in ws.sessions.entries()? {
        if modified >= cutoff {
            continue;
        }
        if !dry_run {
            ws.sessions.remove(&id)?;
        }
        pruned.push(id);
    }
    debug!(count = pruned.len(), dry_run, "pruned sessions");
    Ok(pruned)
}

/// Snapshot printed by `wm status`.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub state: SessionState,
    pub mode_known: bool,
    pub pending_tasks: Option<usize>,
    pub evidence: Option<VerificationEvidence>,
}

/// Load everything `wm status` shows. Malformed state is an error here.
pub fn status(ws: &Workspace, session_id: &str) -> Result<StatusReport> {
    let state = ws.sessions.read(session_id)?;
    let mode_known = ws.modes().resolve(&state.current_mode).is_ok();
    let pending_tasks = ws.tasks.pending_count(session_id).ok();
    let evidence = ws.evidence.read(&state.evidence_key());
    Ok(StatusReport {
        state,
        mode_known,
        pending_tasks,
        evidence,
    })
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = &self.state;
        writeln!(f, "session:  {}", state.session_id)?;
        write!(f, "mode:     {}", state.current_mode)?;
        if !self.mode_known {
            write!(f, " (not configured)")?;
        }
        writeln!(f)?;
        writeln!(f, "type:     {}", state.session_type)?;
        if let Some(issue) = state.issue_number {
            writeln!(f, "issue:    #{issue}")?;
        }
        let visited = visited_modes(&state.mode_history);
        if !visited.is_empty() {
            writeln!(f, "visited:  {}", visited.join(" -> "))?;
        }
        match self.pending_tasks {
            Some(count) => writeln!(f, "pending:  {count} task(s)")?,
            None => writeln!(f, "pending:  unknown (task store unreadable)")?,
        }
        match &self.evidence {
            Some(evidence) => writeln!(
                f,
                "verified: {} at {}",
                if evidence.passed { "passed" } else { "failed" },
                evidence
                    .verified_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown time".to_string())
            ),
            None => writeln!(f, "verified: never"),
        }
    }
}
