use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::types::SessionState;
use crate::exit_check::evaluate;
use crate::hooks::{HookHandler, HookInput, HookOutput, hook_session, load_state_lenient};
use crate::workspace::Workspace;

/// Blocks the stop while the exit validator has objections.
pub struct StopHandler;

impl HookHandler for StopHandler {
    #[instrument(skip_all)]
    fn handle(&self, ws: &Workspace, input: &HookInput) -> Result<HookOutput> {
        let Some(session_id) = hook_session(ws, input)? else {
            return Ok(HookOutput::Silent);
        };
        let state = load_state_lenient(ws, &session_id)?
            .unwrap_or_else(|| SessionState::new(&session_id));
        let report = evaluate(ws, &state);
        match report.block_reason {
            Some(reason) if !report.verdict.ok => {
                debug!(reasons = report.verdict.reasons.len(), "stop blocked");
                Ok(HookOutput::block(reason))
            }
            _ => Ok(HookOutput::Silent),
        }
    }
}
