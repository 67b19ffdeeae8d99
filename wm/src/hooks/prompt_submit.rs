use anyhow::Result;

use crate::core::types::DEFAULT_MODE;
use crate::hooks::{HookEvent, HookHandler, HookInput, HookOutput, hook_session, load_state_lenient};
use crate::workspace::Workspace;

/// Adds a one-line mode reminder while a structured mode is active.
pub struct PromptSubmitHandler;

impl HookHandler for PromptSubmitHandler {
    fn handle(&self, ws: &Workspace, input: &HookInput) -> Result<HookOutput> {
        let Some(session_id) = hook_session(ws, input)? else {
            return Ok(HookEvent::UserPromptSubmit.safe_default());
        };
        let Some(state) = load_state_lenient(ws, &session_id)? else {
            return Ok(HookEvent::UserPromptSubmit.safe_default());
        };
        if state.current_mode == DEFAULT_MODE {
            return Ok(HookEvent::UserPromptSubmit.safe_default());
        }
        let mut reminder = format!("wm: you are in `{}` mode", state.current_mode);
        if let Some(issue) = state.issue_number {
            reminder.push_str(&format!(" for issue #{issue}"));
        }
        reminder.push('.');
        Ok(HookOutput::context(HookEvent::UserPromptSubmit, Some(reminder)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::enter_mode;
    use crate::core::types::SessionState;
    use crate::hooks::dispatch;
    use crate::test_support::{TestRepo, session_id};
    use chrono::Utc;

    #[test]
    fn reminds_only_outside_default_mode() {
        let repo = TestRepo::new().expect("repo");
        let ws = repo.workspace(None);
        let sid = session_id(1);
        let input = HookInput {
            session_id: Some(sid.clone()),
            ..HookInput::default()
        };

        let mut state = SessionState::new(&sid);
        ws.sessions.write(&sid, &state).expect("write");
        assert_eq!(
            dispatch(HookEvent::UserPromptSubmit, &ws, &input),
            HookEvent::UserPromptSubmit.safe_default()
        );

        enter_mode(&mut state, "planning", Utc::now());
        state.issue_number = Some(9);
        ws.sessions.write(&sid, &state).expect("write");
        assert_eq!(
            dispatch(HookEvent::UserPromptSubmit, &ws, &input),
            HookOutput::context(
                HookEvent::UserPromptSubmit,
                Some("wm: you are in `planning` mode for issue #9.".to_string())
            )
        );
    }
}
