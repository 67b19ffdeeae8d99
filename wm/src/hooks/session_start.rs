use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::types::{DEFAULT_MODE, SessionState};
use crate::hooks::{HookEvent, HookHandler, HookInput, HookOutput, hook_session, load_state_lenient};
use crate::workspace::Workspace;

/// Sources after which the agent has lost its working memory.
const RESUME_SOURCES: [&str; 2] = ["resume", "compact"];

pub struct SessionStartHandler;

impl HookHandler for SessionStartHandler {
    #[instrument(skip_all, fields(source = ?input.source))]
    fn handle(&self, ws: &Workspace, input: &HookInput) -> Result<HookOutput> {
        let Some(session_id) = hook_session(ws, input)? else {
            return Ok(HookEvent::SessionStart.safe_default());
        };

        let state = match load_state_lenient(ws, &session_id)? {
            Some(state) => state,
            None if ws.sessions.exists(&session_id) => {
                // Malformed on disk: leave it for a human, run on defaults.
                SessionState::new(&session_id)
            }
            None => {
                let state = SessionState::new(&session_id);
                ws.sessions.write(&session_id, &state)?;
                debug!(session = %session_id, "created session state");
                state
            }
        };

        let mut lines = vec![format!(
            "wm: session {} is in mode `{}`.",
            state.session_id, state.current_mode
        )];
        if state.current_mode != DEFAULT_MODE
            && let Ok(mode) = ws.modes().resolve(&state.current_mode)
            && !mode.description.is_empty()
        {
            lines.push(format!("Mode purpose: {}", mode.description));
        }
        if let Some(issue) = state.issue_number {
            lines.push(format!("Tracking issue #{issue}."));
        }
        let resumed = input
            .source
            .as_deref()
            .is_some_and(|source| RESUME_SOURCES.contains(&source));
        if resumed && let Some(task) = ws.tasks.first_pending_task(&session_id)? {
            lines.push(format!(
                "Next pending task: #{} {} ({}).",
                task.id, task.subject, task.status
            ));
        }

        Ok(HookOutput::context(
            HookEvent::SessionStart,
            Some(lines.join("\n")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::dispatch;
    use crate::test_support::{TestRepo, session_id};
    use serde_json::json;

    fn input(session: &str, source: &str) -> HookInput {
        HookInput {
            session_id: Some(session.to_string()),
            source: Some(source.to_string()),
            ..HookInput::default()
        }
    }

    fn context_text(output: &HookOutput) -> String {
        match output {
            HookOutput::Context {
                additional_context, ..
            } => additional_context.clone().unwrap_or_default(),
            other => panic!("expected context, got {other:?}"),
        }
    }

    #[test]
    fn first_start_creates_default_state() {
        let repo = TestRepo::new().expect("repo");
        let ws = repo.workspace(None);
        let sid = session_id(1);

        let out = dispatch(HookEvent::SessionStart, &ws, &input(&sid, "startup"));
        assert!(context_text(&out).contains("mode `default`"));

        let state = ws.sessions.read(&sid).expect("state written");
        assert_eq!(state.current_mode, "default");
        assert!(state.mode_history.is_empty());
    }

    #[test]
    fn resume_mentions_first_pending_task() {
        let repo = TestRepo::new().expect("repo");
        let ws = repo.workspace(None);
        let sid = session_id(2);
        repo.write_task(&sid, json!({"id": "1", "subject": "done", "status": "completed"}))
            .expect("task");
        repo.write_task(&sid, json!({"id": "2", "subject": "write docs", "status": "pending"}))
            .expect("task");

        let text = context_text(&dispatch(HookEvent::SessionStart, &ws, &input(&sid, "resume")));
        assert!(text.contains("Next pending task: #2 write docs (pending)."));

        let text = context_text(&dispatch(HookEvent::SessionStart, &ws, &input(&sid, "startup")));
        assert!(!text.contains("Next pending task"));
    }

    #[test]
    fn malformed_state_is_left_alone() {
        let repo = TestRepo::new().expect("repo");
        let ws = repo.workspace(None);
        let sid = session_id(3);
        let path = ws.paths.state_path(&sid);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "{garbage").expect("write");

        let out = dispatch(HookEvent::SessionStart, &ws, &input(&sid, "startup"));
        assert!(context_text(&out).contains("mode `default`"));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "{garbage");
    }

    #[test]
    fn invalid_session_id_gets_empty_context() {
        let repo = TestRepo::new().expect("repo");
        let ws = repo.workspace(None);
        let out = dispatch(HookEvent::SessionStart, &ws, &input("../../etc", "startup"));
        assert_eq!(out, HookEvent::SessionStart.safe_default());
    }
}
