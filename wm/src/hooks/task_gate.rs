//! Dependency gate on task completion.
//!
//! The same rule backs two events: a `TaskUpdate` tool call that sets
//! `status: completed`, and the runtime's own `TaskCompleted` notification.

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::core::tasks::{CompletionGate, completion_gate};
use crate::core::types::TaskStatus;
use crate::hooks::{HookHandler, HookInput, HookOutput, hook_session};
use crate::workspace::Workspace;

/// Tool whose completion requests are gated.
pub const TASK_UPDATE_TOOL: &str = "TaskUpdate";

pub struct PreToolUseHandler;

impl HookHandler for PreToolUseHandler {
    fn handle(&self, ws: &Workspace, input: &HookInput) -> Result<HookOutput> {
        if input.tool_name.as_deref() != Some(TASK_UPDATE_TOOL) {
            return Ok(HookOutput::allow());
        }
        let Some(tool_input) = &input.tool_input else {
            return Ok(HookOutput::allow());
        };
        if tool_input.get("status").and_then(Value::as_str) != Some(TaskStatus::Completed.as_str()) {
            return Ok(HookOutput::allow());
        }
        let Some(task_id) = ["taskId", "task_id", "id"]
            .iter()
            .find_map(|key| id_field(tool_input.get(*key)))
        else {
            return Ok(HookOutput::allow());
        };
        gate(ws, input, &task_id)
    }
}

pub struct TaskCompletedHandler;

impl HookHandler for TaskCompletedHandler {
    fn handle(&self, ws: &Workspace, input: &HookInput) -> Result<HookOutput> {
        if let Some(status) = input.status.as_deref()
            && status != TaskStatus::Completed.as_str()
        {
            return Ok(HookOutput::allow());
        }
        let Some(task_id) = input.task_id.as_deref() else {
            return Ok(HookOutput::allow());
        };
        gate(ws, input, task_id)
    }
}

fn id_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn gate(ws: &Workspace, input: &HookInput, task_id: &str) -> Result<HookOutput> {
    let Some(session_id) = hook_session(ws, input)? else {
        return Ok(HookOutput::allow());
    };
    let tasks = ws.tasks.load(&session_id)?;
    match completion_gate(task_id, &tasks) {
        CompletionGate::Allowed => Ok(HookOutput::allow()),
        CompletionGate::Blocked { blockers } => {
            debug!(task = task_id, blockers = blockers.len(), "completion blocked");
            let listed: Vec<String> = blockers
                .iter()
                .map(|b| format!("#{} {} ({})", b.id, b.subject, b.status))
                .collect();
            Ok(HookOutput::block(format!(
                "Task #{task_id} is blocked by unfinished tasks: {}. Complete those first.",
                listed.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookEvent, dispatch};
    use crate::test_support::{TestRepo, session_id};
    use serde_json::json;

    fn seeded() -> (TestRepo, String) {
        let repo = TestRepo::new().expect("repo");
        let sid = session_id(5);
        repo.write_task(&sid, json!({"id": "X", "subject": "schema", "status": "pending"}))
            .expect("task");
        repo.write_task(
            &sid,
            json!({"id": "Y", "subject": "api", "status": "pending", "blockedBy": ["X"]}),
        )
        .expect("task");
        (repo, sid)
    }

    fn update(sid: &str, task: &str, status: &str) -> HookInput {
        HookInput {
            session_id: Some(sid.to_string()),
            tool_name: Some(TASK_UPDATE_TOOL.to_string()),
            tool_input: Some(json!({"taskId": task, "status": status})),
            ..HookInput::default()
        }
    }

    #[test]
    fn blocks_completing_a_blocked_task_until_blocker_done() {
        let (repo, sid) = seeded();
        let ws = repo.workspace(None);

        let out = dispatch(HookEvent::PreToolUse, &ws, &update(&sid, "Y", "completed"));
        assert_eq!(
            out,
            HookOutput::block(
                "Task #Y is blocked by unfinished tasks: #X schema (pending). Complete those first."
            )
        );

        repo.write_task(&sid, json!({"id": "X", "subject": "schema", "status": "completed"}))
            .expect("task");
        assert_eq!(
            dispatch(HookEvent::PreToolUse, &ws, &update(&sid, "Y", "completed")),
            HookOutput::allow()
        );
    }

    #[test]
    fn other_tools_and_statuses_pass() {
        let (repo, sid) = seeded();
        let ws = repo.workspace(None);
        assert_eq!(
            dispatch(HookEvent::PreToolUse, &ws, &update(&sid, "Y", "in_progress")),
            HookOutput::allow()
        );
        let mut bash = update(&sid, "Y", "completed");
        bash.tool_name = Some("Bash".to_string());
        assert_eq!(dispatch(HookEvent::PreToolUse, &ws, &bash), HookOutput::allow());
    }

    #[test]
    fn task_completed_event_uses_top_level_fields() {
        let (repo, sid) = seeded();
        let ws = repo.workspace(None);
        let input = HookInput {
            session_id: Some(sid.clone()),
            task_id: Some("Y".to_string()),
            status: Some("completed".to_string()),
            ..HookInput::default()
        };
        assert!(matches!(
            dispatch(HookEvent::TaskCompleted, &ws, &input),
            HookOutput::Decision {
                decision: crate::hooks::Decision::Block,
                ..
            }
        ));
    }

    #[test]
    fn unknown_session_allows() {
        let (repo, _sid) = seeded();
        let ws = repo.workspace(None);
        let mut input = update("", "Y", "completed");
        input.session_id = None;
        assert_eq!(dispatch(HookEvent::PreToolUse, &ws, &input), HookOutput::allow());
    }
}
