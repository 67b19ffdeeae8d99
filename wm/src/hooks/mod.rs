//! Hook dispatch: the host runtime's single entry point.
//!
//! Each [`HookEvent`] maps to one [`HookHandler`]. Handlers return a
//! [`HookOutput`]; any handler error is replaced by the event's safe default
//! so a controller bug never wedges the agent.

mod prompt_submit;
mod session_start;
mod stop;
mod task_gate;

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::core::types::{SessionState, is_valid_session_id};
use crate::io::session_store::StoreError;
use crate::workspace::Workspace;

pub use prompt_submit::PromptSubmitHandler;
pub use session_start::SessionStartHandler;
pub use stop::StopHandler;
pub use task_gate::{PreToolUseHandler, TaskCompletedHandler};

/// Lifecycle points the host runtime reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HookEvent {
    SessionStart,
    UserPromptSubmit,
    PreToolUse,
    TaskCompleted,
    Stop,
}

impl HookEvent {
    /// Event name as the host runtime spells it.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::SessionStart => "SessionStart",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::PreToolUse => "PreToolUse",
            Self::TaskCompleted => "TaskCompleted",
            Self::Stop => "Stop",
        }
    }

    /// Output used when the handler fails or has nothing to go on.
    pub fn safe_default(self) -> HookOutput {
        match self {
            Self::SessionStart | Self::UserPromptSubmit => HookOutput::Context {
                event: self,
                additional_context: None,
            },
            Self::PreToolUse | Self::TaskCompleted => HookOutput::allow(),
            Self::Stop => HookOutput::Silent,
        }
    }
}

/// Fields read from the hook's stdin payload.
///
/// Unknown fields are ignored and a wrongly-typed field reads as absent, so one
/// bad field never costs the rest of the payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HookInput {
    #[serde(deserialize_with = "opt_string")]
    pub session_id: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub hook_event_name: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub source: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub tool_name: Option<String>,
    pub tool_input: Option<Value>,
    #[serde(deserialize_with = "opt_id")]
    pub task_id: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub status: Option<String>,
}

impl HookInput {
    /// Lenient parse: anything but a JSON object becomes empty input.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value(value) {
            Ok(input) => input,
            Err(err) => {
                warn!(err = %err, "unexpected hook payload shape, ignoring");
                Self::default()
            }
        }
    }
}

fn opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block,
}

/// What a handler wants written to stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutput {
    /// Nothing on stdout.
    Silent,
    Decision {
        decision: Decision,
        reason: Option<String>,
    },
    Context {
        event: HookEvent,
        additional_context: Option<String>,
    },
}

impl HookOutput {
    pub fn allow() -> Self {
        Self::Decision {
            decision: Decision::Allow,
            reason: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self::Decision {
            decision: Decision::Block,
            reason: Some(reason.into()),
        }
    }

    pub fn context(event: HookEvent, text: Option<String>) -> Self {
        Self::Context {
            event,
            additional_context: text.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Wire JSON, or `None` for silent output.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Silent => None,
            Self::Decision { decision, reason } => {
                let mut out = json!({
                    "decision": match decision {
                        Decision::Allow => "allow",
                        Decision::Block => "block",
                    }
                });
                if let Some(reason) = reason {
                    out["reason"] = Value::String(reason.clone());
                }
                Some(out)
            }
            Self::Context {
                event,
                additional_context,
            } => {
                let mut specific = json!({ "hookEventName": event.wire_name() });
                if let Some(text) = additional_context {
                    specific["additionalContext"] = Value::String(text.clone());
                }
                Some(json!({ "hookSpecificOutput": specific }))
            }
        }
    }
}

pub trait HookHandler {
    fn handle(&self, ws: &Workspace, input: &HookInput) -> Result<HookOutput>;
}

pub fn handler_for(event: HookEvent) -> &'static dyn HookHandler {
    match event {
        HookEvent::SessionStart => &SessionStartHandler,
        HookEvent::UserPromptSubmit => &PromptSubmitHandler,
        HookEvent::PreToolUse => &PreToolUseHandler,
        HookEvent::TaskCompleted => &TaskCompletedHandler,
        HookEvent::Stop => &StopHandler,
    }
}

/// Run the handler for `event`, replacing any error with the safe default.
#[instrument(skip_all, fields(event = event.wire_name()))]
pub fn dispatch(event: HookEvent, ws: &Workspace, input: &HookInput) -> HookOutput {
    match handler_for(event).handle(ws, input) {
        Ok(output) => output,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "hook handler failed, using safe default");
            event.safe_default()
        }
    }
}

/// Session id for a hook, or `None` when there is nothing usable.
fn hook_session(ws: &Workspace, input: &HookInput) -> Result<Option<String>> {
    let resolved = ws.resolve_session(None, input.session_id.as_deref(), false)?;
    Ok(resolved.and_then(|(id, source)| {
        if is_valid_session_id(&id) {
            Some(id)
        } else {
            warn!(session = %id, ?source, "ignoring invalid session id");
            None
        }
    }))
}

/// Read state for hooks: missing and malformed both read as `None`.
///
/// Other store errors propagate so the dispatcher falls back to the safe default.
fn load_state_lenient(ws: &Workspace, session_id: &str) -> Result<Option<SessionState>> {
    match ws.sessions.read(session_id) {
        Ok(state) => Ok(Some(state)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(err @ StoreError::Malformed { .. }) => {
            warn!(err = %err, "malformed session state, treating as missing");
            Ok(None)
        }
        Err(err) => {
            debug!(err = %err, "session state unavailable");
            Err(err.into())
        }
    }
}
