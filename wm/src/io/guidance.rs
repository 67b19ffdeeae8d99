//! Remediation text for a blocked stop.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::exit::{ArtifactType, ExitVerdict};

const NEXT_STEP_TEMPLATE: &str = include_str!("templates/next_step.md");

/// Fixed text telling the agent how to leave the completion contract.
pub const ESCAPE_HATCH: &str = "If this work does not need the completion checks, switch to an unstructured mode with `wm enter freeform` and stop again.";

/// Facts the next-step template can mention.
#[derive(Debug, Clone, Default)]
pub struct GuidanceInputs {
    pub key: String,
    pub verify_command: Option<String>,
    pub code_reviewer: Option<String>,
    pub test_file_patterns: Vec<String>,
    pub test_command: Option<String>,
    pub first_task: Option<String>,
    pub branch: Option<String>,
}

/// Template engine wrapper around minijinja.
pub struct GuidanceEngine {
    env: Environment<'static>,
}

impl Default for GuidanceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GuidanceEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("next_step", NEXT_STEP_TEMPLATE)
            .expect("next_step template should be valid");
        Self { env }
    }

    pub fn next_step(&self, artifact: ArtifactType, inputs: &GuidanceInputs) -> Result<String> {
        let template = self.env.get_template("next_step")?;
        let rendered = template.render(context! {
            artifact => artifact.as_str(),
            key => inputs.key.as_str(),
            verify_command => inputs.verify_command.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            code_reviewer => inputs.code_reviewer.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            patterns => &inputs.test_file_patterns,
            test_command => inputs.test_command.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            first_task => inputs.first_task.as_deref(),
            branch => inputs.branch.as_deref(),
        })?;
        Ok(rendered.trim().to_string())
    }

    /// Full stop-hook reason: every failed check, the next step, the escape hatch.
    pub fn block_reason(&self, verdict: &ExitVerdict, inputs: &GuidanceInputs) -> Result<String> {
        let mut reason = String::from("Session cannot end yet:\n");
        for line in &verdict.reasons {
            reason.push_str("- ");
            reason.push_str(line);
            reason.push('\n');
        }
        if let Some(artifact) = verdict.artifact_type {
            reason.push_str("\nNext step: ");
            reason.push_str(&self.next_step(artifact, inputs)?);
            reason.push('\n');
        }
        reason.push('\n');
        reason.push_str(ESCAPE_HATCH);
        Ok(reason)
    }
}
