//! Runs the configured `verify_command` and turns the result into evidence.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, instrument};

use crate::core::types::VerificationEvidence;
use crate::io::process::run_command_with_timeout;

pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub workdir: PathBuf,
    pub command: String,
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl VerifyOutcome {
    pub fn passed(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

pub trait VerifyRunner {
    fn run(&self, request: &VerifyRequest) -> Result<VerifyOutcome>;
}

/// Runs the command through `sh -c` in the project root.
pub struct ShellVerifyRunner;

impl VerifyRunner for ShellVerifyRunner {
    #[instrument(skip_all, fields(command = %request.command))]
    fn run(&self, request: &VerifyRequest) -> Result<VerifyOutcome> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&request.command)
            .current_dir(&request.workdir);
        let output = run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes)
            .with_context(|| format!("run verify command `{}`", request.command))?;

        let mut stderr = output.stderr_lossy();
        if output.timed_out {
            stderr.push_str(&format!(
                "\n[verify command timed out after {}s]\n",
                request.timeout.as_secs()
            ));
        }
        write_verify_log(&request.log_path, &output.stdout_lossy(), &stderr)?;

        debug!(exit_code = ?output.status.code(), timed_out = output.timed_out, "verify finished");
        Ok(VerifyOutcome {
            exit_code: output.status.code(),
            timed_out: output.timed_out,
        })
    }
}

/// Run verification and build the evidence record stamped now.
pub fn run_verification<R: VerifyRunner>(
    runner: &R,
    request: &VerifyRequest,
) -> Result<VerificationEvidence> {
    let outcome = runner.run(request)?;
    Ok(VerificationEvidence {
        passed: outcome.passed(),
        verified_at: Some(Utc::now()),
        command: Some(request.command.clone()),
        exit_code: outcome.exit_code,
    })
}

fn write_verify_log(path: &Path, stdout: &str, stderr: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create verify log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(stdout);
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(stderr);
    fs::write(path, buf).with_context(|| format!("write verify log {}", path.display()))?;
    Ok(())
}
