//! `wm`: session-lifecycle controller CLI.
//!
//! `wm hook <event>` is the host runtime's entry point; the other commands
//! are for humans and scripts.

use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;

use wm::exit_check::check_session;
use wm::exit_codes;
use wm::hooks::{HookEvent, HookInput, dispatch};
use wm::io::stdin::read_payload;
use wm::io::verify::ShellVerifyRunner;
use wm::lifecycle::{cli_session, enter, prune, status, verify};
use wm::logging;
use wm::workspace::{EnvOverrides, Workspace};

#[derive(Parser)]
#[command(
    name = "wm",
    version,
    about = "Workflow mode and exit-condition controller for coding agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle a lifecycle event from the host runtime (payload on stdin).
    Hook {
        #[arg(value_enum)]
        event: HookEvent,
    },
    /// Report whether the session may stop (exit 0 yes, 1 no, 2 invalid).
    CanExit {
        #[arg(long)]
        session: Option<String>,
        /// Print `{canExit, reasons, guidance}` JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Enter a mode (name or alias), appending to the mode history.
    Enter {
        mode: String,
        #[arg(long)]
        session: Option<String>,
        /// Track this issue; verification evidence is keyed by it.
        #[arg(long)]
        issue: Option<u64>,
    },
    /// Run `verify_command` and record verification evidence.
    Verify {
        #[arg(long)]
        session: Option<String>,
    },
    /// Show the session's mode, tasks, and evidence.
    Status {
        #[arg(long)]
        session: Option<String>,
    },
    /// Print the effective workflow settings as YAML.
    Config,
    /// List configured modes.
    Modes,
    /// Delete session state older than `session_retention_days`.
    Prune {
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let cwd: PathBuf = std::env::current_dir().context("read current directory")?;
    let ws = Workspace::discover(&cwd, &EnvOverrides::from_env());
    match cli.command {
        Command::Hook { event } => Ok(cmd_hook(&ws, event)),
        Command::CanExit { session, json } => cmd_can_exit(&ws, session.as_deref(), json),
        Command::Enter {
            mode,
            session,
            issue,
        } => {
            let session_id = cli_session(&ws, session.as_deref())?;
            let state = enter(&ws, &session_id, &mode, issue, Utc::now())?;
            println!("{}: {}", state.session_id, state.current_mode);
            Ok(exit_codes::OK)
        }
        Command::Verify { session } => {
            let session_id = cli_session(&ws, session.as_deref())?;
            let (key, evidence) = verify(&ws, &session_id, &ShellVerifyRunner)?;
            let verdict = if evidence.passed { "passed" } else { "failed" };
            println!("verification {verdict} for {key}");
            Ok(if evidence.passed {
                exit_codes::OK
            } else {
                exit_codes::BLOCKED
            })
        }
        Command::Status { session } => {
            let session_id = cli_session(&ws, session.as_deref())?;
            print!("{}", status(&ws, &session_id)?);
            Ok(exit_codes::OK)
        }
        Command::Config => {
            print!("{}", to_yaml(&ws.workflow_config())?);
            Ok(exit_codes::OK)
        }
        Command::Modes => {
            for mode in ws.modes().iter() {
                let mut line = format!("{:<16} [{}]", mode.name, mode.category);
                if !mode.aliases.is_empty() {
                    line.push_str(&format!(" aliases: {}", mode.aliases.join(", ")));
                }
                if mode.deprecated {
                    line.push_str(" (deprecated)");
                }
                println!("{line}");
            }
            Ok(exit_codes::OK)
        }
        Command::Prune { dry_run } => {
            let pruned = prune(&ws, SystemTime::now(), dry_run)?;
            let verb = if dry_run { "would remove" } else { "removed" };
            for id in &pruned {
                println!("{verb} {id}");
            }
            Ok(exit_codes::OK)
        }
    }
}

/// Hooks always exit 0; the decision travels in the JSON on stdout.
fn cmd_hook(ws: &Workspace, event: HookEvent) -> i32 {
    let input = HookInput::from_value(read_payload());
    let output = dispatch(event, ws, &input);
    if let Some(json) = output.to_json() {
        println!("{json}");
    }
    exit_codes::OK
}

fn cmd_can_exit(ws: &Workspace, session: Option<&str>, json: bool) -> Result<i32> {
    let session_id = cli_session(ws, session)?;
    let report = check_session(ws, &session_id)?;
    if json {
        let out = serde_json::to_string_pretty(&report.to_json()).context("serialize report")?;
        println!("{out}");
    } else if report.ok() {
        println!("ok: session may exit");
    } else {
        for reason in &report.verdict.reasons {
            println!("blocked: {reason}");
        }
        if let Some(guidance) = &report.guidance {
            println!("next: {}", guidance.next_step);
        }
    }
    Ok(if report.ok() {
        exit_codes::OK
    } else {
        exit_codes::BLOCKED
    })
}

fn to_yaml<T: Serialize>(value: &T) -> Result<String> {
    serde_yaml::to_string(value).context("serialize yaml")
}
