//! Test-only helpers: throwaway git projects, state builders, scripted signals.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tempfile::TempDir;

use crate::core::exit::{ExitSignals, PushState};
use crate::core::modes::ModeConfig;
use crate::core::settings::{ProjectConfig, ReviewsConfig, WmConfig};
use crate::core::test_patterns::AddedLine;
use crate::core::types::{NativeTask, PhaseRecord, SessionState, VerificationEvidence};
use crate::io::paths::WM_DIR;
use crate::workspace::{EnvOverrides, Workspace};

/// Deterministic UUID-v4-shaped session id.
pub fn session_id(n: u32) -> String {
    format!("00000000-0000-4000-8000-{n:012x}")
}

/// Fresh state already sitting in `mode`.
pub fn session_in_mode(mode: &str) -> SessionState {
    let mut state = SessionState::new(session_id(1));
    state.current_mode = mode.to_string();
    state.session_type = mode.to_string();
    state
}

/// Built-in `implementation` mode with both opt-in checks off.
pub fn implementation_mode() -> ModeConfig {
    ModeConfig {
        name: "implementation".to_string(),
        description: String::new(),
        category: "implementation".to_string(),
        deprecated: false,
        aliases: vec!["impl".to_string()],
        template: None,
        phased_verification: false,
        require_new_tests: false,
    }
}

/// Built-in workflow defaults without touching the filesystem.
pub fn test_config() -> WmConfig {
    WmConfig {
        spec_path: "planning/specs".to_string(),
        research_path: "planning/research".to_string(),
        session_retention_days: 7,
        reviews: ReviewsConfig {
            spec_review: false,
            code_review: None,
            code_reviewer: None,
        },
        verify_command: None,
        project: ProjectConfig {
            test_command: None,
            diff_base: "main".to_string(),
            test_file_pattern: Vec::new(),
        },
    }
}

/// [`ExitSignals`] with canned answers. `Err` strings become tooling failures.
#[derive(Debug, Clone)]
pub struct ScriptedSignals {
    pub tasks: Result<Vec<NativeTask>, String>,
    pub evidence: Option<VerificationEvidence>,
    pub phases: Vec<PhaseRecord>,
    pub latest_commit: Result<Option<DateTime<Utc>>, String>,
    pub changed_files: Result<Vec<String>, String>,
    pub added_lines: Result<Vec<AddedLine>, String>,
    pub tracked_changes: Result<Vec<String>, String>,
    pub push_state: Result<PushState, String>,
}

impl ScriptedSignals {
    /// No tasks, no evidence, no commits, clean and pushed.
    pub fn clean() -> Self {
        Self {
            tasks: Ok(Vec::new()),
            evidence: None,
            phases: Vec::new(),
            latest_commit: Ok(None),
            changed_files: Ok(Vec::new()),
            added_lines: Ok(Vec::new()),
            tracked_changes: Ok(Vec::new()),
            push_state: Ok(PushState::Pushed),
        }
    }
}

fn scripted<T: Clone>(value: &Result<T, String>) -> Result<T> {
    value.clone().map_err(|msg| anyhow!(msg))
}

impl ExitSignals for ScriptedSignals {
    fn tasks(&self) -> Result<Vec<NativeTask>> {
        scripted(&self.tasks)
    }

    fn verification_evidence(&self, _key: &str) -> Option<VerificationEvidence> {
        self.evidence.clone()
    }

    fn phase_evidence(&self, _key: &str) -> Vec<PhaseRecord> {
        self.phases.clone()
    }

    fn latest_commit_time(&self) -> Result<Option<DateTime<Utc>>> {
        scripted(&self.latest_commit)
    }

    fn changed_files(&self, _diff_base: &str) -> Result<Vec<String>> {
        scripted(&self.changed_files)
    }

    fn added_lines(&self, _diff_base: &str, _paths: &[String]) -> Result<Vec<AddedLine>> {
        scripted(&self.added_lines)
    }

    fn tracked_changes(&self) -> Result<Vec<String>> {
        scripted(&self.tracked_changes)
    }

    fn push_state(&self) -> Result<PushState> {
        scripted(&self.push_state)
    }
}

/// Temporary git project on `main` with one commit, plus sibling dirs for
/// tasks, user config, and an optional bare remote.
pub struct TestRepo {
    temp: TempDir,
    root: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let root = temp.path().join("project");
        fs::create_dir_all(&root).context("create project dir")?;
        fs::create_dir_all(temp.path().join("tasks")).context("create tasks dir")?;
        fs::create_dir_all(temp.path().join("user-config")).context("create user config dir")?;
        let repo = Self { temp, root };
        repo.git(&["init", "-q", "-b", "main"])?;
        repo.git(&["config", "user.email", "wm@example.com"])?;
        repo.git(&["config", "user.name", "wm tests"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        fs::write(repo.root.join("README.md"), "# project\n").context("write README")?;
        fs::write(repo.root.join(".gitignore"), format!("{WM_DIR}/\n")).context("write .gitignore")?;
        repo.commit_all("initial")?;
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.temp.path().join("tasks")
    }

    pub fn config_home(&self) -> PathBuf {
        self.temp.path().join("user-config")
    }

    /// Overrides pointing every location into this repo's temp dir.
    pub fn env(&self, session: Option<&str>) -> EnvOverrides {
        EnvOverrides {
            project_dir: Some(self.root.clone()),
            session_id: session.map(str::to_string),
            config_home: Some(self.config_home()),
            tasks_dir: Some(self.tasks_dir()),
        }
    }

    /// Environment variables equivalent to [`TestRepo::env`], for spawned binaries.
    pub fn env_vars(&self) -> Vec<(&'static str, PathBuf)> {
        vec![
            ("WM_PROJECT_DIR", self.root.clone()),
            ("WM_CONFIG_HOME", self.config_home()),
            ("WM_TASKS_DIR", self.tasks_dir()),
        ]
    }

    pub fn workspace(&self, session: Option<&str>) -> Workspace {
        Workspace::discover(&self.root, &self.env(session))
    }

    pub fn write_project_config(&self, yaml: &str) -> Result<()> {
        let dir = self.root.join(WM_DIR);
        fs::create_dir_all(&dir).context("create .wm")?;
        fs::write(dir.join("wm.yaml"), yaml).context("write wm.yaml")
    }

    pub fn write_project_modes(&self, yaml: &str) -> Result<()> {
        let dir = self.root.join(WM_DIR);
        fs::create_dir_all(&dir).context("create .wm")?;
        fs::write(dir.join("modes.yaml"), yaml).context("write modes.yaml")
    }

    /// Write a native task file for `session`.
    pub fn write_task(&self, session: &str, task: Value) -> Result<()> {
        let id = match &task["id"] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let dir = self.tasks_dir().join(session);
        fs::create_dir_all(&dir).context("create task dir")?;
        fs::write(dir.join(format!("{id}.json")), task.to_string()).context("write task")
    }

    pub fn write_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create parent")?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", message])?;
        Ok(())
    }

    /// Add a bare `origin` and push `main` to it.
    pub fn add_remote(&self) -> Result<()> {
        let remote = self.temp.path().join("remote.git");
        let out = Command::new("git")
            .args(["init", "-q", "--bare"])
            .arg(&remote)
            .output()
            .context("init bare remote")?;
        if !out.status.success() {
            return Err(anyhow!("git init --bare failed"));
        }
        let remote = remote.to_string_lossy().into_owned();
        self.git(&["remote", "add", "origin", &remote])?;
        self.git(&["push", "-q", "-u", "origin", "main"])?;
        Ok(())
    }

    pub fn git(&self, args: &[&str]) -> Result<String> {
        let out = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !out.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}
