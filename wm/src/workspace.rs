//! Project-scoped handles shared by the CLI commands and hook handlers.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::modes::ModesConfig;
use crate::core::settings::WmConfig;
use crate::io::config::{ConfigCache, ConfigResolver, ConfigSources};
use crate::io::evidence::EvidenceStore;
use crate::io::git::Git;
use crate::io::paths::{WmPaths, discover_root};
use crate::io::session_store::{SessionStore, StoreError};
use crate::io::signals::RepoSignals;
use crate::io::task_store::{TaskStore, default_tasks_dir};

/// Environment overrides, captured once so the rest of the crate never reads env vars.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// `WM_PROJECT_DIR`
    pub project_dir: Option<PathBuf>,
    /// `WM_SESSION_ID`
    pub session_id: Option<String>,
    /// `WM_CONFIG_HOME`
    pub config_home: Option<PathBuf>,
    /// `WM_TASKS_DIR`
    pub tasks_dir: Option<PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            project_dir: non_empty_var("WM_PROJECT_DIR").map(PathBuf::from),
            session_id: non_empty_var("WM_SESSION_ID").and_then(|v| v.into_string().ok()),
            config_home: non_empty_var("WM_CONFIG_HOME").map(PathBuf::from),
            tasks_dir: non_empty_var("WM_TASKS_DIR").map(PathBuf::from),
        }
    }
}

fn non_empty_var(name: &str) -> Option<OsString> {
    std::env::var_os(name).filter(|value| !value.is_empty())
}

/// Where a resolved session id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    Explicit,
    Env,
    Payload,
    Latest,
}

#[derive(Debug)]
pub struct Workspace {
    pub paths: WmPaths,
    pub config: ConfigResolver,
    pub sessions: SessionStore,
    pub tasks: TaskStore,
    pub evidence: EvidenceStore,
    env_session: Option<String>,
}

impl Workspace {
    /// Locate the project from `cwd` and the environment overrides.
    pub fn discover(cwd: &Path, env: &EnvOverrides) -> Self {
        let root = discover_root(cwd, env.project_dir.as_deref());
        let paths = WmPaths::new(root);
        let tasks_root = env
            .tasks_dir
            .clone()
            .or_else(default_tasks_dir)
            .unwrap_or_else(|| paths.wm_dir.join("tasks"));
        let sources = ConfigSources::new(&paths, env.config_home.as_deref());
        debug!(root = %paths.root.display(), tasks = %tasks_root.display(), "workspace");
        Self {
            config: ConfigResolver::new(sources, ConfigCache::new()),
            sessions: SessionStore::new(paths.clone()),
            tasks: TaskStore::new(tasks_root),
            evidence: EvidenceStore::new(paths.clone()),
            env_session: env.session_id.clone(),
            paths,
        }
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn git(&self) -> Git {
        Git::new(&self.paths.root)
    }

    pub fn workflow_config(&self) -> WmConfig {
        self.config.load_workflow_config()
    }

    pub fn modes(&self) -> ModesConfig {
        self.config.load_mode_config()
    }

    pub fn signals(&self, session_id: &str) -> RepoSignals {
        RepoSignals::new(
            session_id,
            self.git(),
            self.tasks.clone(),
            self.evidence.clone(),
        )
    }

    /// Pick the session to act on.
    ///
    /// Precedence: explicit CLI flag, `WM_SESSION_ID`, hook payload, then (when
    /// `allow_latest`) the most recently modified session on disk.
    pub fn resolve_session(
        &self,
        explicit: Option<&str>,
        payload: Option<&str>,
        allow_latest: bool,
    ) -> Result<Option<(String, SessionSource)>, StoreError> {
        let candidates = [
            (explicit, SessionSource::Explicit),
            (self.env_session.as_deref(), SessionSource::Env),
            (payload, SessionSource::Payload),
        ];
        for (candidate, source) in candidates {
            if let Some(id) = candidate.map(str::trim).filter(|id| !id.is_empty()) {
                debug!(session = id, ?source, "session resolved");
                return Ok(Some((id.to_string(), source)));
            }
        }
        if !allow_latest {
            return Ok(None);
        }
        Ok(self
            .sessions
            .latest()?
            .map(|id| (id, SessionSource::Latest)))
    }
}
