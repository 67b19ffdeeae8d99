//! Read-only access to native task records written by the host runtime.
//!
//! Layout: `<tasks_dir>/<session_id>/*.json`, one task per file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::tasks::{compare_ids, first_pending, pending_tasks};
use crate::core::types::NativeTask;

/// Default tasks root: `~/.claude/tasks`.
pub fn default_tasks_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("tasks"))
}

#[derive(Debug, Clone)]
pub struct TaskStore {
    root: PathBuf,
}

impl TaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every parseable task for the session, ordered by id.
    ///
    /// A missing session directory yields no tasks. Files that fail to parse
    /// are skipped with a warning.
    pub fn load(&self, session_id: &str) -> Result<Vec<NativeTask>> {
        let dir = self.root.join(session_id);
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "no task directory");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err).with_context(|| format!("read {}", dir.display())),
        };
        let mut tasks = Vec::new();
        for entry in read_dir {
            let path = entry.with_context(|| format!("list {}", dir.display()))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_task(&path) {
                Ok(task) => tasks.push(task),
                Err(err) => warn!(path = %path.display(), err = %format!("{err:#}"), "skipping task file"),
            }
        }
        tasks.sort_by(|a, b| compare_ids(&a.id, &b.id));
        Ok(tasks)
    }

    pub fn pending_count(&self, session_id: &str) -> Result<usize> {
        Ok(pending_tasks(&self.load(session_id)?).len())
    }

    pub fn first_pending_task(&self, session_id: &str) -> Result<Option<NativeTask>> {
        Ok(first_pending(&self.load(session_id)?).cloned())
    }
}

fn read_task(path: &Path) -> Result<NativeTask> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}
