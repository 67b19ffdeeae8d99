//! On-disk layout under `<root>/.wm` and project-root discovery.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

/// Directory holding all per-project controller data.
pub const WM_DIR: &str = ".wm";

/// Well-known paths for one project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WmPaths {
    pub root: PathBuf,
    pub wm_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub evidence_dir: PathBuf,
}

impl WmPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let wm_dir = root.join(WM_DIR);
        Self {
            root: root.clone(),
            wm_dir: wm_dir.clone(),
            sessions_dir: wm_dir.join("sessions"),
            evidence_dir: wm_dir.join("verification-evidence"),
        }
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id)
    }

    pub fn state_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("state.json")
    }

    pub fn evidence_path(&self, key: &str) -> PathBuf {
        self.evidence_dir.join(format!("{key}.json"))
    }

    pub fn phase_evidence_path(&self, key: &str, phase_id: &str) -> PathBuf {
        self.evidence_dir.join(format!("{key}.phase-{phase_id}.json"))
    }
}

/// Find the project root.
///
/// An explicit override wins. Otherwise walk up from `start` to the first
/// directory containing `.wm` or `.git`, falling back to `start` itself.
pub fn discover_root(start: &Path, override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        debug!(root = %dir.display(), "project root from override");
        return dir.to_path_buf();
    }
    for dir in start.ancestors() {
        if dir.join(WM_DIR).is_dir() || dir.join(".git").exists() {
            debug!(root = %dir.display(), "project root discovered");
            return dir.to_path_buf();
        }
    }
    start.to_path_buf()
}

/// Serialize `value` as pretty JSON and atomically replace `path` (temp file + rename).
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
