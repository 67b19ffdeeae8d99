//! Per-session state documents under `.wm/sessions/<id>/state.json`.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::types::{SessionState, is_valid_session_id};
use crate::io::paths::{WmPaths, write_json_atomic};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid session id '{0}'")]
    InvalidId(String),
    #[error("no state for session {0}")]
    NotFound(String),
    #[error("malformed state {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("session store I/O at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("write state {}: {source:#}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// File-backed session state store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    paths: WmPaths,
}

impl SessionStore {
    pub fn new(paths: WmPaths) -> Self {
        Self { paths }
    }

    fn checked_path(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_session_id(session_id) {
            return Err(StoreError::InvalidId(session_id.to_string()));
        }
        Ok(self.paths.state_path(session_id))
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.checked_path(session_id)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    #[instrument(skip(self))]
    pub fn read(&self, session_id: &str) -> Result<SessionState, StoreError> {
        let path = self.checked_path(session_id)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(session_id.to_string()));
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_str(&contents).map_err(|source| StoreError::Malformed { path, source })
    }

    /// Atomically replace the whole document.
    #[instrument(skip(self, state))]
    pub fn write(&self, session_id: &str, state: &SessionState) -> Result<(), StoreError> {
        let path = self.checked_path(session_id)?;
        write_json_atomic(&path, state).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "wrote session state");
        Ok(())
    }

    /// Session ids that have a state document, in name order.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Session whose state was modified most recently.
    pub fn latest(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries()?
            .into_iter()
            .max_by_key(|(_, modified)| *modified)
            .map(|(id, _)| id))
    }

    /// Valid session ids with the state file's modification time.
    pub fn entries(&self) -> Result<Vec<(String, SystemTime)>, StoreError> {
        let dir = &self.paths.sessions_dir;
        let read_dir = match fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: dir.clone(),
                    source,
                });
            }
        };
        let mut entries = Vec::new();
        for entry in read_dir.flatten() {
            let Some(id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_valid_session_id(&id) {
                continue;
            }
            let state_path = self.paths.state_path(&id);
            let Ok(modified) = fs::metadata(&state_path).and_then(|m| m.modified()) else {
                continue;
            };
            entries.push((id, modified));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Delete a session directory and everything in it.
    pub fn remove(&self, session_id: &str) -> Result<(), StoreError> {
        self.checked_path(session_id)?;
        let dir = self.paths.session_dir(session_id);
        fs::remove_dir_all(&dir).map_err(|source| StoreError::Io { path: dir, source })
    }
}
