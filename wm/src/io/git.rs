//! Git adapter for exit checks.
//!
//! Every call goes through [`run_command_with_timeout`] so a wedged git (lock
//! contention, credential prompt, network remote) cannot hang a hook.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::core::exit::PushState;
use crate::core::test_patterns::AddedLine;
use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Deadline for a single git invocation.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(10);

const GIT_OUTPUT_LIMIT: usize = 4 * 1024 * 1024;

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Current branch name, `None` on detached HEAD or an unborn branch.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let out = self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if !out.success() {
            return Ok(None);
        }
        let name = out.stdout_lossy().trim().to_string();
        Ok((name != "HEAD" && !name.is_empty()).then_some(name))
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Paths of tracked files with staged or unstaged modifications.
    #[instrument(skip_all)]
    pub fn tracked_changes(&self) -> Result<Vec<String>> {
        let changed: Vec<String> = self
            .status_porcelain()?
            .into_iter()
            .filter(|entry| !entry.is_untracked())
            .map(|entry| entry.path)
            .collect();
        debug!(count = changed.len(), "tracked changes");
        Ok(changed)
    }

    /// True once HEAD points at a commit.
    pub fn has_commits(&self) -> Result<bool> {
        Ok(self.run(&["rev-parse", "--verify", "--quiet", "HEAD"])?.success())
    }

    /// Committer time of HEAD, `None` for a repository without commits.
    #[instrument(skip_all)]
    pub fn latest_commit_time(&self) -> Result<Option<DateTime<Utc>>> {
        if !self.has_commits()? {
            debug!("no commits yet");
            return Ok(None);
        }
        let out = self.run_capture(&["log", "-1", "--format=%cI"])?;
        let raw = out.trim();
        let at = DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("parse commit time '{raw}'"))?;
        Ok(Some(at.with_timezone(&Utc)))
    }

    pub fn has_remotes(&self) -> Result<bool> {
        Ok(!self.run_capture(&["remote"])?.trim().is_empty())
    }

    /// Whether HEAD is contained in any remote-tracking branch.
    #[instrument(skip_all)]
    pub fn push_state(&self) -> Result<PushState> {
        if !self.has_remotes()? {
            return Ok(PushState::NoRemote);
        }
        let out = self.run_capture(&["branch", "-r", "--contains", "HEAD"])?;
        let state = if out.lines().any(|line| !line.trim().is_empty()) {
            PushState::Pushed
        } else {
            PushState::NotPushed
        };
        debug!(?state, "push state");
        Ok(state)
    }

    /// Merge base of `base` and HEAD.
    pub fn merge_base(&self, base: &str) -> Result<String> {
        let out = self.run_capture(&["merge-base", base, "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Files changed in the working tree relative to the merge base with `base`.
    #[instrument(skip_all, fields(base))]
    pub fn changed_files(&self, base: &str) -> Result<Vec<String>> {
        let merge_base = self.merge_base(base)?;
        let out = self.run_capture(&["diff", "--name-only", &merge_base])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Lines added to `paths` relative to the merge base with `base`.
    #[instrument(skip_all, fields(base, paths = paths.len()))]
    pub fn added_lines(&self, base: &str, paths: &[String]) -> Result<Vec<AddedLine>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let merge_base = self.merge_base(base)?;
        let mut args = vec!["diff", "-U0", "--no-color", "--no-ext-diff", merge_base.as_str(), "--"];
        args.extend(paths.iter().map(String::as_str));
        let out = self.run_capture(&args)?;
        Ok(parse_added_lines(&out))
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let out = self.run(args)?;
        if out.timed_out {
            warn!(args = %args.join(" "), "git timed out");
            return Err(anyhow!(
                "git {} timed out after {}s",
                args.join(" "),
                GIT_TIMEOUT.as_secs()
            ));
        }
        if !out.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                out.stderr_tail(400)
            ));
        }
        Ok(out.stdout_lossy())
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut cmd = Command::new("git");
        cmd.args(["-c", "core.quotePath=false"])
            .args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0");
        run_command_with_timeout(cmd, GIT_TIMEOUT, GIT_OUTPUT_LIMIT)
            .with_context(|| format!("run git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

/// Collect `+` lines from a unified diff, attributed to their target file.
///
/// Header `+++` lines are only recognized between `diff --git` and the first
/// hunk, so added content that itself starts with `++` is kept.
pub fn parse_added_lines(diff: &str) -> Vec<AddedLine> {
    let mut added = Vec::new();
    let mut path: Option<String> = None;
    let mut in_header = false;
    for line in diff.lines() {
        if line.starts_with("diff --git ") {
            in_header = true;
            path = None;
            continue;
        }
        if in_header {
            if let Some(target) = line.strip_prefix("+++ ") {
                path = target.strip_prefix("b/").map(str::to_string);
            } else if line.starts_with("@@") {
                in_header = false;
            }
            continue;
        }
        if let (Some(text), Some(path)) = (line.strip_prefix('+'), &path) {
            added.push(AddedLine {
                path: path.clone(),
                text: text.to_string(),
            });
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn git_queries_follow_worktree_and_remote() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());
        assert_eq!(git.current_branch().expect("branch").as_deref(), Some("main"));
        assert!(git.latest_commit_time().expect("commit time").is_some());
        assert_eq!(git.push_state().expect("push state"), PushState::NoRemote);

        repo.add_remote().expect("remote");
        assert_eq!(git.push_state().expect("push state"), PushState::Pushed);

        repo.write_file("README.md", "# changed\n").expect("write");
        repo.write_file("scratch.txt", "untracked\n").expect("write");
        assert_eq!(git.tracked_changes().expect("status"), vec!["README.md".to_string()]);

        repo.commit_all("edit readme").expect("commit");
        assert_eq!(git.push_state().expect("push state"), PushState::NotPushed);
    }

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert!(e.is_untracked());
        assert_eq!(e.path, "foo.txt");
    }

    #[test]
    fn parses_modified_line() {
        let e = parse_status_line(" M src/main.rs").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: " M".to_string(),
                path: "src/main.rs".to_string()
            }
        );
        assert!(!e.is_untracked());
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn added_lines_are_attributed_per_file() {
        let diff = "\
diff --git a/tests/a.rs b/tests/a.rs
index 1111111..2222222 100644
--- a/tests/a.rs
+++ b/tests/a.rs
@@ -3,0 +4,2 @@ fn x() {
+#[test]
+++counter;
diff --git a/gone.rs b/gone.rs
deleted file mode 100644
--- a/gone.rs
+++ /dev/null
@@ -1 +0,0 @@
-fn old() {}
";
        let added = parse_added_lines(diff);
        assert_eq!(
            added,
            vec![
                AddedLine {
                    path: "tests/a.rs".to_string(),
                    text: "#[test]".to_string()
                },
                AddedLine {
                    path: "tests/a.rs".to_string(),
                    text: "++counter;".to_string()
                },
            ]
        );
    }
}
