//! CLI tests for `wm can-exit`, `wm enter`, and `wm verify`.
//!
//! Spawns the wm binary against throwaway git repositories (with a bare
//! remote where pushing matters) and checks exit codes and JSON output.

use std::process::{Command, Output};

use chrono::{Duration, Utc};
use serde_json::Value;

use wm::core::types::VerificationEvidence;
use wm::exit_codes;
use wm::io::evidence::EvidenceStore;
use wm::io::paths::WmPaths;
use wm::test_support::{TestRepo, session_id};

fn wm(repo: &TestRepo) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_wm"));
    cmd.current_dir(repo.root()).env_remove("WM_SESSION_ID");
    for (key, value) in repo.env_vars() {
        cmd.env(key, value);
    }
    cmd
}

fn run(repo: &TestRepo, args: &[&str]) -> Output {
    wm(repo).args(args).output().expect("spawn wm")
}

fn json_stdout(out: &Output) -> Value {
    serde_json::from_slice(&out.stdout).expect("stdout json")
}

/// Implementation session tracking issue 7, with a reviewer configured.
fn implementation_session(repo: &TestRepo) -> String {
    repo.write_project_config("reviews:\n  code_reviewer: codex\n")
        .expect("config");
    let sid = session_id(7);
    let out = run(repo, &["enter", "impl", "--session", &sid, "--issue", "7"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    sid
}

#[test]
fn missing_evidence_blocks_with_not_run_guidance() {
    let repo = TestRepo::new().expect("repo");
    repo.add_remote().expect("remote");
    let sid = implementation_session(&repo);

    let out = run(&repo, &["can-exit", "--session", &sid, "--json"]);
    assert_eq!(out.status.code(), Some(exit_codes::BLOCKED));
    let report = json_stdout(&out);
    assert_eq!(report["canExit"], false);
    assert!(
        report["reasons"][0]
            .as_str()
            .is_some_and(|r| r.contains("has not been run for issue-7"))
    );
    assert_eq!(report["guidance"]["artifactType"], "verification_not_run");
    assert!(report["guidance"]["escapeHatch"].is_string());
}

#[test]
fn fresh_evidence_on_clean_pushed_repo_exits() {
    let repo = TestRepo::new().expect("repo");
    repo.add_remote().expect("remote");
    let sid = implementation_session(&repo);

    EvidenceStore::new(WmPaths::new(repo.root()))
        .write(
            "issue-7",
            &VerificationEvidence {
                passed: true,
                verified_at: Some(Utc::now() + Duration::seconds(1)),
                command: None,
                exit_code: None,
            },
        )
        .expect("evidence");

    let out = run(&repo, &["can-exit", "--session", &sid, "--json"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    let report = json_stdout(&out);
    assert_eq!(report["canExit"], true);
    assert_eq!(report["reasons"], serde_json::json!([]));
    assert!(report.get("guidance").is_none());
}

#[test]
fn evidence_older_than_new_commit_is_stale() {
    let repo = TestRepo::new().expect("repo");
    repo.add_remote().expect("remote");
    let sid = implementation_session(&repo);

    EvidenceStore::new(WmPaths::new(repo.root()))
        .write(
            "issue-7",
            &VerificationEvidence {
                passed: true,
                verified_at: Some(Utc::now() - Duration::hours(1)),
                command: None,
                exit_code: None,
            },
        )
        .expect("evidence");
    repo.write_file("src/lib.rs", "pub fn f() {}\n").expect("write");
    repo.commit_all("add lib").expect("commit");
    repo.git(&["push", "-q"]).expect("push");

    let out = run(&repo, &["can-exit", "--session", &sid, "--json"]);
    assert_eq!(out.status.code(), Some(exit_codes::BLOCKED));
    assert_eq!(json_stdout(&out)["guidance"]["artifactType"], "verification_stale");
}

#[test]
fn verify_command_records_evidence_that_unblocks_exit() {
    let repo = TestRepo::new().expect("repo");
    repo.add_remote().expect("remote");
    repo.write_project_config("verify_command: 'exit 0'\n")
        .expect("config");
    let sid = session_id(8);
    assert_eq!(
        run(&repo, &["enter", "implementation", "--session", &sid]).status.code(),
        Some(exit_codes::OK)
    );

    let out = run(&repo, &["verify", "--session", &sid]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    assert!(String::from_utf8_lossy(&out.stdout).contains(&format!("passed for {sid}")));

    let out = run(&repo, &["can-exit", "--session", &sid]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
}

#[test]
fn uncommitted_then_unpushed_changes_block_in_order() {
    let repo = TestRepo::new().expect("repo");
    repo.add_remote().expect("remote");
    let sid = session_id(9);
    run(&repo, &["enter", "planning", "--session", &sid]);

    repo.write_file("README.md", "# changed\n").expect("write");
    repo.write_file("notes.txt", "untracked\n").expect("write");
    let out = run(&repo, &["can-exit", "--session", &sid, "--json"]);
    assert_eq!(out.status.code(), Some(exit_codes::BLOCKED));
    let report = json_stdout(&out);
    assert_eq!(report["guidance"]["artifactType"], "uncommitted_changes");
    assert_eq!(report["reasons"].as_array().map(Vec::len), Some(1));
    assert!(
        report["reasons"][0]
            .as_str()
            .is_some_and(|r| r.contains("README.md") && !r.contains("notes.txt"))
    );

    repo.commit_all("edit readme").expect("commit");
    let out = run(&repo, &["can-exit", "--session", &sid, "--json"]);
    assert_eq!(json_stdout(&out)["guidance"]["artifactType"], "unpushed_commits");

    repo.git(&["push", "-q"]).expect("push");
    let out = run(&repo, &["can-exit", "--session", &sid]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
}

#[test]
fn invalid_session_and_unknown_mode_exit_invalid() {
    let repo = TestRepo::new().expect("repo");
    let out = run(&repo, &["can-exit", "--session", "not-a-uuid"]);
    assert_eq!(out.status.code(), Some(exit_codes::INVALID));

    let out = run(&repo, &["enter", "nonsense", "--session", &session_id(1)]);
    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown mode"));
}

#[test]
fn env_session_is_used_when_flag_is_absent() {
    let repo = TestRepo::new().expect("repo");
    let sid = session_id(11);
    let out = wm(&repo)
        .env("WM_SESSION_ID", &sid)
        .args(["enter", "research"])
        .output()
        .expect("spawn wm");
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    assert!(String::from_utf8_lossy(&out.stdout).starts_with(&format!("{sid}: research")));
}
