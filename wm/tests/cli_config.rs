use std::process::Command;

use wm::exit_codes;
use wm::test_support::TestRepo;

fn wm(repo: &TestRepo, args: &[&str]) -> (Option<i32>, String) {
    let out = Command::new(env!("CARGO_BIN_EXE_wm"))
        .current_dir(repo.root())
        .env_remove("WM_SESSION_ID")
        .envs(repo.env_vars())
        .args(args)
        .output()
        .expect("spawn wm");
    (out.status.code(), String::from_utf8_lossy(&out.stdout).into_owned())
}

#[test]
fn config_without_any_wm_yaml_prints_built_in_defaults() {
    let repo = TestRepo::new().expect("repo");
    let (code, stdout) = wm(&repo, &["config"]);
    assert_eq!(code, Some(exit_codes::OK));
    assert!(stdout.contains("spec_path: planning/specs"));
    assert!(stdout.contains("research_path: planning/research"));
    assert!(stdout.contains("session_retention_days: 7"));
}

#[test]
fn project_tier_overrides_single_keys() {
    let repo = TestRepo::new().expect("repo");
    repo.write_project_config("session_retention_days: 30\n")
        .expect("config");
    let (_, stdout) = wm(&repo, &["config"]);
    assert!(stdout.contains("session_retention_days: 30"));
    assert!(stdout.contains("spec_path: planning/specs"));
}

#[test]
fn modes_lists_built_ins_and_project_additions() {
    let repo = TestRepo::new().expect("repo");
    repo.write_project_modes(
        "modes:\n  review:\n    category: general\n    aliases: [rv]\n",
    )
    .expect("modes");
    let (code, stdout) = wm(&repo, &["modes"]);
    assert_eq!(code, Some(exit_codes::OK));
    assert!(stdout.lines().any(|l| l.starts_with("implementation") && l.contains("impl")));
    assert!(stdout.lines().any(|l| l.starts_with("review") && l.contains("aliases: rv")));
}
