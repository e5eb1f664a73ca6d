//! Integration tests for Tribunal
//!
//! These drive the binary end to end against a throwaway git repository.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use git2::{BranchType, Repository, RepositoryInitOptions, Signature};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CLEAN_REPORT: &str = "\
## Summary
Nothing blocking.

## P2 Findings

### P2-1: Naming
Location: src/app.py:1

## Verdict
PASS
";

/// Helper to create a tribunal Command
fn tribunal(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("tribunal");
    cmd.current_dir(dir.path()).env_remove("TRIBUNAL_LOG");
    cmd
}

fn commit(repo: &Repository, dir: &Path, name: &str, content: &str, msg: &str) {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("test", "test@test.com").unwrap();
    let parents = match repo.head() {
        Ok(head) => vec![head.peel_to_commit().unwrap()],
        Err(_) => vec![],
    };
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &parent_refs)
        .unwrap();
}

/// A repository on `feature-x` with one Python change over `main`.
fn create_temp_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(dir.path(), &opts).unwrap();
    commit(&repo, dir.path(), "README.md", "# demo\n", "initial");

    let head = repo.head().unwrap().peel_to_commit().unwrap();
    repo.branch("feature-x", &head, false).unwrap();
    repo.set_head("refs/heads/feature-x").unwrap();
    commit(&repo, dir.path(), "src/app.py", "print('hi')\n", "add app");
    dir
}

/// Run init, both explores and plan.
fn planned_repo() -> TempDir {
    let dir = create_temp_repo();
    tribunal(&dir).args(["init", "--base", "main"]).assert().success();
    tribunal(&dir).args(["explore", "context"]).assert().success();
    tribunal(&dir).args(["explore", "diff"]).assert().success();
    tribunal(&dir).arg("plan").assert().success();
    dir
}

fn current_run(dir: &TempDir) -> serde_json::Value {
    let state = dir.path().join(".tribunal");
    let id = fs::read_to_string(state.join("current")).unwrap();
    let raw = fs::read_to_string(state.join("runs").join(id.trim()).join("run.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn ingest(dir: &TempDir, participant: &str, content: &str, extra: &[&str]) -> assert_cmd::assert::Assert {
    tribunal(dir)
        .arg("ingest")
        .arg(participant)
        .args(extra)
        .write_stdin(content)
        .assert()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_tribunal_help() {
        cargo_bin_cmd!("tribunal")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("verdict"));
    }

    #[test]
    fn test_tribunal_version() {
        cargo_bin_cmd!("tribunal").arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_run_and_branch() {
        let dir = create_temp_repo();
        tribunal(&dir)
            .args(["init", "--base", "main"])
            .assert()
            .success()
            .stdout(predicate::str::contains("review/main--feature-x--"));

        assert!(dir.path().join(".tribunal/current").exists());
        assert!(dir.path().join(".tribunal/logs").is_dir());
        let run = current_run(&dir);
        assert_eq!(run["status"], "pending");
        assert_eq!(run["branches"]["target"], "feature-x");

        let repo = Repository::open(dir.path()).unwrap();
        let review = run["branches"]["review"].as_str().unwrap();
        assert!(repo.find_branch(review, BranchType::Local).is_ok());
    }

    #[test]
    fn test_second_init_requires_force() {
        let dir = create_temp_repo();
        tribunal(&dir).args(["init", "--base", "main"]).assert().success();
        tribunal(&dir)
            .args(["init", "--base", "main"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Precondition failed"));
        tribunal(&dir)
            .args(["init", "--base", "main", "--force"])
            .assert()
            .success();
    }

    #[test]
    fn test_init_same_base_and_target_fails() {
        let dir = create_temp_repo();
        tribunal(&dir)
            .args(["init", "--base", "feature-x"])
            .assert()
            .code(1);
    }
}

// =============================================================================
// Preconditions
// =============================================================================

mod preconditions {
    use super::*;

    #[test]
    fn test_commands_before_init_fail() {
        let dir = create_temp_repo();
        for args in [
            vec!["explore", "diff"],
            vec!["plan"],
            vec!["run"],
            vec!["status"],
            vec!["verdict"],
        ] {
            tribunal(&dir)
                .args(&args)
                .assert()
                .code(1)
                .stderr(predicate::str::contains("tribunal init"));
        }
    }

    #[test]
    fn test_plan_requires_explore() {
        let dir = create_temp_repo();
        tribunal(&dir).args(["init", "--base", "main"]).assert().success();
        tribunal(&dir)
            .arg("plan")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Precondition failed"));
    }

    #[test]
    fn test_run_requires_plan() {
        let dir = create_temp_repo();
        tribunal(&dir).args(["init", "--base", "main"]).assert().success();
        tribunal(&dir).args(["explore", "context"]).assert().success();
        tribunal(&dir).args(["explore", "diff"]).assert().success();
        tribunal(&dir).arg("run").assert().code(1);
    }

    #[test]
    fn test_ingest_rejects_unplanned_participant() {
        let dir = planned_repo();
        tribunal(&dir).arg("run").assert().success();
        ingest(&dir, "stranger", CLEAN_REPORT, &[])
            .code(1)
            .stderr(predicate::str::contains("--extra"));
    }

    #[test]
    fn test_explicit_plan_path_must_exist() {
        let dir = create_temp_repo();
        tribunal(&dir).args(["init", "--base", "main"]).assert().success();
        tribunal(&dir).args(["explore", "context"]).assert().success();
        tribunal(&dir).args(["explore", "diff"]).assert().success();
        tribunal(&dir)
            .args(["plan", "--plan-path", "docs/nope.md"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("not found"));
    }
}

// =============================================================================
// Review flow
// =============================================================================

mod review_flow {
    use super::*;

    #[test]
    fn test_plan_lists_participants_for_changed_files() {
        let dir = create_temp_repo();
        tribunal(&dir).args(["init", "--base", "main"]).assert().success();
        tribunal(&dir).args(["explore", "context"]).assert().success();
        tribunal(&dir).args(["explore", "diff"]).assert().success();
        tribunal(&dir)
            .arg("plan")
            .assert()
            .success()
            .stdout(predicate::str::contains("logic"))
            .stdout(predicate::str::contains("ruff"))
            .stdout(predicate::str::contains("eslint").not());

        let plan = dir.path().join(".tribunal/runs");
        let run_id = current_run(&dir)["id"].as_str().unwrap().to_string();
        assert!(plan.join(&run_id).join("plan.json").exists());
        assert!(plan.join(&run_id).join("plan.md").exists());
    }

    #[test]
    fn test_full_review_reaches_pass() {
        let dir = planned_repo();
        tribunal(&dir)
            .arg("run")
            .assert()
            .success()
            .stdout(predicate::str::contains("requests/logic.md"));

        ingest(&dir, "logic", CLEAN_REPORT, &[])
            .success()
            .stdout(predicate::str::contains("DONE"));
        tribunal(&dir)
            .arg("verdict")
            .assert()
            .code(2)
            .stdout(predicate::str::contains("INCOMPLETE"));

        ingest(&dir, "code-quality", CLEAN_REPORT, &[]).success();
        ingest(&dir, "silent-failure", CLEAN_REPORT, &[]).success();
        ingest(&dir, "ruff", "All checks passed!\n", &["--exit-code", "0"]).success();
        ingest(&dir, "pytest", "===== 3 passed in 0.10s =====\n", &["--exit-code", "0"]).success();

        tribunal(&dir)
            .arg("verdict")
            .assert()
            .success()
            .stdout(predicate::str::contains("PASS"));
        assert_eq!(current_run(&dir)["status"], "completed");
        assert_eq!(current_run(&dir)["verdict"], "PASS");

        tribunal(&dir)
            .arg("handoff")
            .assert()
            .success()
            .stdout(predicate::str::contains("deferred"));
        let run_id = current_run(&dir)["id"].as_str().unwrap().to_string();
        let run_dir = dir.path().join(".tribunal/runs").join(run_id);
        assert!(run_dir.join("handoff.json").exists());
        assert!(run_dir.join("patch-confirmation.json").exists());
    }

    #[test]
    fn test_resubmission_after_pass_blocks_merge() {
        let dir = planned_repo();
        tribunal(&dir).arg("run").assert().success();
        for agent in ["logic", "code-quality", "silent-failure"] {
            ingest(&dir, agent, CLEAN_REPORT, &[]).success();
        }
        ingest(&dir, "ruff", "All checks passed!\n", &[]).success();
        ingest(&dir, "pytest", "===== 3 passed in 0.10s =====\n", &[]).success();
        tribunal(&dir).arg("verdict").assert().success();

        let blocking = CLEAN_REPORT
            .replace("## P2 Findings", "## P0 Findings")
            .replace("### P2-1: Naming", "### P0-1: Crash on start")
            .replace("PASS", "FAIL");
        ingest(&dir, "logic", &blocking, &["--overwrite"]).success();
        assert_eq!(current_run(&dir)["status"], "pending_ingest");

        tribunal(&dir)
            .arg("merge")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("tribunal verdict"));
        tribunal(&dir)
            .arg("verdict")
            .assert()
            .code(1)
            .stdout(predicate::str::contains("FAIL"));
    }

    #[test]
    fn test_invalid_report_is_recorded_not_rejected() {
        let dir = planned_repo();
        tribunal(&dir).arg("run").assert().success();
        ingest(&dir, "logic", "just some words\n", &[])
            .success()
            .stdout(predicate::str::contains("INVALID"))
            .stderr(predicate::str::contains("violates the contract"));

        tribunal(&dir)
            .args(["verdict", "--json"])
            .assert()
            .code(2)
            .stdout(predicate::str::contains("\"invalid\""));
    }

    #[test]
    fn test_failing_tool_fails_verdict() {
        let dir = planned_repo();
        tribunal(&dir).arg("run").assert().success();
        for agent in ["logic", "code-quality", "silent-failure"] {
            ingest(&dir, agent, CLEAN_REPORT, &[]).success();
        }
        ingest(&dir, "ruff", "src/app.py:1:1: F401 unused import\nFound 1 error.\n", &["--exit-code", "1"])
            .success()
            .stdout(predicate::str::contains("FAIL"));
        ingest(&dir, "pytest", "===== 3 passed in 0.10s =====\n", &[]).success();

        tribunal(&dir)
            .arg("verdict")
            .assert()
            .code(1)
            .stdout(predicate::str::contains("FAIL"));
        tribunal(&dir)
            .arg("merge")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Merge refused"));
    }

    #[test]
    fn test_resubmission_needs_overwrite() {
        let dir = planned_repo();
        tribunal(&dir).arg("run").assert().success();
        ingest(&dir, "logic", CLEAN_REPORT, &[]).success();
        ingest(&dir, "logic", CLEAN_REPORT, &[]).code(1);
        ingest(&dir, "logic", CLEAN_REPORT, &["--overwrite"])
            .success()
            .stdout(predicate::str::contains("replaced"));
    }

    #[test]
    fn test_status_json_reports_participants() {
        let dir = planned_repo();
        tribunal(&dir).arg("run").assert().success();
        ingest(&dir, "logic", CLEAN_REPORT, &["--file", "/dev/stdin"]).success();

        let output = tribunal(&dir).args(["status", "--json"]).output().unwrap();
        assert!(output.status.success());
        let snapshot: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(snapshot["run"]["status"], "pending_ingest");
        let rows = snapshot["participants"].as_array().unwrap();
        let logic = rows.iter().find(|r| r["name"] == "logic").unwrap();
        assert_eq!(logic["state"], "DONE");
        let pytest = rows.iter().find(|r| r["name"] == "pytest").unwrap();
        assert_eq!(pytest["state"], "PENDING");
    }

    #[test]
    fn test_cleanup_removes_current_run() {
        let dir = planned_repo();
        tribunal(&dir)
            .args(["cleanup", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 1 run(s)"));
        assert!(!dir.path().join(".tribunal/current").exists());
        tribunal(&dir).arg("status").assert().code(1);
    }
}

// =============================================================================
// Drift guard
// =============================================================================

mod drift_guard {
    use super::*;

    /// Commit a file onto the review branch without touching the worktree.
    fn advance_review_branch(dir: &TempDir) {
        let run = current_run(dir);
        let review = run["branches"]["review"].as_str().unwrap();
        let repo = Repository::open(dir.path()).unwrap();
        let parent = repo
            .find_branch(review, BranchType::Local)
            .unwrap()
            .get()
            .peel_to_commit()
            .unwrap();
        let blob = repo.blob(b"late change\n").unwrap();
        let mut builder = repo.treebuilder(Some(&parent.tree().unwrap())).unwrap();
        builder.insert("late.txt", blob, 0o100644).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let sig = Signature::now("test", "test@test.com").unwrap();
        repo.commit(
            Some(&format!("refs/heads/{}", review)),
            &sig,
            &sig,
            "late",
            &tree,
            &[&parent],
        )
        .unwrap();
    }

    #[test]
    fn test_run_refuses_after_review_branch_moves() {
        let dir = planned_repo();
        advance_review_branch(&dir);
        tribunal(&dir)
            .arg("run")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Drift detected"))
            .stderr(predicate::str::contains("head_changed"));
        assert_eq!(current_run(&dir)["drift"]["status"], "DRIFT_CONFIRMED");
    }

    #[test]
    fn test_override_is_sticky() {
        let dir = planned_repo();
        advance_review_branch(&dir);
        tribunal(&dir)
            .args(["run", "--override-drift"])
            .assert()
            .success()
            .stdout(predicate::str::contains("override used"));
        assert_eq!(current_run(&dir)["drift"]["override_used"], true);

        tribunal(&dir).args(["explore", "diff"]).assert().success();
        tribunal(&dir).arg("plan").assert().success();
        assert_eq!(current_run(&dir)["drift"]["override_used"], true);
    }

    #[test]
    fn test_replanning_clears_drift() {
        let dir = planned_repo();
        advance_review_branch(&dir);
        tribunal(&dir).arg("run").assert().code(1);
        tribunal(&dir).args(["explore", "context"]).assert().success();
        tribunal(&dir).args(["explore", "diff"]).assert().success();
        tribunal(&dir).arg("plan").assert().success();
        tribunal(&dir).arg("run").assert().success();
    }
}
