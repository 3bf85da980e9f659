#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn kiro(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kiro-adapter").unwrap();
    cmd.current_dir(dir).env("KIRO_ADAPTER_ROOT", dir);
    cmd
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn bmad_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        ".bmad-core/agents/dev.md",
        "---\nagent:\n  id: dev\n  name: James\n  title: Full Stack Developer\n  whenToUse: Use for code implementation\ndependencies:\n  tasks:\n    - develop-story.md\n---\n\n# dev\n\nYou implement stories.\n",
    );
    write(
        dir.path(),
        ".bmad-core/agents/qa.md",
        "---\nagent:\n  id: qa\n  name: Quinn\n  whenToUse: Use for test review\ndependencies:\n  checklists:\n    - review-checklist.md\n---\n\n# qa\n\nYou review tests.\n",
    );
    write(
        dir.path(),
        ".bmad-core/tasks/develop-story.md",
        "# Develop Story\n",
    );
    dir
}

#[test]
fn init_creates_kiro_layout_once() {
    let dir = TempDir::new().unwrap();
    kiro(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .kiro/adapter.yaml"));
    assert!(dir.path().join(".kiro/steering/product.md").is_file());
    assert!(dir.path().join(".kiro/hooks").is_dir());

    kiro(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .kiro/adapter.yaml"));
}

#[test]
fn scan_lists_agents_as_json() {
    let dir = bmad_project();
    let out = kiro(dir.path())
        .args(["scan", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let ids: Vec<&str> = value["agents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["dev", "qa"]);
    assert_eq!(value["stats"]["core"], 2);
}

#[test]
fn deps_reports_missing_and_unknown_agents() {
    let dir = bmad_project();
    kiro(dir.path())
        .args(["deps", "qa"])
        .assert()
        .success()
        .stdout(predicate::str::contains("checklists/review-checklist.md"));

    kiro(dir.path())
        .args(["deps", "architect"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("agent 'architect' not found"));
}

#[test]
fn convert_writes_agents_steering_and_hooks() {
    let dir = bmad_project();
    kiro(dir.path())
        .arg("convert")
        .assert()
        .success()
        .stdout(predicate::str::contains("converted: dev"))
        .stdout(predicate::str::contains("[warning] qa: missing checklists/review-checklist.md"));

    let root = dir.path();
    assert!(root.join(".kiro/agents/dev.md").is_file());
    assert!(root.join(".kiro/agents/qa.md").is_file());
    assert!(root.join(".kiro/steering/agent-dev.md").is_file());
    assert!(root.join(".kiro/hooks/dev-code-review-on-save.kiro.hook").is_file());
    assert!(root.join(".kiro/hooks/qa-test-review-on-save.kiro.hook").is_file());
}

#[test]
fn strict_convert_fails_on_missing_dependencies() {
    let dir = bmad_project();
    kiro(dir.path())
        .args(["convert", "--strict"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] qa (dependency)"))
        .stderr(predicate::str::contains("1 agent(s) failed to convert"));
    assert!(dir.path().join(".kiro/agents/dev.md").is_file());
    assert!(!dir.path().join(".kiro/agents/qa.md").exists());
}

#[test]
fn health_is_unhealthy_before_convert_and_healthy_after() {
    let dir = bmad_project();
    kiro(dir.path())
        .arg("health")
        .assert()
        .failure()
        .stdout(predicate::str::contains("agent file missing"));

    kiro(dir.path()).arg("convert").assert().success();
    kiro(dir.path())
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 healthy, 0 unhealthy"));
}

#[test]
fn activate_records_metrics() {
    let dir = bmad_project();
    kiro(dir.path()).arg("convert").assert().success();

    kiro(dir.path())
        .args(["activate", "dev", "--user", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("task:develop-story"));
    kiro(dir.path())
        .args(["activate", "ghost"])
        .assert()
        .failure();

    assert!(dir
        .path()
        .join(".kiro/state/activation-metrics.json")
        .is_file());
    let out = kiro(dir.path())
        .args(["metrics", "show", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["statistics"]["successes"], 1);
    assert_eq!(value["statistics"]["failures"], 1);
    assert_eq!(value["statistics"]["failure_categories"]["not_found"], 1);
}

#[test]
fn hooks_from_workflow_file() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "workflow.yaml",
        "id: greenfield\nname: Greenfield\nphases:\n  - name: development\n    agent: dev\n    file_patterns: [\"src/**/*.rs\"]\n  - name: review\n    description: no agent\n",
    );
    let out = dir.path().join("out");
    kiro(dir.path())
        .args(["hooks", "workflow.yaml", "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped: phase:review"));

    let files: Vec<_> = std::fs::read_dir(&out).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn context_maps_needs_and_fallbacks() {
    let dir = TempDir::new().unwrap();
    kiro(dir.path())
        .args(["context", "current file", "test results", "telepathy"])
        .args(["--unavailable", "#Terminal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Use #File"))
        .stdout(predicate::str::contains("no provider for 'telepathy'"))
        .stdout(predicate::str::contains("#Terminal (Medium)"));
}

#[test]
fn config_validate_rejects_zero_retries() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        ".kiro/adapter.yaml",
        "version: 1\nregistry:\n  retry_attempts: 0\n",
    );
    kiro(dir.path())
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] registry.retry_attempts"))
        .stderr(predicate::str::contains("config validation found errors"));
}
