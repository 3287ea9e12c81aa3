use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn analyze_help_mentions_options() {
    let mut cmd = cargo_bin_cmd!("scrutinctl");
    let output = cmd
        .arg("analyze")
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    for flag in ["--root", "--exclude", "--force", "--format", "--state", "--background"] {
        assert!(text.contains(flag), "analyze help missing {flag}");
    }
}

#[test]
fn rules_lists_builtin_rules() {
    let mut cmd = cargo_bin_cmd!("scrutinctl");
    cmd.arg("rules")
        .assert()
        .success()
        .stdout(predicate::str::contains("todo-comment"))
        .stdout(predicate::str::contains("hardcoded-credential"));
}

#[test]
fn config_prints_defaults() {
    let mut cmd = cargo_bin_cmd!("scrutinctl");
    cmd.arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("capacity = 5"))
        .stdout(predicate::str::contains("debounce_ms = 300"));
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scrutin.toml");
    std::fs::write(&path, "[queue]\ncapacity = 0\n").unwrap();

    let mut cmd = cargo_bin_cmd!("scrutinctl");
    cmd.arg("config")
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

fn sample_workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::create_dir_all(dir.path().join("gen")).unwrap();
    std::fs::write(
        dir.path().join("src/main.rs"),
        "fn main() {\n    // TODO: wire the config\n}\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("gen/out.rs"), "// TODO generated\n").unwrap();
    dir
}

#[test]
fn analyze_reports_findings_as_json() {
    let dir = sample_workspace();

    let mut cmd = cargo_bin_cmd!("scrutinctl");
    let output = cmd
        .arg("analyze")
        .arg("--root")
        .arg(dir.path())
        .arg("--exclude")
        .arg("^gen/")
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["issues"], 1);
    assert_eq!(report["findings"][0]["rule_key"], "todo-comment");
    assert_eq!(report["findings"][0]["text_range"]["start_line"], 2);
}

#[test]
fn forced_analysis_includes_excluded_files() {
    let dir = sample_workspace();

    let mut cmd = cargo_bin_cmd!("scrutinctl");
    cmd.arg("analyze")
        .arg("--root")
        .arg(dir.path())
        .arg("--exclude")
        .arg("^gen/")
        .arg("--force")
        .assert()
        .success()
        .stdout(predicate::str::contains("gen/out.rs:1:4"))
        .stdout(predicate::str::contains("2 issue(s)"));
}

#[test]
fn fail_on_findings_sets_exit_code() {
    let dir = sample_workspace();

    let mut cmd = cargo_bin_cmd!("scrutinctl");
    cmd.arg("analyze")
        .arg("--root")
        .arg(dir.path())
        .arg("--fail-on-findings")
        .assert()
        .code(1);
}

fn analyze_with_state(dir: &tempfile::TempDir, state: &std::path::Path) -> serde_json::Value {
    let mut cmd = cargo_bin_cmd!("scrutinctl");
    cmd.arg("analyze")
        .arg("src")
        .arg("--root")
        .arg(dir.path())
        .arg("--state")
        .arg(state)
        .assert()
        .success();
    serde_json::from_str(&std::fs::read_to_string(state).unwrap()).unwrap()
}

#[test]
fn state_file_keeps_finding_identity_between_runs() {
    let dir = sample_workspace();
    let state = dir.path().join(".scrutin/state.json");

    let first = analyze_with_state(&dir, &state);
    let second = analyze_with_state(&dir, &state);

    assert_eq!(first["findings"].as_array().unwrap().len(), 1);
    assert_eq!(second["findings"].as_array().unwrap().len(), 1);
    assert_eq!(first["findings"][0]["id"], second["findings"][0]["id"]);
    assert_eq!(second["analyzed_files"].as_array().unwrap().len(), 1);
}

#[test]
fn only_findings_introduced_since_last_run_are_marked_new() {
    let dir = sample_workspace();
    std::fs::write(dir.path().join("src/lib.rs"), "pub fn a() {}\n").unwrap();
    let state = dir.path().join(".scrutin/state.json");
    analyze_with_state(&dir, &state);

    std::fs::write(dir.path().join("src/lib.rs"), "// TODO split\npub fn a() {}\n").unwrap();
    let mut cmd = cargo_bin_cmd!("scrutinctl");
    let output = cmd
        .arg("analyze")
        .arg("src")
        .arg("--root")
        .arg(dir.path())
        .arg("--state")
        .arg(&state)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);

    let lib = text.lines().find(|l| l.starts_with("src/lib.rs:1:4")).unwrap();
    let main = text.lines().find(|l| l.starts_with("src/main.rs:2:")).unwrap();
    assert!(lib.contains("[new]"), "{lib}");
    assert!(!main.contains("[new]"), "{main}");
}
