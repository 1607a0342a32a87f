//! End-to-end tests for the `release-gate` binary.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn release_gate(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_release-gate"))
        .args(args)
        .current_dir(cwd)
        .env_remove("GITHUB_REF_NAME")
        .env_remove("GITHUB_REF")
        .env_remove("RELEASE_GATE_CONFIG")
        .env_remove("GITHUB_REF_TYPE")
        .env_remove("PYPI_API_TOKEN")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run release-gate")
}

fn package(version: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("pyproject.toml"),
        format!("[project]\nname = \"demo\"\nversion = \"{version}\"\n"),
    )
    .unwrap();
    dir
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_check_matching_tag() {
    let pkg = package("1.4.0");
    let out = release_gate(&["check", "--tag", "v1.4.0"], pkg.path());
    assert_eq!(out.status.code(), Some(0));
    assert!(stdout(&out).contains("1.4.0"));
}

#[test]
fn test_check_mismatch_exit_code() {
    let pkg = package("1.4.1");
    let out = release_gate(&["check", "--tag", "v1.4.0"], pkg.path());
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_error_reported_once() {
    let pkg = package("1.4.1");
    let out = release_gate(&["check", "--tag", "v1.4.0"], pkg.path());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert_eq!(stderr.matches("Version mismatch").count(), 1, "stderr: {stderr}");
    assert!(stderr.contains("- ERROR -"));
}

#[test]
fn test_check_ignores_branch_push() {
    let pkg = package("1.4.0");
    let out = Command::new(env!("CARGO_BIN_EXE_release-gate"))
        .arg("check")
        .current_dir(pkg.path())
        .env("GITHUB_REF_TYPE", "branch")
        .env("GITHUB_REF_NAME", "main")
        .env("GITHUB_REF", "refs/heads/main")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn test_check_bare_prefix_is_mismatch() {
    let pkg = package("1.4.0");
    let out = release_gate(&["check", "--tag", "v"], pkg.path());
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_check_reads_github_ref() {
    let pkg = package("1.4.0");
    let out = Command::new(env!("CARGO_BIN_EXE_release-gate"))
        .arg("check")
        .current_dir(pkg.path())
        .env_remove("GITHUB_REF_NAME")
        .env_remove("GITHUB_REF_TYPE")
        .env("GITHUB_REF", "refs/tags/v1.4.0")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn test_check_without_tag_is_usage_error() {
    let pkg = package("1.4.0");
    let out = release_gate(&["check"], pkg.path());
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn test_check_missing_manifest_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = release_gate(&["check", "--tag", "v1.0.0"], dir.path());
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn test_plan_prints_digest() {
    let pkg = package("1.4.0");
    let out = release_gate(&["plan", "--tag", "v1.4.0"], pkg.path());
    assert_eq!(out.status.code(), Some(0));
    let text = stdout(&out);
    assert!(text.contains("Plan digest:"));
    assert!(text.contains("git checkout --quiet --detach v1.4.0"));
}

#[test]
fn test_run_mismatch_never_builds() {
    let pkg = package("2.0.1");
    std::fs::write(
        pkg.path().join("release-gate.toml"),
        r#"
[stages.fetch]
enabled = false

[stages.build]
command = ["sh", "-c", "touch built-marker"]
"#,
    )
    .unwrap();
    let report = pkg.path().join("report.json");

    let out = release_gate(
        &["run", "--tag", "v2.0.0", "--report", report.to_str().unwrap()],
        pkg.path(),
    );

    assert_eq!(out.status.code(), Some(2));
    assert!(!pkg.path().join("built-marker").exists());

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(value["final_state"]["state"], "VERSION_MISMATCH");
}

#[test]
fn test_run_missing_credential_fails_publish() {
    let pkg = package("2.0.0");
    std::fs::write(
        pkg.path().join("release-gate.toml"),
        r#"
[stages.fetch]
enabled = false

[stages.install_deps]
enabled = false

[stages.build]
command = ["sh", "-c", "mkdir -p dist && touch dist/demo-{version}.tar.gz"]

[stages.validate]
command = ["true"]

[stages.publish]
command = ["sh", "-c", "touch uploaded-marker"]
"#,
    )
    .unwrap();

    let out = release_gate(&["run", "--tag", "v2.0.0"], pkg.path());

    assert_eq!(out.status.code(), Some(1));
    assert!(!pkg.path().join("uploaded-marker").exists());
    assert!(stdout(&out).contains("FAILED(publish)"));
}

#[test]
fn test_run_invalid_config_is_usage_error() {
    let pkg = package("2.0.0");
    std::fs::write(
        pkg.path().join("release-gate.toml"),
        "[stages.publish]\nenabled = false\n",
    )
    .unwrap();

    let out = release_gate(&["run", "--tag", "v2.0.0"], pkg.path());
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn test_log_dir_is_created() {
    let pkg = package("1.0.0");
    let logs = pkg.path().join("logs");
    let out = release_gate(
        &["--log-dir", logs.to_str().unwrap(), "check", "--tag", "v1.0.0"],
        pkg.path(),
    );
    assert_eq!(out.status.code(), Some(0));
    let entries: Vec<_> = std::fs::read_dir(&logs).unwrap().collect();
    assert_eq!(entries.len(), 1);
}
