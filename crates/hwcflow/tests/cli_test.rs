use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const PROVIDER: &str = r#"
provider:
  region: cn-north-4
  auth_token: token
  project_id: p1
"#;

fn project(resources: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let resources = if resources.is_empty() { " []" } else { resources };
    fs::write(
        dir.path().join("hwcflow.yaml"),
        format!("{}\nresources:{}", PROVIDER, resources),
    )
    .unwrap();
    dir
}

fn hwc(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("hwc").unwrap();
    cmd.current_dir(dir.path()).env_remove("HWCFLOW_MANIFEST");
    cmd
}

const BANDWIDTH_POLICY: &str = r#"
  - type: huaweicloud_as_bandwidth_policy
    name: scale_up
    config:
      scaling_policy_name: scale-up
      scaling_policy_type: ALARM
      bandwidth_id: bw-1
      alarm_id: al-1
    timeouts:
      update: 5m
"#;

#[test]
fn test_version() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("hwc").unwrap();
    cmd.current_dir(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hwcflow"));
}

#[test]
fn test_validate_accepts_manifest() {
    let dir = project(BANDWIDTH_POLICY);
    hwc(&dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("huaweicloud_as_bandwidth_policy.scale_up"));
}

#[test]
fn test_validate_reports_schema_errors() {
    let dir = project(
        r#"
  - type: huaweicloud_drs_job
    name: sync
    config:
      name: "1bad"
      type: migration
"#,
    );
    hwc(&dir)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("huaweicloud_drs_job.sync"));
}

#[test]
fn test_validate_rejects_unknown_type() {
    let dir = project(
        r#"
  - type: huaweicloud_vpc
    name: main
"#,
    );
    hwc(&dir)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported resource type"));
}

#[test]
fn test_plan_on_empty_state() {
    let dir = project(BANDWIDTH_POLICY);
    hwc(&dir)
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("+ huaweicloud_as_bandwidth_policy.scale_up"))
        .stdout(predicate::str::contains("1 to create"));
}

#[test]
fn test_apply_requires_confirmation() {
    let dir = project(BANDWIDTH_POLICY);
    hwc(&dir)
        .arg("apply")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));
    assert!(!dir.path().join(".hwcflow").join("state.json").exists());
}

#[test]
fn test_state_and_destroy_with_empty_state() {
    let dir = project(BANDWIDTH_POLICY);
    hwc(&dir)
        .arg("state")
        .assert()
        .success()
        .stdout(predicate::str::contains("No resources in state"));
    hwc(&dir)
        .args(["destroy", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to destroy"));
}

#[test]
fn test_manifest_flag() {
    let dir = project(BANDWIDTH_POLICY);
    fs::create_dir(dir.path().join("infra")).unwrap();
    fs::rename(
        dir.path().join("hwcflow.yaml"),
        dir.path().join("infra").join("prod.yaml"),
    )
    .unwrap();

    hwc(&dir)
        .args(["plan", "-f", "infra/prod.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 to create"));
    hwc(&dir).arg("plan").assert().failure();
}

#[test]
fn test_sweep_lists_sweepers_without_confirmation() {
    let dir = project("");
    hwc(&dir)
        .args(["sweep", "-s", "huaweicloud_drs_job"])
        .assert()
        .success()
        .stdout(predicate::str::contains("huaweicloud_drs_job"))
        .stdout(predicate::str::contains("cn-north-4"));
}

#[test]
fn test_sweep_rejects_unknown_sweeper() {
    let dir = project("");
    hwc(&dir)
        .args(["sweep", "-s", "huaweicloud_vpc", "--yes"])
        .assert()
        .failure();
}
