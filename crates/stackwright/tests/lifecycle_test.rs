mod common;

use common::{RESOURCES, TestProject};
use predicates::prelude::*;
use serde_json::Value;

fn initialized(config: &str) -> TestProject {
    let project = TestProject::new();
    project.write_config(config);
    project
        .cmd()
        .args(["init", "--name", "orders_service"])
        .assert()
        .success();
    project
}

#[test]
fn test_build_deploy_update_clean() {
    let project = initialized("region: eu-west-1\n");
    project.write_resources("services/worker", RESOURCES);

    project
        .cmd()
        .args(["build", "--bundle", "b1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 resources"));

    let meta: Value = serde_json::from_str(
        &std::fs::read_to_string(project.file(".stackwright/bundles/b1/build_meta.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(meta["worker"]["runtime"], "python3.12");

    project
        .cmd()
        .arg("deploy")
        .assert()
        .success()
        .stdout(predicate::str::contains("orders-service"))
        .stdout(predicate::str::contains("succeeded"));
    assert!(project.file(".stackwright/outputs/orders-service.json").exists());

    project
        .cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Project: orders_service"))
        .stdout(predicate::str::contains("deploy_name=orders-service"))
        .stdout(predicate::str::contains("bundle_name=b1"));

    project
        .cmd()
        .arg("update")
        .assert()
        .success()
        .stdout(predicate::str::contains("succeeded"));

    project
        .cmd()
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("succeeded"));
    assert!(!project.file(".stackwright/outputs/orders-service.json").exists());

    let state: Value = serde_yaml::from_str(
        &std::fs::read_to_string(project.file(".stackwright/state.yaml")).unwrap(),
    )
    .unwrap();
    assert_eq!(state["lambdas"]["worker"]["runtime"], "python3.12");
    assert_eq!(state["build_projects_mapping"]["python"], "src");
    assert_eq!(state["locks"]["modification_lock"]["locked"], false);
    assert_eq!(state["events"][0]["operation"], "clean");
}

#[test]
fn test_build_applies_name_prefix() {
    let project = initialized("region: eu-west-1\nresources_prefix: dev-\n");
    project.write_resources(".", RESOURCES);

    project
        .cmd()
        .args(["build", "--bundle", "prefixed"])
        .assert()
        .success();

    let meta: Value = serde_json::from_str(
        &std::fs::read_to_string(project.file(".stackwright/bundles/prefixed/build_meta.json"))
            .unwrap(),
    )
    .unwrap();
    assert_eq!(meta["dev-worker"]["iam_role_name"], "dev-exec");
    assert_eq!(
        meta["dev-worker"]["event_sources"][0]["target_queue"],
        "dev-jobs"
    );
    assert!(meta.get("worker").is_none());
}

#[test]
fn test_duplicate_resource_names_fail_build() {
    let project = initialized("region: eu-west-1\n");
    project.write_resources("a", RESOURCES);
    project.write_resources("b", RESOURCES);

    project
        .cmd()
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("declared in both"));
}

#[test]
fn test_failed_deploy_blocks_redeploy() {
    let project = initialized("region: eu-west-1\nretry:\n  count: 0\n");
    project.write_resources(
        ".",
        r#"{
          "worker": {
            "resource_type": "lambda",
            "iam_role_name": "missing",
            "runtime": "python3.12"
          }
        }"#,
    );
    project
        .cmd()
        .args(["build", "--bundle", "broken"])
        .assert()
        .success();

    project
        .cmd()
        .arg("deploy")
        .assert()
        .failure()
        .stdout(predicate::str::contains("cannot be assumed"))
        .stderr(predicate::str::contains("1 failed resources"));

    project
        .cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("failed"));

    project
        .cmd()
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("continue the deployment explicitly"));

    // The lock was released by the failed run
    project
        .cmd()
        .arg("unlock")
        .assert()
        .success()
        .stdout(predicate::str::contains("already free"));
}

#[test]
fn test_redeploy_needs_replace_output() {
    let project = initialized("region: eu-west-1\n");
    project.write_resources(".", RESOURCES);
    project.cmd().args(["build", "--bundle", "b1"]).assert().success();

    project
        .cmd()
        .args(["deploy", "--only-type", "iam_role", "--only-resource", "jobs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("succeeded: 2 resources"));

    project
        .cmd()
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already has outputs"));

    project
        .cmd()
        .args(["deploy", "--replace-output", "--exclude-type", "iam_role"])
        .assert()
        .success()
        .stdout(predicate::str::contains("succeeded: 2 resources"));

    let output: Value = serde_json::from_str(
        &std::fs::read_to_string(project.file(".stackwright/outputs/orders-service.json"))
            .unwrap(),
    )
    .unwrap();
    assert_eq!(output["resources"].as_object().unwrap().len(), 2);

    project
        .cmd()
        .args(["clean", "--exclude-resource", "worker"])
        .assert()
        .success();
    assert!(project.file(".stackwright/outputs/orders-service.json").exists());
}

#[test]
fn test_unknown_filter_type_is_rejected() {
    let project = initialized("region: eu-west-1\n");
    project
        .cmd()
        .args(["deploy", "--only-type", "mainframe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mainframe"));
}

#[test]
fn test_transform_writes_template() {
    let project = initialized("region: eu-west-1\naccount_id: \"123456789012\"\n");
    project.write_resources(".", RESOURCES);
    project
        .cmd()
        .args(["build", "--bundle", "b1"])
        .assert()
        .success();

    project
        .cmd()
        .args(["transform", "--format", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cloudformation_template.yaml"));

    let template: Value = serde_yaml::from_str(
        &std::fs::read_to_string(
            project.file(".stackwright/bundles/b1/cloudformation_template.yaml"),
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
    assert_eq!(
        template["Resources"]["LambdaFunctionWorker"]["Type"],
        "AWS::Lambda::Function"
    );
    assert_eq!(
        template["Resources"]["LambdaFunctionWorker"]["Properties"]["Role"],
        serde_json::json!({"Fn::GetAtt": ["IAMRoleExec", "Arn"]})
    );
}

#[test]
fn test_sync_pushes_then_reconciles() {
    let project = initialized("region: eu-west-1\nremote_state_path: shared/state.yaml\n");

    project
        .cmd()
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Remote state created"));
    assert!(project.file("shared/state.yaml").exists());

    project
        .cmd()
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("reconciled"));
}
