//! Unit tests for the instance registry and instance snapshots.

use super::*;
use crate::test_support::{
    RecordingProgress, ScriptedExecutor, TEST_ZONE, instant_policy, json_instance, json_operation,
};
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn executor() -> ScriptedExecutor {
    ScriptedExecutor::new()
}

fn registry(executor: &ScriptedExecutor) -> InstanceRegistry<ScriptedExecutor> {
    InstanceRegistry::new(executor.gateway(), instant_policy(3))
}

#[rstest]
#[tokio::test]
async fn get_decodes_running_instance(executor: ScriptedExecutor) {
    executor.push_json(200, &json_instance("instance_name", "RUNNING", Some("ip")));

    let instance = registry(&executor)
        .get("instance_name")
        .await
        .unwrap_or_else(|err| panic!("get: {err}"))
        .unwrap_or_else(|| panic!("instance should exist"));

    assert_eq!(instance.name(), "instance_name");
    assert!(instance.running());
    assert_eq!(instance.determine_remote_host().ok(), Some("ip"));
    let requests = executor.requests();
    let [request] = requests.as_slice() else {
        panic!("expected one request, got {requests:?}");
    };
    assert_eq!(request.service, Service::Instances);
    assert_eq!(
        request.parameters.get("instance").map(String::as_str),
        Some("instance_name")
    );
}

#[rstest]
#[tokio::test]
async fn get_returns_none_for_404(executor: ScriptedExecutor) {
    executor.push_json(404, &json!({ "error": { "message": "not found" } }));
    let found = registry(&executor)
        .get("ghost")
        .await
        .unwrap_or_else(|err| panic!("404 is not an error: {err}"));
    assert!(found.is_none());
}

#[rstest]
#[case(403, json!({ "error": { "message": "forbidden" } }))]
#[case(500, json!({}))]
#[case(200, json!({ "name": "vm", "error": { "errors": [{ "message": "broken" }] } }))]
#[tokio::test]
async fn get_raises_for_other_failures(
    executor: ScriptedExecutor,
    #[case] status: u16,
    #[case] body: serde_json::Value,
) {
    executor.push_json(status, &body);
    let err = registry(&executor)
        .get("vm")
        .await
        .expect_err("non-404 failures raise");
    assert!(matches!(err, ComputeError::Api { .. }));
}

#[rstest]
#[tokio::test]
async fn create_returns_zone_operation(executor: ScriptedExecutor) {
    executor.push_json(200, &json_operation("op-create", "PENDING"));
    let registry = registry(&executor);
    let options = registry.default_create_options("vm", &CreateTemplate::default());

    let operation = registry
        .create(&options)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(operation.name(), "op-create");
    assert_eq!(operation.scope(), OperationScope::Zone);
    let requests = executor.requests();
    let [request] = requests.as_slice() else {
        panic!("expected one request, got {requests:?}");
    };
    assert_eq!(request.method, Method::Insert);
    assert_eq!(request.body.as_ref(), Some(&options));
}

#[rstest]
#[case(Method::Delete)]
#[case(Method::Start)]
#[case(Method::Stop)]
#[tokio::test]
async fn power_calls_short_circuit_on_404(executor: ScriptedExecutor, #[case] method: Method) {
    executor.push_json(404, &json!({}));
    let registry = registry(&executor);

    let outcome = match method {
        Method::Delete => registry.delete("vm").await,
        Method::Start => registry.start("vm").await,
        _ => registry.stop("vm").await,
    }
    .unwrap_or_else(|err| panic!("404 is not an error: {err}"));

    assert!(outcome.is_none());
    assert_eq!(
        executor.requests().first().map(|request| request.method),
        Some(method)
    );
}

#[rstest]
#[tokio::test]
async fn stop_returns_operation(executor: ScriptedExecutor) {
    executor.push_json(200, &json_operation("op-stop", "RUNNING"));
    let operation = registry(&executor)
        .stop("vm")
        .await
        .unwrap_or_else(|err| panic!("stop: {err}"))
        .unwrap_or_else(|| panic!("operation expected"));
    assert_eq!(operation.name(), "op-stop");
}

#[rstest]
#[tokio::test]
async fn wait_for_status_tolerates_absence_and_lag(executor: ScriptedExecutor) {
    executor.push_json(404, &json!({}));
    executor.push_json(200, &json_instance("vm", "STOPPING", None));
    executor.push_json(200, &json_instance("vm", "TERMINATED", None));
    let progress = RecordingProgress::new();
    let snapshot = Instance::from_value(&json_instance("vm", "RUNNING", None))
        .unwrap_or_else(|err| panic!("decode: {err}"));

    let reached = registry(&executor)
        .wait_for_status(&progress, &snapshot, &InstanceStatus::Terminated)
        .await
        .unwrap_or_else(|err| panic!("wait: {err}"));

    assert!(reached.terminated());
    assert_eq!(progress.messages().len(), 2);
}

#[rstest]
#[tokio::test]
async fn wait_for_status_times_out(executor: ScriptedExecutor) {
    for _ in 0..3 {
        executor.push_json(200, &json_instance("vm", "STAGING", None));
    }
    let snapshot = Instance::from_value(&json_instance("vm", "PROVISIONING", None))
        .unwrap_or_else(|err| panic!("decode: {err}"));

    let err = registry(&executor)
        .wait_for_status(&RecordingProgress::new(), &snapshot, &InstanceStatus::Running)
        .await
        .expect_err("never reaches RUNNING");
    assert!(
        matches!(err, ComputeError::PollTimeout { ref subject, .. } if subject == "instance vm to become RUNNING")
    );
}

#[test]
fn determine_remote_host_scans_interfaces_in_order() {
    let value = json!({
        "name": "vm",
        "id": 1234,
        "status": "RUNNING",
        "networkInterfaces": [
            { "name": "nic0", "networkIP": "10.0.0.2", "accessConfigs": [{ "name": "none" }] },
            { "name": "nic1", "accessConfigs": [{ "natIP": "203.0.113.5" }, { "natIP": "203.0.113.6" }] },
        ],
    });
    let instance = Instance::from_value(&value).unwrap_or_else(|err| panic!("decode: {err}"));

    assert_eq!(instance.id(), "1234");
    assert_eq!(instance.determine_remote_host().ok(), Some("203.0.113.5"));
}

#[test]
fn determine_remote_host_rejects_private_only_instances() {
    let instance = Instance::from_value(&json_instance("vm", "RUNNING", None))
        .unwrap_or_else(|err| panic!("decode: {err}"));
    assert_eq!(
        instance.determine_remote_host(),
        Err(ComputeError::NoPublicAddress {
            instance: String::from("vm"),
        })
    );
}

#[rstest]
#[case("RUNNING", InstanceStatus::Running)]
#[case("TERMINATED", InstanceStatus::Terminated)]
#[case("REPAIRING", InstanceStatus::Other(String::from("REPAIRING")))]
fn status_round_trips_provider_spelling(#[case] raw: &str, #[case] status: InstanceStatus) {
    assert_eq!(InstanceStatus::parse(raw), status);
    assert_eq!(status.as_str(), raw);
}

#[test]
fn default_create_options_follow_minimal_template() {
    let options = default_create_options(
        TEST_ZONE,
        "vm",
        &CreateTemplate {
            machine_type: String::from("e2-small"),
            source_image: String::from("projects/debian-cloud/global/images/family/debian-12"),
        },
    );

    assert_eq!(
        options.pointer("/machineType").and_then(serde_json::Value::as_str),
        Some("zones/europe-west1-b/machineTypes/e2-small")
    );
    assert_eq!(
        options
            .pointer("/disks/0/initializeParams/sourceImage")
            .and_then(serde_json::Value::as_str),
        Some("projects/debian-cloud/global/images/family/debian-12")
    );
    assert_eq!(
        options
            .pointer("/networkInterfaces/0/accessConfigs/0/type")
            .and_then(serde_json::Value::as_str),
        Some("ONE_TO_ONE_NAT")
    );
}

#[test]
fn merge_options_recurses_through_objects_only() {
    let base = json!({
        "machineType": "zones/z/machineTypes/f1-micro",
        "scheduling": { "preemptible": false, "automaticRestart": true },
        "disks": [{ "boot": true }],
    });
    let overrides = json!({
        "scheduling": { "preemptible": true },
        "disks": [{ "boot": true, "diskSizeGb": "20" }],
        "labels": { "team": "infra" },
        "machineType": null,
    });

    assert_eq!(
        merge_options(base, &overrides),
        json!({
            "machineType": "zones/z/machineTypes/f1-micro",
            "scheduling": { "preemptible": true, "automaticRestart": true },
            "disks": [{ "boot": true, "diskSizeGb": "20" }],
            "labels": { "team": "infra" },
        })
    );
}
