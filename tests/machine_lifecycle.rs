//! Behavioural tests driving a machine through its whole lifecycle against a
//! scripted provider.

#[path = "common/clients.rs"]
mod clients;
#[path = "common/test_constants.rs"]
mod test_constants;

use gce_machines::test_support::{
    RecordingProgress, ScriptedExecutor, TEST_ZONE, json_instance, json_operation,
};
use gce_machines::{ComputeError, MachineError, MachineOptions, MachineSpec, Method, Service};
use serde_json::json;

use clients::{ATTEMPTS, AlwaysReachable, machines};
use test_constants::{MACHINE_NAME, PUBLIC_IP};

fn calls(executor: &ScriptedExecutor) -> Vec<(Service, Method)> {
    executor
        .requests()
        .iter()
        .map(|request| (request.service, request.method))
        .collect()
}

#[tokio::test]
async fn machine_moves_from_absent_to_destroyed() {
    let executor = ScriptedExecutor::new();
    let probe = AlwaysReachable::default();
    let orchestrator = machines(&executor, probe.clone());
    let progress = RecordingProgress::new();
    let options = MachineOptions {
        ssh_username: Some(String::from("deploy")),
        key_name: Some(String::from("agents")),
        ..MachineOptions::default()
    };

    // allocate
    executor.push_json(404, &json!({ "error": { "errors": [{ "message": "not found" }] } }));
    executor.push_json(200, &json_operation("op-insert", "RUNNING"));
    executor.push_json(200, &json_operation("op-insert", "DONE"));
    let spec = orchestrator
        .allocate(&progress, &MachineSpec::new(MACHINE_NAME), &options)
        .await
        .unwrap_or_else(|err| panic!("allocate: {err}"));
    let reference = spec
        .reference
        .clone()
        .unwrap_or_else(|| panic!("allocate should record a reference"));
    assert_eq!(reference.key_name.as_deref(), Some("agents"));

    // ready
    executor.push_json(200, &json_instance(MACHINE_NAME, "STAGING", None));
    executor.push_json(200, &json_instance(MACHINE_NAME, "RUNNING", Some(PUBLIC_IP)));
    executor.push_json(200, &json_instance(MACHINE_NAME, "RUNNING", Some(PUBLIC_IP)));
    let target = orchestrator
        .ready(&progress, &spec, &MachineOptions::default())
        .await
        .unwrap_or_else(|err| panic!("ready: {err}"));
    assert_eq!(target.login(), format!("deploy@{PUBLIC_IP}"));
    assert_eq!(target.key_name.as_deref(), Some("agents"));
    assert_eq!(probe.calls(), 1);

    // stop
    executor.push_json(200, &json_instance(MACHINE_NAME, "RUNNING", Some(PUBLIC_IP)));
    executor.push_json(200, &json_operation("op-stop", "PENDING"));
    executor.push_json(200, &json_instance(MACHINE_NAME, "TERMINATED", None));
    orchestrator
        .stop(&progress, &spec)
        .await
        .unwrap_or_else(|err| panic!("stop: {err}"));

    // destroy on a terminated instance only cleans up
    executor.push_json(200, &json_instance(MACHINE_NAME, "TERMINATED", None));
    orchestrator
        .destroy(&progress, &spec)
        .await
        .unwrap_or_else(|err| panic!("destroy: {err}"));

    assert_eq!(executor.remaining(), 0);
    assert_eq!(
        calls(&executor),
        [
            (Service::Instances, Method::Get),
            (Service::Instances, Method::Insert),
            (Service::ZoneOperations, Method::Get),
            (Service::Instances, Method::Get),
            (Service::Instances, Method::Get),
            (Service::Instances, Method::Get),
            (Service::Instances, Method::Get),
            (Service::Instances, Method::Stop),
            (Service::Instances, Method::Get),
            (Service::Instances, Method::Get),
        ]
    );
    assert_eq!(
        progress.messages().first().map(String::as_str),
        Some(format!("creating instance named {MACHINE_NAME} in zone {TEST_ZONE}").as_str())
    );
}

#[tokio::test]
async fn allocate_surfaces_operation_timeout_as_retryable() {
    let executor = ScriptedExecutor::new();
    executor.push_json(404, &json!({}));
    executor.push_json(200, &json_operation("op-insert", "PENDING"));
    for _ in 0..ATTEMPTS {
        executor.push_json(200, &json_operation("op-insert", "RUNNING"));
    }
    let progress = RecordingProgress::new();

    let err = machines(&executor, AlwaysReachable::default())
        .allocate(
            &progress,
            &MachineSpec::new(MACHINE_NAME),
            &MachineOptions::default(),
        )
        .await
        .expect_err("operation never completes");

    let MachineError::Compute(ComputeError::PollTimeout { attempts, .. }) = &err else {
        panic!("expected a poll timeout, got {err}");
    };
    assert_eq!(*attempts, ATTEMPTS);
    assert!(err.is_retryable());
    assert_eq!(executor.remaining(), 0);
}

#[tokio::test]
async fn provider_errors_are_fatal_and_not_retryable() {
    let executor = ScriptedExecutor::new();
    executor.push_json(
        403,
        &json!({ "error": { "errors": [{ "message": "Required 'compute.instances.get' permission" }] } }),
    );

    let err = machines(&executor, AlwaysReachable::default())
        .stop(&RecordingProgress::new(), &MachineSpec::new(MACHINE_NAME))
        .await
        .expect_err("permission denied");

    assert!(!err.is_retryable());
    assert!(
        err.to_string().contains("compute.instances.get"),
        "error should carry the provider message: {err}"
    );
}
