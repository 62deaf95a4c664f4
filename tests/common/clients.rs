//! Client stacks wired to a scripted executor.

#![expect(dead_code, reason = "each test binary uses a different subset")]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use gce_machines::machine::ProbeFuture;
use gce_machines::test_support::{ScriptedExecutor, TEST_PROJECT, TEST_ZONE, instant_policy};
use gce_machines::{
    ChangePolicy, ConnectionTarget, DriverUrl, InstanceRegistry, KeyPairReconciler,
    MachineOrchestrator, NoopCleanup, OperationTracker, ProjectMetadataStore, TransportProbe,
};

/// Attempts allowed to every wait in the scripted scenarios.
pub const ATTEMPTS: u32 = 4;

/// Probe that reports every target as reachable and counts calls.
#[derive(Clone, Debug, Default)]
pub struct AlwaysReachable {
    calls: Arc<AtomicU32>,
}

impl AlwaysReachable {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TransportProbe for AlwaysReachable {
    fn available<'a>(&'a self, _target: &'a ConnectionTarget) -> ProbeFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { true })
    }
}

pub fn driver_url() -> DriverUrl {
    DriverUrl::new(TEST_ZONE, TEST_PROJECT)
}

pub fn machines(
    executor: &ScriptedExecutor,
    probe: AlwaysReachable,
) -> MachineOrchestrator<ScriptedExecutor, AlwaysReachable, NoopCleanup> {
    let gateway = executor.gateway();
    MachineOrchestrator::new(
        InstanceRegistry::new(gateway.clone(), instant_policy(ATTEMPTS)),
        OperationTracker::new(gateway, instant_policy(ATTEMPTS)),
        driver_url(),
    )
    .with_probe(probe)
}

pub fn key_pairs(
    executor: &ScriptedExecutor,
    policy: ChangePolicy,
) -> KeyPairReconciler<ScriptedExecutor> {
    let gateway = executor.gateway();
    KeyPairReconciler::new(
        ProjectMetadataStore::new(gateway.clone(), policy),
        OperationTracker::new(gateway, instant_policy(ATTEMPTS)),
        "ubuntu",
    )
}
