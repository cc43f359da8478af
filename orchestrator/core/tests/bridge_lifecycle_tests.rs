// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end lifecycle scenarios against the in-memory stack: create, settle,
//! stop, resume, delete, tenancy, usage and job retry.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bridge_core::application::bridge_service::{BridgeService, CreateBridgeRequest};
use bridge_core::application::job_runner::JobRunner;
use bridge_core::application::provisioning::{BridgeJobExecutor, DnsSettings};
use bridge_core::domain::bridge::{escape_key, AccountId, BridgeId, BridgeStatus, NewBridge};
use bridge_core::domain::dns::DnsRecord;
use bridge_core::domain::error::BridgeError;
use bridge_core::domain::events::BridgeEvent;
use bridge_core::domain::job::{JobKind, JobStatus};
use bridge_core::domain::repository::BridgeRepository;
use bridge_core::domain::ssh_key::SshKeypair;
use common::{caller, test_policy, TestStack, FINGERPRINT, NAMESPACE_PARENT, ZONE_ID};

fn request(name: &str) -> CreateBridgeRequest {
    CreateBridgeRequest {
        name: name.to_string(),
        directory_map: "*:/stor/*".to_string(),
    }
}

#[tokio::test]
async fn test_create_settle_and_delete_scenario() {
    let stack = TestStack::start();
    let alice = caller("alice");

    let created = stack
        .bridge_service
        .create_bridge(&alice, request("foo"))
        .await
        .unwrap();

    assert_eq!(created.bridge_id.to_string().len(), 36);
    assert_eq!(created.status, BridgeStatus::Starting);
    assert_eq!(created.namespace, format!("foo.{}", NAMESPACE_PARENT));
    assert_eq!(created.directory_map, "*:/stor/*");
    assert!(created.ssh_key_id.contains(FINGERPRINT));
    assert_eq!(created.ssh_key_id, format!("/alice-login/keys/{}", FINGERPRINT));
    assert!(created.container1_id.is_none());
    assert!(created.container2_id.is_none());

    let running = stack
        .wait_for_status(created.bridge_id, &alice.account_id, BridgeStatus::Running)
        .await;
    assert!(running.container1_id.is_some());
    assert!(running.container2_id.is_some());
    assert_eq!(stack.dns.a_records(&running.namespace), vec!["10.0.0.1", "10.0.0.2"]);

    let removing = stack
        .bridge_service
        .delete_bridge(created.bridge_id, &alice.account_id)
        .await
        .unwrap();
    assert_eq!(removing.status, BridgeStatus::Removing);
    assert_eq!(stack.key_issuer.deleted.lock().clone(), vec!["foo-bridge".to_string()]);
    assert!(stack.dns.a_records(&running.namespace).is_empty());

    let again = stack
        .bridge_service
        .delete_bridge(created.bridge_id, &alice.account_id)
        .await;
    assert!(matches!(again, Err(BridgeError::Conflict(_)) | Err(BridgeError::NotFound(_))));

    stack.wait_until_removed(created.bridge_id, &alice.account_id).await;
    assert!(stack.runtime.running.lock().is_empty());
    assert_eq!(stack.runtime.count("delete"), 1);
}

#[tokio::test]
async fn test_create_rejects_invalid_and_duplicate_names() {
    let stack = TestStack::start();

    let invalid = stack
        .bridge_service
        .create_bridge(&caller("alice"), request("Foo_Bar"))
        .await;
    assert!(matches!(invalid, Err(BridgeError::Validation(_))));

    stack
        .bridge_service
        .create_bridge(&caller("alice"), request("shared"))
        .await
        .unwrap();
    let duplicate = stack
        .bridge_service
        .create_bridge(&caller("bob"), request("shared"))
        .await;
    assert!(matches!(duplicate, Err(BridgeError::Conflict(_))));
    assert_eq!(stack.key_issuer.created.lock().len(), 1);
}

#[tokio::test]
async fn test_missing_fingerprint_aborts_create() {
    let stack = TestStack::start();
    stack.key_issuer.omit_fingerprint.store(true, Ordering::SeqCst);
    let alice = caller("alice");

    let result = stack.bridge_service.create_bridge(&alice, request("foo")).await;
    assert!(matches!(result, Err(BridgeError::Internal(_))));
    assert!(stack
        .bridge_service
        .list_bridges(&alice.account_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_bridges_are_account_scoped() {
    let stack = TestStack::start();
    let alice = caller("alice");
    let bob = caller("bob");

    let a = stack.bridge_service.create_bridge(&alice, request("a")).await.unwrap();
    let b = stack.bridge_service.create_bridge(&alice, request("b")).await.unwrap();

    let mut names: Vec<String> = stack
        .bridge_service
        .list_bridges(&alice.account_id)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);

    assert!(stack.bridge_service.list_bridges(&bob.account_id).await.unwrap().is_empty());
    assert!(stack
        .bridge_service
        .get_bridge(a.bridge_id, &bob.account_id)
        .await
        .unwrap()
        .is_none());
    assert!(stack
        .bridge_service
        .get_bridge_by_name("b", &bob.account_id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        stack
            .bridge_service
            .get_bridge_by_name("b", &alice.account_id)
            .await
            .unwrap()
            .map(|found| found.bridge_id),
        Some(b.bridge_id)
    );

    let foreign_delete = stack.bridge_service.delete_bridge(a.bridge_id, &bob.account_id).await;
    assert!(matches!(foreign_delete, Err(BridgeError::NotFound(_))));
}

#[tokio::test]
async fn test_stop_then_resume_reaches_running() {
    let stack = TestStack::start();
    let alice = caller("alice");
    let bridge = stack.bridge_service.create_bridge(&alice, request("foo")).await.unwrap();
    stack
        .wait_for_status(bridge.bridge_id, &alice.account_id, BridgeStatus::Running)
        .await;

    let stopping = stack
        .bridge_service
        .stop_bridge(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap();
    assert_eq!(stopping.status, BridgeStatus::Stopping);
    stack
        .wait_for_status(bridge.bridge_id, &alice.account_id, BridgeStatus::Stopped)
        .await;

    let stop_again = stack.bridge_service.stop_bridge(bridge.bridge_id, &alice.account_id).await;
    assert!(matches!(stop_again, Err(BridgeError::Conflict(_))));

    let starting = stack
        .bridge_service
        .resume_bridge(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap();
    assert_eq!(starting.status, BridgeStatus::Starting);
    stack
        .wait_for_status(bridge.bridge_id, &alice.account_id, BridgeStatus::Running)
        .await;

    assert_eq!(stack.runtime.count("create"), 1);
    assert_eq!(stack.runtime.count("stop"), 1);
    assert_eq!(stack.runtime.count("resume"), 1);
    // Re-running DNS after resume adds nothing for unchanged addresses.
    assert_eq!(stack.dns.a_records(&bridge.namespace).len(), 2);

    let resume_running = stack
        .bridge_service
        .resume_bridge(bridge.bridge_id, &alice.account_id)
        .await;
    assert!(matches!(resume_running, Err(BridgeError::Conflict(_))));
}

#[tokio::test]
async fn test_transitions_are_rejected_while_removing() {
    let stack = TestStack::unstarted();
    let alice = caller("alice");
    let bridge = stack.bridge_service.create_bridge(&alice, request("foo")).await.unwrap();
    stack
        .bridge_service
        .delete_bridge(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap();

    for result in [
        stack.bridge_service.stop_bridge(bridge.bridge_id, &alice.account_id).await,
        stack.bridge_service.resume_bridge(bridge.bridge_id, &alice.account_id).await,
        stack.bridge_service.delete_bridge(bridge.bridge_id, &alice.account_id).await,
    ] {
        assert!(matches!(result, Err(BridgeError::Conflict(_))));
    }
}

#[tokio::test]
async fn test_stop_during_provisioning_wins() {
    let stack = TestStack::start();
    let alice = caller("alice");
    let bridge = stack.bridge_service.create_bridge(&alice, request("foo")).await.unwrap();

    stack
        .bridge_service
        .stop_bridge(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap();

    stack
        .wait_for_status(bridge.bridge_id, &alice.account_id, BridgeStatus::Stopped)
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = stack
        .bridge_service
        .get_bridge(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.status, BridgeStatus::Stopped);

    let jobs = stack
        .bridge_service
        .list_bridge_jobs(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap();
    let kinds: Vec<JobKind> = jobs.iter().map(|j| j.kind).collect();
    assert_eq!(kinds, vec![JobKind::Provision, JobKind::Stop]);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Succeeded));
}

#[tokio::test]
async fn test_delete_during_provisioning_cleans_up_dns_and_containers() {
    let stack = TestStack::start();
    stack.runtime.slow_creates(Duration::from_millis(200));
    let alice = caller("alice");
    let bridge = stack.bridge_service.create_bridge(&alice, request("foo")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let removing = stack
        .bridge_service
        .delete_bridge(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap();
    assert_eq!(removing.status, BridgeStatus::Removing);

    stack.wait_until_removed(bridge.bridge_id, &alice.account_id).await;
    assert_eq!(stack.runtime.count("create"), 1);
    assert_eq!(stack.runtime.count("delete"), 1);
    assert!(stack.runtime.running.lock().is_empty());
    assert!(stack.dns.a_records(&bridge.namespace).is_empty());
}

#[tokio::test]
async fn test_teardown_sweeps_records_left_under_the_namespace() {
    let stack = TestStack::unstarted();
    let alice = caller("alice");
    let bridge = stack.bridge_service.create_bridge(&alice, request("foo")).await.unwrap();
    stack
        .bridge_service
        .delete_bridge(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap();

    // Lands after the synchronous cleanup, before the teardown job runs.
    stack.dns.records.lock().push(DnsRecord {
        id: "stray".to_string(),
        record_type: "A".to_string(),
        name: bridge.namespace.clone(),
        content: "10.0.0.9".to_string(),
    });
    stack.runner.start();

    stack.wait_until_removed(bridge.bridge_id, &alice.account_id).await;
    assert!(stack.dns.a_records(&bridge.namespace).is_empty());
    assert_eq!(stack.runtime.count("create"), 0);
}

#[tokio::test]
async fn test_concurrent_creates_with_one_name_admit_one_bridge() {
    let stack = TestStack::start();
    stack.key_issuer.slow_creates(Duration::from_millis(20));
    let alice = caller("alice");
    let bob = caller("bob");

    let (first, second) = tokio::join!(
        stack.bridge_service.create_bridge(&alice, request("shared")),
        stack.bridge_service.create_bridge(&bob, request("shared")),
    );

    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let conflicts = [&first, &second]
        .iter()
        .filter(|r| matches!(r, Err(BridgeError::Conflict(_))))
        .count();
    assert_eq!(conflicts, 1);

    let mut live = stack.bridge_service.list_bridges(&alice.account_id).await.unwrap();
    live.extend(stack.bridge_service.list_bridges(&bob.account_id).await.unwrap());
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].name, "shared");
    assert!(stack.key_issuer.deleted.lock().is_empty());
}

#[tokio::test]
async fn test_retry_recreates_a_missing_provision_job() {
    let stack = TestStack::start();
    let alice = caller("alice");
    let keypair = SshKeypair::generate("foo-bridge");
    let new_bridge = NewBridge {
        bridge_id: BridgeId::new(),
        account_id: alice.account_id.clone(),
        username: alice.username.clone(),
        name: "foo".to_string(),
        namespace: format!("foo.{}", NAMESPACE_PARENT),
        ssh_key_name: "foo-bridge".to_string(),
        ssh_key_id: format!("/alice-login/keys/{}", FINGERPRINT),
        ssh_key: escape_key(&keypair.private_key),
        directory_map: "*:/stor/*".to_string(),
    };
    // A row whose job was never recorded, as left by a failed submit.
    stack.bridges.insert_bridge(&new_bridge).await.unwrap();

    let job = stack
        .bridge_service
        .retry_bridge(new_bridge.bridge_id, &alice.account_id)
        .await
        .unwrap();
    assert_eq!(job.kind, JobKind::Provision);

    let running = stack
        .wait_for_status(new_bridge.bridge_id, &alice.account_id, BridgeStatus::Running)
        .await;
    assert_eq!(stack.dns.a_records(&running.namespace), vec!["10.0.0.1", "10.0.0.2"]);

    let settled = stack.bridge_service.retry_bridge(new_bridge.bridge_id, &alice.account_id).await;
    assert!(matches!(settled, Err(BridgeError::Conflict(_))));
}

#[tokio::test]
async fn test_usage_interval_follows_running_state() {
    let stack = TestStack::start();
    let alice = caller("alice");
    let bridge = stack.bridge_service.create_bridge(&alice, request("foo")).await.unwrap();
    stack
        .wait_for_status(bridge.bridge_id, &alice.account_id, BridgeStatus::Running)
        .await;

    let usage = stack.bridge_service.list_usage(&alice.account_id).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert!(usage[0].is_open());
    let started = usage[0].started;

    stack
        .bridge_service
        .stop_bridge(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap();
    stack
        .wait_for_status(bridge.bridge_id, &alice.account_id, BridgeStatus::Stopped)
        .await;

    let usage = stack.bridge_service.list_usage(&alice.account_id).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert!(!usage[0].is_open());
    assert_eq!(usage[0].started, started);
    assert!(stack
        .bridge_service
        .list_usage(&AccountId::new("bob"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_failed_provisioning_is_retryable() {
    let stack = TestStack::start();
    let mut events = stack.event_bus.subscribe();
    stack.runtime.fail_creates(2);
    let alice = caller("alice");

    let bridge = stack.bridge_service.create_bridge(&alice, request("foo")).await.unwrap();
    stack.wait_for_failed_job(bridge.bridge_id, &alice.account_id).await;

    let stuck = stack
        .bridge_service
        .get_bridge(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stuck.status, BridgeStatus::Starting);
    assert!(stuck.container1_id.is_none());

    let jobs = stack
        .bridge_service
        .list_bridge_jobs(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].attempts, 2);
    assert!(jobs[0].last_error.as_deref().unwrap().contains("docker-create"));

    let failed_event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(BridgeEvent::JobFailed { tag, attempts, .. }) = events.recv().await {
                return (tag, attempts);
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(failed_event, ("docker-create".to_string(), 2));

    let retried = stack
        .bridge_service
        .retry_bridge(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap();
    assert_eq!(retried.id, jobs[0].id);
    assert_eq!(retried.status, JobStatus::Pending);

    stack
        .wait_for_status(bridge.bridge_id, &alice.account_id, BridgeStatus::Running)
        .await;
    assert_eq!(stack.runtime.count("create"), 3);
}

#[tokio::test]
async fn test_retry_after_dns_failure_reuses_containers() {
    let stack = TestStack::start();
    stack.dns.fail_adds.store(true, Ordering::SeqCst);
    let alice = caller("alice");

    let bridge = stack.bridge_service.create_bridge(&alice, request("foo")).await.unwrap();
    stack.wait_for_failed_job(bridge.bridge_id, &alice.account_id).await;

    let stuck = stack
        .bridge_service
        .get_bridge(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stuck.status, BridgeStatus::Starting);
    assert!(stuck.containers().is_some());

    stack.dns.fail_adds.store(false, Ordering::SeqCst);
    stack
        .bridge_service
        .retry_bridge(bridge.bridge_id, &alice.account_id)
        .await
        .unwrap();
    stack
        .wait_for_status(bridge.bridge_id, &alice.account_id, BridgeStatus::Running)
        .await;

    assert_eq!(stack.runtime.count("create"), 1);
    assert_eq!(stack.dns.a_records(&bridge.namespace).len(), 2);
}

#[tokio::test]
async fn test_retry_requires_a_failed_job() {
    let stack = TestStack::start();
    let alice = caller("alice");
    let bridge = stack.bridge_service.create_bridge(&alice, request("foo")).await.unwrap();
    stack
        .wait_for_status(bridge.bridge_id, &alice.account_id, BridgeStatus::Running)
        .await;

    let result = stack.bridge_service.retry_bridge(bridge.bridge_id, &alice.account_id).await;
    assert!(matches!(result, Err(BridgeError::Conflict(_))));
}

#[tokio::test]
async fn test_recover_resumes_jobs_left_by_a_previous_process() {
    // Nothing dispatches jobs in this stack, as if the process died.
    let stack = TestStack::unstarted();
    let alice = caller("alice");
    let bridge = stack.bridge_service.create_bridge(&alice, request("foo")).await.unwrap();

    let executor = Arc::new(BridgeJobExecutor::new(
        stack.bridges.clone(),
        stack.usage.clone(),
        stack.runtime.clone(),
        Some(DnsSettings {
            provider: stack.dns.clone(),
            zone_id: ZONE_ID.to_string(),
            ttl: 120,
        }),
        stack.event_bus.clone(),
    ));
    let restarted = Arc::new(JobRunner::new(
        stack.jobs.clone(),
        executor,
        test_policy(),
        stack.event_bus.clone(),
    ));

    assert_eq!(restarted.recover().await.unwrap(), 1);
    assert!(restarted.start().is_some());
    assert!(restarted.start().is_none());

    stack
        .wait_for_status(bridge.bridge_id, &alice.account_id, BridgeStatus::Running)
        .await;
}

#[tokio::test]
async fn test_lifecycle_events_are_published_in_order() {
    let stack = TestStack::start();
    let alice = caller("alice");
    let mut all = stack.event_bus.subscribe();

    stack.bridge_service.create_bridge(&alice, request("foo")).await.unwrap();

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let event = tokio::time::timeout(Duration::from_secs(5), all.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(match event {
            BridgeEvent::BridgeCreated { .. } => "created".to_string(),
            BridgeEvent::ContainersAttached { .. } => "attached".to_string(),
            BridgeEvent::StatusChanged { from, to, .. } => format!("{}->{}", from, to),
            other => panic!("unexpected event {:?}", other),
        });
    }
    assert_eq!(seen, vec!["created", "attached", "STARTING->RUNNING"]);
}
