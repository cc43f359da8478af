// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures: hand-written collaborator mocks and a fully wired
//! in-memory service stack.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_core::application::account_service::StandardAccountService;
use bridge_core::application::bridge_service::{BridgeService, StandardBridgeService};
use bridge_core::application::job_runner::JobRunner;
use bridge_core::application::provisioning::{BridgeJobExecutor, DnsSettings};
use bridge_core::domain::account::{Account, Caller};
use bridge_core::domain::bridge::{AccountId, Bridge, BridgeId, BridgeStatus};
use bridge_core::domain::dns::{DnsError, DnsProvider, DnsRecord, DnsRecordSpec};
use bridge_core::domain::job::RetryPolicy;
use bridge_core::domain::key_issuer::{IssuedKey, KeyIssuer, KeyIssuerError};
use bridge_core::domain::repository::AccountRepository;
use bridge_core::domain::runtime::{
    BridgeContainerSpec, ContainerNetwork, ContainerRuntime, KeyMaterial, RuntimeError,
};
use bridge_core::infrastructure::event_bus::EventBus;
use bridge_core::infrastructure::repositories::{
    InMemoryAccountRepository, InMemoryBridgeRepository, InMemoryJobRepository,
    InMemoryUsageRepository,
};

pub const NAMESPACE_PARENT: &str = "bridge.example.com";
pub const ZONE_ID: &str = "zone-1";
pub const FINGERPRINT: &str = "bb:0d:44:47:7c:01:95:89:6e:a4:6c:29:68:b4:4b:d0";

// ============================================================================
// Container runtime
// ============================================================================

#[derive(Default)]
pub struct MockRuntime {
    next_id: AtomicU32,
    /// Remaining create calls that fail before one succeeds
    pub create_failures: AtomicU32,
    /// Milliseconds each create call takes
    pub create_delay_ms: AtomicU64,
    pub calls: Mutex<Vec<String>>,
    pub running: Mutex<HashMap<String, bool>>,
}

impl MockRuntime {
    pub fn fail_creates(&self, times: u32) {
        self.create_failures.store(times, Ordering::SeqCst);
    }

    pub fn slow_creates(&self, delay: Duration) {
        self.create_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create_bridge_containers(
        &self,
        spec: &BridgeContainerSpec,
        keys: &KeyMaterial,
    ) -> Result<(String, String), RuntimeError> {
        self.record("create");
        assert!(keys.private_key.contains("BEGIN OPENSSH PRIVATE KEY"));
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let remaining = self.create_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.create_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RuntimeError::CreateFailed("docker daemon unavailable".to_string()));
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let c1 = format!("{}-c{}", spec.container_name(1), n);
        let c2 = format!("{}-c{}", spec.container_name(2), n);
        let mut running = self.running.lock();
        running.insert(c1.clone(), true);
        running.insert(c2.clone(), true);
        Ok((c1, c2))
    }

    async fn delete_bridge_containers(&self, c1: &str, c2: &str) -> Result<(), RuntimeError> {
        self.record("delete");
        let mut running = self.running.lock();
        running.remove(c1);
        running.remove(c2);
        Ok(())
    }

    async fn stop_bridge_containers(&self, c1: &str, c2: &str) -> Result<(), RuntimeError> {
        self.record("stop");
        let mut running = self.running.lock();
        running.insert(c1.to_string(), false);
        running.insert(c2.to_string(), false);
        Ok(())
    }

    async fn resume_bridge_containers(&self, c1: &str, c2: &str) -> Result<(), RuntimeError> {
        self.record("resume");
        let mut running = self.running.lock();
        running.insert(c1.to_string(), true);
        running.insert(c2.to_string(), true);
        Ok(())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerNetwork, RuntimeError> {
        let running = self.running.lock();
        if !running.contains_key(container_id) {
            return Err(RuntimeError::ContainerNotFound(container_id.to_string()));
        }
        let last = if container_id.contains("-1-") { 1 } else { 2 };
        Ok(ContainerNetwork {
            address: Some(format!("10.0.0.{}", last)),
        })
    }
}

// ============================================================================
// Key issuer
// ============================================================================

#[derive(Default)]
pub struct MockKeyIssuer {
    pub created: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub omit_fingerprint: AtomicBool,
    /// Milliseconds each key creation takes
    pub create_delay_ms: AtomicU64,
}

impl MockKeyIssuer {
    pub fn slow_creates(&self, delay: Duration) {
        self.create_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyIssuer for MockKeyIssuer {
    async fn create_ssh_key(
        &self,
        name: &str,
        public_key: &str,
    ) -> Result<IssuedKey, KeyIssuerError> {
        assert!(public_key.starts_with("ssh-ed25519 "));
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.created.lock().push(name.to_string());
        let fingerprint = if self.omit_fingerprint.load(Ordering::SeqCst) {
            None
        } else {
            Some(FINGERPRINT.to_string())
        };
        Ok(IssuedKey {
            name: name.to_string(),
            fingerprint,
        })
    }

    async fn delete_ssh_key(&self, name: &str) -> Result<(), KeyIssuerError> {
        self.deleted.lock().push(name.to_string());
        Ok(())
    }
}

// ============================================================================
// DNS
// ============================================================================

#[derive(Default)]
pub struct MockDns {
    next_id: AtomicU32,
    pub records: Mutex<Vec<DnsRecord>>,
    pub fail_adds: AtomicBool,
}

impl MockDns {
    pub fn a_records(&self, name: &str) -> Vec<String> {
        let mut contents: Vec<String> = self
            .records
            .lock()
            .iter()
            .filter(|r| r.record_type == "A" && r.name == name)
            .map(|r| r.content.clone())
            .collect();
        contents.sort();
        contents
    }
}

#[async_trait]
impl DnsProvider for MockDns {
    async fn add_record(
        &self,
        zone_id: &str,
        record: &DnsRecordSpec,
    ) -> Result<DnsRecord, DnsError> {
        assert_eq!(zone_id, ZONE_ID);
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(DnsError::Rejected {
                status: 500,
                message: "upstream error".to_string(),
            });
        }
        let created = DnsRecord {
            id: format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            record_type: record.record_type.as_str().to_string(),
            name: record.name.clone(),
            content: record.content.clone(),
        };
        self.records.lock().push(created.clone());
        Ok(created)
    }

    async fn list_records(&self, _zone_id: &str) -> Result<Vec<DnsRecord>, DnsError> {
        Ok(self.records.lock().clone())
    }

    async fn delete_record(&self, _zone_id: &str, record_id: &str) -> Result<(), DnsError> {
        self.records.lock().retain(|r| r.id != record_id);
        Ok(())
    }
}

// ============================================================================
// Wired stack
// ============================================================================

pub struct TestStack {
    pub bridge_service: Arc<StandardBridgeService>,
    pub account_service: Arc<StandardAccountService>,
    pub accounts: Arc<InMemoryAccountRepository>,
    pub bridges: Arc<InMemoryBridgeRepository>,
    pub jobs: Arc<InMemoryJobRepository>,
    pub usage: Arc<InMemoryUsageRepository>,
    pub runtime: Arc<MockRuntime>,
    pub key_issuer: Arc<MockKeyIssuer>,
    pub dns: Arc<MockDns>,
    pub event_bus: Arc<EventBus>,
    pub runner: Arc<JobRunner>,
}

pub fn test_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(10),
    }
}

impl TestStack {
    /// Stack with a running job dispatcher.
    pub fn start() -> Self {
        let stack = Self::unstarted();
        stack.runner.start();
        stack
    }

    /// Stack whose dispatcher has not been started; jobs stay queued.
    pub fn unstarted() -> Self {
        let accounts = Arc::new(InMemoryAccountRepository::new());
        let bridges = Arc::new(InMemoryBridgeRepository::new());
        let jobs = Arc::new(InMemoryJobRepository::new());
        let usage = Arc::new(InMemoryUsageRepository::new());
        let runtime = Arc::new(MockRuntime::default());
        let key_issuer = Arc::new(MockKeyIssuer::default());
        let dns = Arc::new(MockDns::default());
        let event_bus = Arc::new(EventBus::with_default_capacity());

        let dns_settings = DnsSettings {
            provider: dns.clone(),
            zone_id: ZONE_ID.to_string(),
            ttl: 120,
        };
        let executor = Arc::new(BridgeJobExecutor::new(
            bridges.clone(),
            usage.clone(),
            runtime.clone(),
            Some(dns_settings.clone()),
            event_bus.clone(),
        ));
        let runner = Arc::new(JobRunner::new(
            jobs.clone(),
            executor,
            test_policy(),
            event_bus.clone(),
        ));
        let bridge_service = Arc::new(StandardBridgeService::new(
            bridges.clone(),
            jobs.clone(),
            usage.clone(),
            key_issuer.clone(),
            Some(dns_settings),
            runner.clone(),
            event_bus.clone(),
            NAMESPACE_PARENT,
        ));
        let account_service = Arc::new(StandardAccountService::new(accounts.clone()));

        Self {
            bridge_service,
            account_service,
            accounts,
            bridges,
            jobs,
            usage,
            runtime,
            key_issuer,
            dns,
            event_bus,
            runner,
        }
    }

    pub async fn allow(&self, account_id: &str, is_admin: bool) {
        self.accounts
            .create_account(&Account::new(AccountId::new(account_id), is_admin))
            .await
            .unwrap();
    }

    pub async fn wait_for_status(
        &self,
        id: BridgeId,
        account: &AccountId,
        status: BridgeStatus,
    ) -> Bridge {
        for _ in 0..500 {
            if let Some(bridge) = self.bridge_service.get_bridge(id, account).await.unwrap() {
                if bridge.status == status {
                    return bridge;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("bridge {} never reached {}", id, status);
    }

    pub async fn wait_until_removed(&self, id: BridgeId, account: &AccountId) {
        for _ in 0..500 {
            if self.bridge_service.get_bridge(id, account).await.unwrap().is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("bridge {} was never removed", id);
    }

    pub async fn wait_for_failed_job(&self, id: BridgeId, account: &AccountId) {
        for _ in 0..500 {
            let jobs = self.bridge_service.list_bridge_jobs(id, account).await.unwrap();
            if jobs
                .last()
                .map(|j| j.status == bridge_core::domain::job::JobStatus::Failed)
                .unwrap_or(false)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no failed job for bridge {}", id);
    }
}

pub fn caller(account: &str) -> Caller {
    Caller::new(account, format!("{}-login", account))
}
