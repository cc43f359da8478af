// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod account_service;
pub mod bridge_service;
pub mod job_runner;
pub mod provisioning;

// Re-export use cases for convenience
pub use account_service::{AccountService, StandardAccountService};
pub use bridge_service::{BridgeService, CreateBridgeRequest, StandardBridgeService};
pub use job_runner::JobRunner;
pub use provisioning::{BridgeJobExecutor, DnsSettings};
