// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod cloudapi;
pub mod cloudflare;
pub mod db;
pub mod event_bus;
pub mod repositories;
pub mod runtime;

pub use cloudapi::{CloudApiKeyIssuer, RequestSigner};
pub use cloudflare::CloudflareDns;
pub use event_bus::{EventBus, EventReceiver};
pub use runtime::DockerBridgeRuntime;
