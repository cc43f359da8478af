// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: bridge aggregate, accounts, usage, provisioning jobs and the
//! narrow interfaces to the four external systems.

pub mod account;
pub mod bridge;
pub mod dns;
pub mod error;
pub mod events;
pub mod job;
pub mod key_issuer;
pub mod node_config;
pub mod repository;
pub mod runtime;
pub mod ssh_key;
pub mod usage;
