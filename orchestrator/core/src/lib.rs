// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Storage bridge core
//!
//! Lifecycle orchestration for storage bridges: pairs of gateway containers
//! published under a per-bridge DNS namespace.
//!
//! # Architecture
//!
//! - **domain:** bridge, account, job and usage types plus the collaborator traits
//! - **application:** lifecycle and account services, the job runner
//! - **infrastructure:** Docker, CloudAPI, Cloudflare, Postgres and in-memory adapters
//! - **presentation:** the axum router

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
