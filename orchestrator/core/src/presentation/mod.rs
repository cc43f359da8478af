// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`bridge-core`)
//!
//! HTTP surface that translates requests into application service calls.
//! No business logic lives here; all real work is delegated to
//! `crate::application`.

pub mod api;
