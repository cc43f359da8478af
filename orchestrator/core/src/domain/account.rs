// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};

use crate::domain::bridge::AccountId;

/// An account allowed to use the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(rename = "id")]
    pub account_id: AccountId,
    pub is_admin: bool,
}

impl Account {
    pub fn new(account_id: AccountId, is_admin: bool) -> Self {
        Self { account_id, is_admin }
    }
}

/// Identity of the party making a request, as asserted by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub account_id: AccountId,
    /// Login, copied onto bridges the caller creates
    pub username: String,
}

impl Caller {
    pub fn new(account_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            account_id: AccountId::new(account_id),
            username: username.into(),
        }
    }
}

/// Outcome of an account deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedAccount {
    #[serde(rename = "id")]
    pub account_id: AccountId,
    pub was_admin: bool,
}

/// Split a comma-separated allow-list, dropping blanks.
pub fn parse_account_list(list: &str) -> Vec<AccountId> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(AccountId::new)
        .collect()
}
