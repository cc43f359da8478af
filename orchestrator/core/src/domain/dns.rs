// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsRecordType {
    A,
}

impl DnsRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
        }
    }
}

/// Record to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordSpec {
    #[serde(rename = "type")]
    pub record_type: DnsRecordType,
    pub name: String,
    pub content: String,
    pub ttl: u32,
}

impl DnsRecordSpec {
    pub fn a(name: impl Into<String>, address: impl Into<String>, ttl: u32) -> Self {
        Self {
            record_type: DnsRecordType::A,
            name: name.into(),
            content: address.into(),
            ttl,
        }
    }
}

/// Record as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("DNS request failed: {0}")]
    Request(String),
    #[error("DNS provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Malformed DNS response: {0}")]
    Malformed(String),
}

/// DNS zone holding the per-bridge A-records.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn add_record(
        &self,
        zone_id: &str,
        record: &DnsRecordSpec,
    ) -> Result<DnsRecord, DnsError>;

    /// Every record in the zone, all pages.
    async fn list_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>, DnsError>;

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), DnsError>;
}

/// A-records in `records` published under `name`.
pub fn a_records_for<'a>(
    records: &'a [DnsRecord],
    name: &'a str,
) -> impl Iterator<Item = &'a DnsRecord> + 'a {
    records
        .iter()
        .filter(move |r| {
            r.record_type == DnsRecordType::A.as_str() && r.name.eq_ignore_ascii_case(name)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, kind: &str, name: &str) -> DnsRecord {
        DnsRecord {
            id: id.to_string(),
            record_type: kind.to_string(),
            name: name.to_string(),
            content: "10.0.0.1".to_string(),
        }
    }

    #[test]
    fn test_a_records_for_filters_name_and_type() {
        let records = vec![
            record("1", "A", "foo.example.com"),
            record("2", "TXT", "foo.example.com"),
            record("3", "A", "bar.example.com"),
            record("4", "A", "FOO.example.com"),
        ];
        let ids: Vec<&str> = a_records_for(&records, "foo.example.com")
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "4"]);
    }
}
