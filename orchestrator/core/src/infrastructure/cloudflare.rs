// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cloudflare DNS Provider
//!
//! Manages the `A` records that point a bridge namespace at its container
//! addresses, using the v4 zone records API with bearer-token auth.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::dns::{DnsError, DnsProvider, DnsRecord, DnsRecordSpec};
use crate::domain::node_config::CloudflareConfig;

const PAGE_SIZE: u32 = 100;

// ============================================================================
// Wire format
// ============================================================================

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct ResultInfo {
    page: u32,
    total_pages: u32,
}

// ============================================================================
// Client
// ============================================================================

pub struct CloudflareDns {
    api_url: String,
    api_token: String,
    client: Client,
}

impl CloudflareDns {
    pub fn new(api_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            client: Client::new(),
        }
    }

    pub fn from_config(config: &CloudflareConfig) -> Self {
        Self::new(config.api_url.clone(), config.api_token.clone())
    }

    fn records_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{}/dns_records", self.api_url, zone_id)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.api_token)
            .header("accept", "application/json")
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<Envelope<T>, DnsError> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| DnsError::Request(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DnsError::Request(e.to_string()))?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(DnsError::Rejected {
                    status: status.as_u16(),
                    message: body,
                })
            }
            Err(e) => return Err(DnsError::Malformed(e.to_string())),
        };

        if !status.is_success() || !envelope.success {
            let message = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DnsError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(envelope)
    }
}

#[async_trait]
impl DnsProvider for CloudflareDns {
    async fn add_record(
        &self,
        zone_id: &str,
        record: &DnsRecordSpec,
    ) -> Result<DnsRecord, DnsError> {
        let envelope: Envelope<DnsRecord> = self
            .send(self.client.post(self.records_url(zone_id)).json(record))
            .await?;
        let created = envelope
            .result
            .ok_or_else(|| DnsError::Malformed("missing result".to_string()))?;
        info!("Added {} record {} -> {}", created.record_type, created.name, created.content);
        Ok(created)
    }

    async fn list_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>, DnsError> {
        let mut records = Vec::new();
        let mut page = 1u32;
        loop {
            let request = self
                .client
                .get(self.records_url(zone_id))
                .query(&[("page", page), ("per_page", PAGE_SIZE)]);
            let envelope: Envelope<Vec<DnsRecord>> = self.send(request).await?;
            records.extend(envelope.result.unwrap_or_default());

            match envelope.result_info {
                Some(info) if info.page < info.total_pages => page = info.page + 1,
                _ => break,
            }
        }
        debug!("Listed {} records in zone {}", records.len(), zone_id);
        Ok(records)
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), DnsError> {
        let url = format!("{}/{}", self.records_url(zone_id), record_id);
        let _: Envelope<serde_json::Value> = self.send(self.client.delete(url)).await?;
        info!("Deleted DNS record {} in zone {}", record_id, zone_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_add_record_posts_a_record() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/zones/z1/dns_records")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::Json(serde_json::json!({
                "type": "A",
                "name": "foo.bridge.example.com",
                "content": "10.0.0.5",
                "ttl": 120
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"success":true,"errors":[],"result":{"id":"r1","type":"A","name":"foo.bridge.example.com","content":"10.0.0.5","ttl":120}}"#,
            )
            .create_async()
            .await;

        let dns = CloudflareDns::new(server.url(), "secret");
        let record = dns
            .add_record("z1", &DnsRecordSpec::a("foo.bridge.example.com", "10.0.0.5", 120))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(record.id, "r1");
        assert_eq!(record.content, "10.0.0.5");
    }

    #[tokio::test]
    async fn test_list_records_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        let page1 = server
            .mock("GET", "/zones/z1/dns_records")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(
                r#"{"success":true,"errors":[],"result":[{"id":"a","type":"A","name":"foo.x","content":"10.0.0.1"}],"result_info":{"page":1,"total_pages":2}}"#,
            )
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/zones/z1/dns_records")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(
                r#"{"success":true,"errors":[],"result":[{"id":"b","type":"TXT","name":"foo.x","content":"hello"}],"result_info":{"page":2,"total_pages":2}}"#,
            )
            .create_async()
            .await;

        let dns = CloudflareDns::new(server.url(), "secret");
        let records = dns.list_records("z1").await.unwrap();

        page1.assert_async().await;
        page2.assert_async().await;
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_rejection_carries_api_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/zones/z1/dns_records/r9")
            .with_status(404)
            .with_body(
                r#"{"success":false,"errors":[{"code":81044,"message":"Record does not exist."}],"result":null}"#,
            )
            .create_async()
            .await;

        let dns = CloudflareDns::new(server.url(), "secret");
        match dns.delete_record("z1", "r9").await {
            Err(DnsError::Rejected { status, message }) => {
                assert_eq!(status, 404);
                assert!(message.contains("Record does not exist."));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
