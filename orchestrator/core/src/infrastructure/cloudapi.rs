// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! CloudAPI Key Issuer
//!
//! Registers and revokes bridge SSH keys through the account-management API
//! (`POST /my/keys`, `DELETE /my/keys/{name}`). Every request is signed with
//! the operator's RSA key using the HTTP Signature scheme over the `Date`
//! header:
//!
//! ```text
//! Authorization: Signature keyId="/<account>/keys/<key_id>",algorithm="rsa-sha256",headers="date",signature="<base64>"
//! ```

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info};

use crate::domain::key_issuer::{IssuedKey, KeyIssuer, KeyIssuerError};
use crate::domain::node_config::CloudApiConfig;

/// Signs the `Date` header of outgoing requests.
pub struct RequestSigner {
    key_id: String,
    signing_key: SigningKey<Sha256>,
}

impl RequestSigner {
    pub fn new(account: &str, key_id: &str, private_key: RsaPrivateKey) -> Self {
        Self {
            key_id: format!("/{}/keys/{}", account, key_id),
            signing_key: SigningKey::<Sha256>::new(private_key),
        }
    }

    /// Accepts PKCS#1 (`BEGIN RSA PRIVATE KEY`) or PKCS#8 PEM.
    pub fn from_pem(account: &str, key_id: &str, pem: &str) -> Result<Self, KeyIssuerError> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| KeyIssuerError::Signing(format!("invalid RSA private key: {}", e)))?;
        Ok(Self::new(account, key_id, private_key))
    }

    pub fn authorization(&self, date: &str) -> Result<String, KeyIssuerError> {
        let signature = self
            .signing_key
            .try_sign(date.as_bytes())
            .map_err(|e| KeyIssuerError::Signing(e.to_string()))?;
        Ok(format!(
            "Signature keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"date\",signature=\"{}\"",
            self.key_id,
            STANDARD.encode(signature.to_bytes())
        ))
    }
}

#[derive(Serialize)]
struct CreateKeyBody<'a> {
    name: &'a str,
    key: &'a str,
}

#[derive(Deserialize)]
struct KeyResponse {
    name: String,
    #[serde(default)]
    fingerprint: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

pub struct CloudApiKeyIssuer {
    base_url: String,
    client: Client,
    signer: RequestSigner,
    token: Option<String>,
}

impl CloudApiKeyIssuer {
    pub fn new(base_url: impl Into<String>, signer: RequestSigner, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            signer,
            token,
        }
    }

    /// Build from node configuration, reading the signing key from `key_path`.
    pub fn from_config(config: &CloudApiConfig) -> anyhow::Result<Self> {
        let pem = std::fs::read_to_string(&config.key_path)
            .map_err(|e| {
                anyhow::anyhow!("Failed to read CloudAPI key {}: {}", config.key_path, e)
            })?;
        let signer = RequestSigner::from_pem(&config.account, &config.key_id, &pem)?;
        Ok(Self::new(config.url.clone(), signer, config.token.clone()))
    }

    fn signed(&self, builder: RequestBuilder) -> Result<RequestBuilder, KeyIssuerError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let authorization = self.signer.authorization(&date)?;
        let mut builder = builder
            .header("date", date)
            .header("authorization", authorization)
            .header("accept", "application/json");
        if let Some(token) = &self.token {
            builder = builder.header("x-auth-token", token);
        }
        Ok(builder)
    }

    async fn rejection(response: reqwest::Response) -> KeyIssuerError {
        let status = response.status().as_u16();
        let message = match response.json::<ErrorBody>().await {
            Ok(ErrorBody { message: Some(message) }) => message,
            _ => "no error message".to_string(),
        };
        KeyIssuerError::Rejected { status, message }
    }
}

#[async_trait]
impl KeyIssuer for CloudApiKeyIssuer {
    async fn create_ssh_key(
        &self,
        name: &str,
        public_key: &str,
    ) -> Result<IssuedKey, KeyIssuerError> {
        let url = format!("{}/my/keys", self.base_url);
        debug!("Registering ssh key {} at {}", name, url);

        let request = self.signed(self.client.post(&url))?.json(&CreateKeyBody {
            name,
            key: public_key,
        });
        let response = request
            .send()
            .await
            .map_err(|e| KeyIssuerError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let key: KeyResponse = response
            .json()
            .await
            .map_err(|e| KeyIssuerError::Request(format!("invalid key response: {}", e)))?;
        info!("Registered ssh key {}", key.name);
        Ok(IssuedKey {
            name: key.name,
            fingerprint: key.fingerprint,
        })
    }

    async fn delete_ssh_key(&self, name: &str) -> Result<(), KeyIssuerError> {
        let url = format!("{}/my/keys/{}", self.base_url, name);
        let response = self
            .signed(self.client.delete(&url))?
            .send()
            .await
            .map_err(|e| KeyIssuerError::Request(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                info!("Deleted ssh key {}", name);
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(KeyIssuerError::NotFound(name.to_string())),
            _ => Err(Self::rejection(response).await),
        }
    }
}
