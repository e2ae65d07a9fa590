//! HTTP gateway adapter for the remote store
//!
//! Implements [`RemoteStore`] and [`ObjectResolver`] against a gateway that
//! fronts the shard-partitioned store:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | resolve   | `GET /objects/{id}` |
//! | session   | `POST /shards/{shard}/sessions` |
//! | export    | `POST /shards/{shard}/authorizations/export` |
//! | import    | `POST /shards/{shard}/authorizations/import` |
//! | chunk     | `GET /shards/{shard}/chunks?location=&offset=&limit=` |
//! | close     | `DELETE /shards/{shard}/sessions` |

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::file_id::ObjectReference;
use crate::models::ObjectMetadata;
use crate::remote::{Credential, ExportedAuthorization, ObjectResolver, RemoteStore};
use crate::session_manager::ShardSession;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const AUTH_BYTES_INVALID: &str = "AUTH_BYTES_INVALID";

#[derive(Debug, Deserialize)]
struct ObjectRecord {
    file_id: String,
    #[serde(default)]
    file_unique_id: Option<String>,
    file_size: u64,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionRecord {
    credential: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AuthorizationRecord {
    id: i64,
    bytes: String,
}

/// Remote store client speaking the gateway protocol
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    primary_shard: i32,
}

impl GatewayClient {
    /// Create a client for `base_url`
    pub fn new(base_url: impl Into<String>, primary_shard: i32, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| StreamError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(GatewayClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            primary_shard,
        })
    }

    /// Create a client from the service configuration
    pub fn from_config(config: &StreamConfig) -> Result<Self> {
        Self::new(
            config.gateway_url.clone(),
            config.primary_shard,
            config.request_timeout(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        request.send().await.map_err(map_reqwest_error)
    }

    /// Turn a non-success response into an error
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StreamError::from_upstream_status(status.as_u16(), message))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> StreamError {
    if err.is_timeout() {
        StreamError::Timeout(err.to_string())
    } else if err.is_decode() {
        StreamError::ParseError(err.to_string())
    } else {
        StreamError::HttpError(err.to_string())
    }
}

#[async_trait]
impl ObjectResolver for GatewayClient {
    async fn resolve_object(&self, object_id: i64) -> Result<ObjectMetadata> {
        let response = self
            .send(self.client.get(self.url(&format!("/objects/{}", object_id))))
            .await?;
        let record: ObjectRecord = Self::check(response)
            .await?
            .json()
            .await
            .map_err(map_reqwest_error)?;

        if record.file_id.is_empty() {
            return Err(StreamError::NotFound(format!(
                "object {} has no retrievable payload",
                object_id
            )));
        }

        let reference = ObjectReference::decode(&record.file_id)?;
        let mut metadata = ObjectMetadata::new(
            reference,
            record.file_size,
            record.mime_type.unwrap_or_default(),
            record.file_name.unwrap_or_default(),
        );
        if let Some(unique_id) = record.file_unique_id.filter(|id| !id.is_empty()) {
            metadata.unique_id = unique_id;
        }

        debug!(
            "Resolved object {}: shard={}, size={}",
            object_id, metadata.reference.shard_id, metadata.size
        );
        Ok(metadata)
    }
}

#[async_trait]
impl RemoteStore for GatewayClient {
    fn primary_shard(&self) -> i32 {
        self.primary_shard
    }

    async fn create_session(&self, shard_id: i32) -> Result<Credential> {
        let response = self
            .send(self.client.post(self.url(&format!("/shards/{}/sessions", shard_id))))
            .await?;
        let record: SessionRecord = Self::check(response)
            .await?
            .json()
            .await
            .map_err(map_reqwest_error)?;
        Ok(Credential::new(record.credential))
    }

    async fn export_authorization(&self, shard_id: i32) -> Result<ExportedAuthorization> {
        let url = self.url(&format!("/shards/{}/authorizations/export", shard_id));
        let response = self.send(self.client.post(url)).await?;
        let record: AuthorizationRecord = Self::check(response)
            .await?
            .json()
            .await
            .map_err(map_reqwest_error)?;

        let bytes = STANDARD
            .decode(record.bytes.as_bytes())
            .map_err(|e| StreamError::ParseError(format!("Invalid authorization bytes: {}", e)))?;
        Ok(ExportedAuthorization {
            id: record.id,
            bytes: Bytes::from(bytes),
        })
    }

    async fn import_authorization(
        &self,
        shard_id: i32,
        credential: &Credential,
        authorization: &ExportedAuthorization,
    ) -> Result<()> {
        let url = self.url(&format!("/shards/{}/authorizations/import", shard_id));
        let body = AuthorizationRecord {
            id: authorization.id,
            bytes: STANDARD.encode(&authorization.bytes),
        };
        let response = self
            .send(self.client.post(url).bearer_auth(credential.as_str()).json(&body))
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let message = response.text().await.unwrap_or_default();
            if message.contains(AUTH_BYTES_INVALID) {
                return Err(StreamError::AuthBytesInvalid { shard_id });
            }
            return Err(StreamError::UpstreamRejected {
                status: 401,
                message,
            });
        }

        Self::check(response).await.map(|_| ())
    }

    async fn read_chunk(
        &self,
        session: &ShardSession,
        reference: &ObjectReference,
        offset: u64,
        limit: u64,
    ) -> Result<Bytes> {
        let url = self.url(&format!("/shards/{}/chunks", session.shard_id));
        let location = reference.encode();
        let request = self
            .client
            .get(url)
            .bearer_auth(session.credential.as_str())
            .query(&[
                ("location", location),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ]);

        let response = self.send(request).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(StreamError::SessionInvalid {
                shard_id: session.shard_id,
            });
        }

        Self::check(response)
            .await?
            .bytes()
            .await
            .map_err(map_reqwest_error)
    }

    async fn close_session(&self, shard_id: i32, credential: &Credential) -> Result<()> {
        let url = self.url(&format!("/shards/{}/sessions", shard_id));
        let response = self
            .send(self.client.delete(url).bearer_auth(credential.as_str()))
            .await?;
        if !response.status().is_success() {
            warn!(
                "Gateway refused to close session on shard {}: {}",
                shard_id,
                response.status()
            );
        }
        Ok(())
    }
}
