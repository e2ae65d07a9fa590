//! Collaborator interfaces for the remote object store
//!
//! The engine never talks to the store directly. Everything it needs is
//! behind two traits: [`RemoteStore`] for sessions and chunk reads, and
//! [`ObjectResolver`] for turning a local object id into metadata. The HTTP
//! gateway adapter implements both; tests substitute in-memory fakes.

use crate::error::Result;
use crate::file_id::ObjectReference;
use crate::models::ObjectMetadata;
use crate::session_manager::ShardSession;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Opaque credential material identifying a session on one shard
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Credential(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Never print credential material.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

/// Authorization exported from the primary session for another shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedAuthorization {
    pub id: i64,
    pub bytes: Bytes,
}

/// Session and chunk-read operations of the remote store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Shard whose credential authorizes every other shard
    fn primary_shard(&self) -> i32;

    /// Open a session on `shard_id`
    ///
    /// For the primary shard the returned credential is already
    /// authorized; for any other shard it must be authorized by importing
    /// an authorization exported from the primary session.
    async fn create_session(&self, shard_id: i32) -> Result<Credential>;

    /// Export an authorization for `shard_id` from the primary session
    async fn export_authorization(&self, shard_id: i32) -> Result<ExportedAuthorization>;

    /// Import an exported authorization into the session on `shard_id`
    ///
    /// Fails with `AuthBytesInvalid` when the shard rejects the bytes; the
    /// caller may export again and retry.
    async fn import_authorization(
        &self,
        shard_id: i32,
        credential: &Credential,
        authorization: &ExportedAuthorization,
    ) -> Result<()>;

    /// Read up to `limit` bytes of `reference` starting at `offset`
    ///
    /// An empty result means the object ended before `offset`.
    async fn read_chunk(
        &self,
        session: &ShardSession,
        reference: &ObjectReference,
        offset: u64,
        limit: u64,
    ) -> Result<Bytes>;

    /// Release a session the engine no longer uses
    async fn close_session(&self, _shard_id: i32, _credential: &Credential) -> Result<()> {
        Ok(())
    }
}

/// Resolution of local object ids
#[async_trait]
pub trait ObjectResolver: Send + Sync {
    /// Resolve `object_id` to its reference and properties
    ///
    /// Fails with `NotFound` when the object does not exist or carries no
    /// retrievable payload.
    async fn resolve_object(&self, object_id: i64) -> Result<ObjectMetadata>;
}
