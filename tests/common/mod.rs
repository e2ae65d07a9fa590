//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use media_stream::error::{Result, StreamError};
use media_stream::{
    Credential, ExportedAuthorization, FileKind, MediaService, ObjectMetadata, ObjectReference,
    ObjectResolver, RemoteStore, ShardSession, StreamConfig,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PRIMARY_SHARD: i32 = 2;

/// Deterministic object content
pub fn object_bytes(size: usize) -> Bytes {
    Bytes::from((0..size).map(|i| (i % 251) as u8).collect::<Vec<_>>())
}

/// In-memory store with call counters and injectable failures
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<HashMap<i64, (ObjectMetadata, Bytes)>>,

    pub resolves: AtomicUsize,
    pub sessions_created: AtomicUsize,
    pub imports: AtomicUsize,
    pub chunk_reads: AtomicUsize,
    pub closed: AtomicUsize,

    /// Imports to reject with bad auth bytes before accepting
    pub auth_rejections: AtomicUsize,
    /// Chunk reads to fail transiently before succeeding
    pub transient_failures: AtomicUsize,
    /// Chunk reads to fail with an invalid session before succeeding
    pub session_failures: AtomicUsize,

    pub handshake_delay: Mutex<Duration>,
    pub import_delay: Mutex<Duration>,
    pub chunk_delay: Mutex<Duration>,
    pub offsets: Mutex<Vec<(u64, u64)>>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add an object on `shard_id` and return its metadata
    pub fn insert(&self, object_id: i64, shard_id: i32, size: usize, mime: &str, name: &str) -> ObjectMetadata {
        let reference = ObjectReference::new(FileKind::Video, shard_id, object_id, 0x5eed + object_id);
        let metadata = ObjectMetadata::new(reference, size as u64, mime, name);
        self.objects
            .lock()
            .unwrap()
            .insert(object_id, (metadata.clone(), object_bytes(size)));
        metadata
    }

    pub fn set_handshake_delay(&self, delay: Duration) {
        *self.handshake_delay.lock().unwrap() = delay;
    }

    pub fn set_import_delay(&self, delay: Duration) {
        *self.import_delay.lock().unwrap() = delay;
    }

    pub fn set_chunk_delay(&self, delay: Duration) {
        *self.chunk_delay.lock().unwrap() = delay;
    }

    pub fn chunk_reads(&self) -> usize {
        self.chunk_reads.load(Ordering::SeqCst)
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObjectResolver for FakeStore {
    async fn resolve_object(&self, object_id: i64) -> Result<ObjectMetadata> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .get(&object_id)
            .map(|(metadata, _)| metadata.clone())
            .ok_or_else(|| StreamError::NotFound(object_id.to_string()))
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    fn primary_shard(&self) -> i32 {
        PRIMARY_SHARD
    }

    async fn create_session(&self, shard_id: i32) -> Result<Credential> {
        let n = self.sessions_created.fetch_add(1, Ordering::SeqCst);
        let delay = *self.handshake_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(Credential::new(format!("cred-{}-{}", shard_id, n)))
    }

    async fn export_authorization(&self, _shard_id: i32) -> Result<ExportedAuthorization> {
        Ok(ExportedAuthorization {
            id: 77,
            bytes: Bytes::from_static(b"exported"),
        })
    }

    async fn import_authorization(
        &self,
        shard_id: i32,
        _credential: &Credential,
        _authorization: &ExportedAuthorization,
    ) -> Result<()> {
        self.imports.fetch_add(1, Ordering::SeqCst);
        let delay = *self.import_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if Self::take(&self.auth_rejections) {
            return Err(StreamError::AuthBytesInvalid { shard_id });
        }
        Ok(())
    }

    async fn read_chunk(
        &self,
        session: &ShardSession,
        reference: &ObjectReference,
        offset: u64,
        limit: u64,
    ) -> Result<Bytes> {
        self.chunk_reads.fetch_add(1, Ordering::SeqCst);
        self.offsets.lock().unwrap().push((offset, limit));

        let delay = *self.chunk_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if Self::take(&self.session_failures) {
            return Err(StreamError::SessionInvalid {
                shard_id: session.shard_id,
            });
        }
        if Self::take(&self.transient_failures) {
            return Err(StreamError::UpstreamTransient("flood wait".to_string()));
        }

        let data = self
            .objects
            .lock()
            .unwrap()
            .get(&reference.object_id)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| StreamError::NotFound(reference.object_id.to_string()))?;

        let len = data.len() as u64;
        if offset >= len {
            return Ok(Bytes::new());
        }
        let end = (offset + limit).min(len);
        Ok(data.slice(offset as usize..end as usize))
    }

    async fn close_session(&self, _shard_id: i32, _credential: &Credential) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Service over `store` with test-friendly retry settings
pub fn service(store: &Arc<FakeStore>) -> MediaService {
    let config = StreamConfig {
        max_chunk_retries: 2,
        ..StreamConfig::default()
    };
    MediaService::new(config, store.clone(), store.clone()).unwrap()
}

pub fn parts(method: Method, uri: &str, range: Option<&str>) -> Parts {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(range) = range {
        builder = builder.header("range", range);
    }
    builder.body(()).unwrap().into_parts().0
}

pub struct Fetched {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Fetched {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Send a request through the service router and collect the whole body
pub async fn fetch(service: &MediaService, method: Method, uri: &str, range: Option<&str>) -> Fetched {
    let response = service.server().route(parts(method, uri, range)).await;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();
    Fetched {
        status,
        headers,
        body,
    }
}
