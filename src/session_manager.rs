//! Shard Session Manager
//!
//! Owns one authenticated session per shard. Sessions are created lazily on
//! first use and shared by every request that targets the shard. Creation is
//! single-flight: concurrent callers for an unseen shard wait on the same
//! handshake instead of starting their own.

use crate::error::{Result, StreamError};
use crate::metrics::StreamMetrics;
use crate::remote::{Credential, RemoteStore};
use crate::shard_metrics::ShardMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, error, info, warn};

/// An authenticated session on one shard
#[derive(Debug)]
pub struct ShardSession {
    pub shard_id: i32,
    pub credential: Credential,
    pub authenticated: bool,
}

type SessionSlot = Arc<OnceCell<Arc<ShardSession>>>;

/// Per-shard session registry
pub struct SessionManager {
    store: Arc<dyn RemoteStore>,
    sessions: RwLock<HashMap<i32, SessionSlot>>,
    max_auth_attempts: usize,
    metrics: Option<Arc<StreamMetrics>>,
    shard_metrics: Option<ShardMetrics>,
}

impl SessionManager {
    /// Create a manager that authorizes each shard with up to
    /// `max_auth_attempts` export/import rounds
    pub fn new(store: Arc<dyn RemoteStore>, max_auth_attempts: usize) -> Self {
        SessionManager {
            store,
            sessions: RwLock::new(HashMap::new()),
            max_auth_attempts: max_auth_attempts.max(1),
            metrics: None,
            shard_metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<StreamMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_shard_metrics(mut self, shard_metrics: ShardMetrics) -> Self {
        self.shard_metrics = Some(shard_metrics);
        self
    }

    /// The store sessions are created against
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Get the session for `shard_id`, performing the handshake if needed
    pub async fn get_session(&self, shard_id: i32) -> Result<Arc<ShardSession>> {
        let slot = self.slot(shard_id).await;
        let session = slot
            .get_or_try_init(|| self.handshake(shard_id))
            .await?;
        Ok(Arc::clone(session))
    }

    /// Discard `session` so the next caller creates a fresh one
    ///
    /// Only removes the registry entry if it still holds this exact session,
    /// so a stale failure cannot evict a newer replacement.
    pub async fn invalidate(&self, session: &Arc<ShardSession>) {
        let removed = {
            let mut sessions = self.sessions.write().await;
            let current = sessions
                .get(&session.shard_id)
                .and_then(|slot| slot.get())
                .is_some_and(|current| Arc::ptr_eq(current, session));
            if current {
                sessions.remove(&session.shard_id);
            }
            current
        };

        if !removed {
            debug!(
                "Session for shard {} already replaced, nothing to invalidate",
                session.shard_id
            );
            return;
        }

        warn!("Discarding session for shard {}", session.shard_id);
        if let Some(metrics) = &self.metrics {
            metrics.record_session_invalidation();
        }
        self.close(session.shard_id, &session.credential).await;
    }

    /// Number of shards with a live session
    pub async fn session_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Close every live session
    pub async fn shutdown(&self) {
        let drained: Vec<SessionSlot> = self.sessions.write().await.drain().map(|(_, slot)| slot).collect();
        for slot in drained {
            if let Some(session) = slot.get() {
                self.close(session.shard_id, &session.credential).await;
            }
        }
    }

    async fn slot(&self, shard_id: i32) -> SessionSlot {
        if let Some(slot) = self.sessions.read().await.get(&shard_id) {
            return Arc::clone(slot);
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(shard_id).or_default())
    }

    async fn handshake(&self, shard_id: i32) -> Result<Arc<ShardSession>> {
        info!("Creating session for shard {}", shard_id);
        let result = self.authorize(shard_id).await;

        let success = result.is_ok();
        if let Some(metrics) = &self.metrics {
            metrics.record_handshake(success);
        }
        if let Some(shard_metrics) = &self.shard_metrics {
            shard_metrics.record_handshake(shard_id, success);
        }

        result.map(Arc::new)
    }

    async fn authorize(&self, shard_id: i32) -> Result<ShardSession> {
        let credential = self.store.create_session(shard_id).await?;
        let guard = HandshakeGuard::new(Arc::clone(&self.store), shard_id, credential.clone());

        if shard_id == self.store.primary_shard() {
            debug!("Shard {} is the primary shard, reusing its credential", shard_id);
            guard.disarm();
            return Ok(ShardSession {
                shard_id,
                credential,
                authenticated: true,
            });
        }

        for attempt in 1..=self.max_auth_attempts {
            let imported = match self.store.export_authorization(shard_id).await {
                Ok(authorization) => {
                    self.store
                        .import_authorization(shard_id, &credential, &authorization)
                        .await
                }
                Err(e) => Err(e),
            };

            match imported {
                Ok(()) => {
                    info!(
                        "Authorized session for shard {} after {} attempt(s)",
                        shard_id, attempt
                    );
                    guard.disarm();
                    return Ok(ShardSession {
                        shard_id,
                        credential,
                        authenticated: true,
                    });
                }
                Err(StreamError::AuthBytesInvalid { .. }) => {
                    warn!(
                        "Shard {} rejected authorization bytes (attempt {}/{})",
                        shard_id, attempt, self.max_auth_attempts
                    );
                    if let Some(shard_metrics) = &self.shard_metrics {
                        shard_metrics.record_auth_retry(shard_id);
                    }
                }
                Err(e) => {
                    error!("Handshake with shard {} failed: {}", shard_id, e);
                    guard.disarm();
                    self.close(shard_id, &credential).await;
                    return Err(e);
                }
            }
        }

        error!(
            "Giving up on shard {} after {} authorization attempts",
            shard_id, self.max_auth_attempts
        );
        guard.disarm();
        self.close(shard_id, &credential).await;
        Err(StreamError::AuthFailed {
            shard_id,
            attempts: self.max_auth_attempts,
        })
    }

    async fn close(&self, shard_id: i32, credential: &Credential) {
        if let Err(e) = self.store.close_session(shard_id, credential).await {
            warn!("Failed to close session for shard {}: {}", shard_id, e);
        }
    }
}

/// Closes the credential of a handshake that was abandoned midway
///
/// A handshake future dropped before it finishes (the requesting client went
/// away) would otherwise leave its freshly created session open on the store.
struct HandshakeGuard {
    store: Arc<dyn RemoteStore>,
    shard_id: i32,
    credential: Option<Credential>,
}

impl HandshakeGuard {
    fn new(store: Arc<dyn RemoteStore>, shard_id: i32, credential: Credential) -> Self {
        HandshakeGuard {
            store,
            shard_id,
            credential: Some(credential),
        }
    }

    /// The handshake settled; the caller owns the credential from here on
    fn disarm(mut self) {
        self.credential = None;
    }
}

impl Drop for HandshakeGuard {
    fn drop(&mut self) {
        let Some(credential) = self.credential.take() else {
            return;
        };
        let shard_id = self.shard_id;

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    "Handshake for shard {} abandoned outside a runtime, session left open",
                    shard_id
                );
                return;
            }
        };

        warn!("Handshake for shard {} abandoned, closing its session", shard_id);
        let store = Arc::clone(&self.store);
        handle.spawn(async move {
            if let Err(e) = store.close_session(shard_id, &credential).await {
                warn!("Failed to close abandoned session for shard {}: {}", shard_id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_id::ObjectReference;
    use crate::remote::ExportedAuthorization;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store whose imports fail with bad auth bytes a fixed number of times
    struct FlakyAuthStore {
        rejections: usize,
        imports: AtomicUsize,
        sessions: AtomicUsize,
        closed: AtomicUsize,
    }

    impl FlakyAuthStore {
        fn new(rejections: usize) -> Self {
            FlakyAuthStore {
                rejections,
                imports: AtomicUsize::new(0),
                sessions: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteStore for FlakyAuthStore {
        fn primary_shard(&self) -> i32 {
            2
        }

        async fn create_session(&self, shard_id: i32) -> Result<Credential> {
            let n = self.sessions.fetch_add(1, Ordering::SeqCst);
            Ok(Credential::new(format!("shard-{}-{}", shard_id, n)))
        }

        async fn export_authorization(&self, _shard_id: i32) -> Result<ExportedAuthorization> {
            Ok(ExportedAuthorization {
                id: 1,
                bytes: Bytes::from_static(b"auth"),
            })
        }

        async fn import_authorization(
            &self,
            shard_id: i32,
            _credential: &Credential,
            _authorization: &ExportedAuthorization,
        ) -> Result<()> {
            let n = self.imports.fetch_add(1, Ordering::SeqCst);
            if n < self.rejections {
                Err(StreamError::AuthBytesInvalid { shard_id })
            } else {
                Ok(())
            }
        }

        async fn read_chunk(
            &self,
            _session: &ShardSession,
            _reference: &ObjectReference,
            _offset: u64,
            _limit: u64,
        ) -> Result<Bytes> {
            Ok(Bytes::new())
        }

        async fn close_session(&self, _shard_id: i32, _credential: &Credential) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_primary_shard_skips_import() {
        let store = Arc::new(FlakyAuthStore::new(0));
        let manager = SessionManager::new(store.clone(), 6);

        let session = manager.get_session(2).await.unwrap();
        assert!(session.authenticated);
        assert_eq!(store.imports.load(Ordering::SeqCst), 0);
        assert_eq!(store.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retries_rejected_auth_bytes() {
        let store = Arc::new(FlakyAuthStore::new(3));
        let manager = SessionManager::new(store.clone(), 6);

        let session = manager.get_session(4).await.unwrap();
        assert_eq!(session.shard_id, 4);
        assert_eq!(store.imports.load(Ordering::SeqCst), 4);
        tokio::task::yield_now().await;
        assert_eq!(store.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_fail_and_close() {
        let store = Arc::new(FlakyAuthStore::new(usize::MAX));
        let manager = SessionManager::new(store.clone(), 6);

        let err = manager.get_session(5).await.unwrap_err();
        assert!(matches!(err, StreamError::AuthFailed { shard_id: 5, attempts: 6 }));
        assert_eq!(store.imports.load(Ordering::SeqCst), 6);
        assert_eq!(store.closed.load(Ordering::SeqCst), 1);
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_session_reused() {
        let store = Arc::new(FlakyAuthStore::new(0));
        let manager = SessionManager::new(store.clone(), 6);

        let first = manager.get_session(4).await.unwrap();
        let second = manager.get_session(4).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.sessions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_replaces_session() {
        let store = Arc::new(FlakyAuthStore::new(0));
        let manager = SessionManager::new(store.clone(), 6);

        let first = manager.get_session(4).await.unwrap();
        manager.invalidate(&first).await;
        let second = manager.get_session(4).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(store.closed.load(Ordering::SeqCst), 1);

        // A second report about the old session leaves the new one alone
        manager.invalidate(&first).await;
        let third = manager.get_session(4).await.unwrap();
        assert!(Arc::ptr_eq(&second, &third));
    }
}
