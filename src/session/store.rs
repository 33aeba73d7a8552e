//! Keyed session storage with lazy expiry.
//!
//! The [`SessionStore`] is the one stateful, shared, long-lived object in
//! the process: a key-to-session map guarded by a single async lock. The
//! lock covers the whole check-then-create path of
//! [`SessionStore::get_or_create`], so concurrent callers can never
//! construct two sessions for the same key. Expired sessions are evicted
//! at access time; there is no background sweep.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::credentials::CredentialPool;
use crate::error::{Error, Result};

use super::core::Session;

// ============================================================================
// SessionStore
// ============================================================================

/// Concurrent key-to-session map with get-or-create and lazy eviction.
///
/// # Example
///
/// ```ignore
/// let store = SessionStore::from_env()?;
/// let session = store.get_or_create("chat").await?;
/// let wrapper = session.ask_sync(Default::default(), "hello").await?;
/// ```
pub struct SessionStore {
    /// Configuration template for new sessions.
    config: SessionConfig,

    /// Credential pool shared by all session creations.
    pool: CredentialPool,

    /// Live sessions by key. The lock is held across handshakes on
    /// purpose; see [`SessionStore::get_or_create`].
    sessions: Mutex<FxHashMap<String, Arc<Session>>>,
}

impl SessionStore {
    /// Creates a store from an explicit configuration and pool.
    #[must_use]
    pub fn new(config: SessionConfig, pool: CredentialPool) -> Self {
        Self {
            config,
            pool,
            sessions: Mutex::new(FxHashMap::default()),
        }
    }

    /// Creates a store from the environment.
    ///
    /// Reads the conversation endpoint override and the credential file
    /// path from their environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credentials`] or [`Error::Url`] if either source
    /// is unusable.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(SessionConfig::from_env()?, CredentialPool::load()?))
    }

    /// Returns a live session for `key`, creating one if needed.
    ///
    /// An absent or expired entry triggers a fresh handshake; the expired
    /// session is evicted in the same critical section. The store lock is
    /// held for the duration of the handshake so two concurrent callers
    /// for the same key resolve to the same session.
    ///
    /// # Errors
    ///
    /// Propagates handshake and credential errors from session creation.
    pub async fn get_or_create(&self, key: &str) -> Result<Arc<Session>> {
        self.get_or_create_with(key, Session::create(key, &self.config, &self.pool))
            .await
    }

    /// Returns the live session for `key`.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionNotFound`] if no session is registered
    /// - [`Error::SessionExpired`] if the session outlived its TTL; it
    ///   has been evicted by the time this returns
    pub async fn get(&self, key: &str) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.lock().await;

        let session = sessions
            .get(key)
            .cloned()
            .ok_or_else(|| Error::session_not_found(key))?;

        if session.is_expired() {
            sessions.remove(key);
            debug!(key = %key, "Evicted expired session");
            return Err(Error::session_expired(key));
        }

        debug!(key = %key, "Session retrieved");
        Ok(session)
    }

    /// Removes the session registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if no session is registered.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;

        match sessions.remove(key) {
            Some(_) => {
                info!(key = %key, "Session removed");
                Ok(())
            }
            None => Err(Error::session_not_found(key)),
        }
    }

    /// Returns the number of registered sessions, expired ones included.
    #[must_use]
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Returns `true` if no sessions are registered.
    #[must_use]
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Core of [`SessionStore::get_or_create`], parameterized over the
    /// creation future so the locking discipline is testable without a
    /// handshake. The future is only awaited when a session must be
    /// built.
    async fn get_or_create_with<Fut>(&self, key: &str, create: Fut) -> Result<Arc<Session>>
    where
        Fut: Future<Output = Result<Session>>,
    {
        let mut sessions = self.sessions.lock().await;

        if let Some(session) = sessions.get(key) {
            if !session.is_expired() {
                debug!(key = %key, "Reusing live session");
                return Ok(Arc::clone(session));
            }
            sessions.remove(key);
            debug!(key = %key, "Evicted expired session before rebuild");
        }

        let session = Arc::new(create.await?);
        sessions.insert(key.to_string(), Arc::clone(&session));
        info!(key = %key, conversation = %session.conversation_id(), "Session stored");

        Ok(session)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::credentials::CookieRecord;
    use crate::protocol::RESULT_SUCCESS;
    use crate::session::core::SESSION_TTL;

    fn store() -> SessionStore {
        let config = SessionConfig::with_endpoint("https://localhost/handshake").expect("config");
        let pool = CredentialPool::from_sets(vec![(
            PathBuf::from("cookies.json"),
            vec![CookieRecord {
                name: "_U".to_string(),
                value: "token".to_string(),
            }],
        )])
        .expect("pool");
        SessionStore::new(config, pool)
    }

    async fn stub_create(key: &str, ttl: Duration) -> Result<Session> {
        Ok(Session::stub(key, RESULT_SUCCESS, ttl))
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = store();
        let result = store.get("chat").await;
        assert!(matches!(result, Err(Error::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_live_session() {
        let store = store();

        let first = store
            .get_or_create_with("chat", stub_create("chat", SESSION_TTL))
            .await
            .expect("create");
        let second = store
            .get_or_create_with("chat", stub_create("chat", SESSION_TTL))
            .await
            .expect("reuse");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_or_create_replaces_expired_session() {
        let store = store();

        let first = store
            .get_or_create_with("chat", stub_create("chat", Duration::ZERO))
            .await
            .expect("create");
        let second = store
            .get_or_create_with("chat", stub_create("chat", SESSION_TTL))
            .await
            .expect("replace");

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_evicts_expired_session() {
        let store = store();

        store
            .get_or_create_with("chat", stub_create("chat", Duration::ZERO))
            .await
            .expect("create");

        let result = store.get("chat").await;
        assert!(matches!(result, Err(Error::SessionExpired { .. })));

        // Eviction happened under the same lock as the check.
        assert!(store.is_empty().await);
        assert!(matches!(
            store.get("chat").await,
            Err(Error::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove() {
        let store = store();

        store
            .get_or_create_with("chat", stub_create("chat", SESSION_TTL))
            .await
            .expect("create");

        store.remove("chat").await.expect("remove");
        assert!(matches!(
            store.remove("chat").await,
            Err(Error::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_creation_stores_nothing() {
        let store = store();

        let result = store
            .get_or_create_with("chat", async { Err(Error::handshake("boom")) })
            .await;

        assert!(result.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_builds_once() {
        let store = Arc::new(store());
        let creations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let creations = Arc::clone(&creations);
            handles.push(tokio::spawn(async move {
                store
                    .get_or_create_with("k", async {
                        creations.fetch_add(1, Ordering::SeqCst);
                        // Simulate handshake latency inside the lock.
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok(Session::stub("k", RESULT_SUCCESS, SESSION_TTL))
                    })
                    .await
                    .expect("get_or_create")
            }));
        }

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.expect("join"));
        }

        assert_eq!(creations.load(Ordering::SeqCst), 1);
        for session in &sessions[1..] {
            assert!(Arc::ptr_eq(&sessions[0], session));
        }
    }

    #[tokio::test]
    async fn test_distinct_keys_get_distinct_sessions() {
        let store = store();

        let a = store
            .get_or_create_with("a", stub_create("a", SESSION_TTL))
            .await
            .expect("a");
        let b = store
            .get_or_create_with("b", stub_create("b", SESSION_TTL))
            .await
            .expect("b");

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.len().await, 2);
    }
}
