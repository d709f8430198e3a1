//! Per-host cache of authenticated sessions.
//!
//! The cache holds at most one session per host. A cached session is probed
//! with a no-op command before reuse; a failed probe closes and evicts it so
//! the caller transparently receives a freshly dialled session. The cache does
//! not retry dial failures itself; that is the retry orchestrator's job.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::{Connector, RemoteError, RemoteSession};

/// Command used to check that a cached session still works.
pub const PROBE_COMMAND: &str = "true";

type Slot<S> = Arc<AsyncMutex<Option<Arc<S>>>>;

/// Owned cache of live sessions keyed by host address.
///
/// Each host has its own slot lock, held across lookup, probe, dial, and
/// insert. Two callers for the same host therefore never both dial, while
/// callers for different hosts proceed independently.
pub struct SessionCache<C: Connector> {
    connector: C,
    slots: Mutex<HashMap<String, Slot<C::Session>>>,
}

impl<C: Connector> SessionCache<C> {
    /// Creates an empty cache that dials through `connector`.
    #[must_use]
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a live session for `host`, reusing the cached one when its
    /// liveness probe succeeds.
    ///
    /// # Errors
    ///
    /// Returns the connector's [`RemoteError`] when dialling or
    /// authentication fails.
    pub async fn acquire(&self, host: &str) -> Result<Arc<C::Session>, RemoteError> {
        let slot = self.slot(host);
        let mut guard = slot.lock().await;

        let cached = guard.as_ref().map(Arc::clone);
        if let Some(session) = cached {
            match session.exec(PROBE_COMMAND).await {
                Ok(output) if output.is_success() => {
                    debug!(host, "reusing cached session");
                    return Ok(session);
                }
                Ok(output) => warn!(
                    host,
                    exit_status = ?output.exit_status,
                    "liveness probe failed; evicting session"
                ),
                Err(err) => warn!(host, error = %err, "liveness probe failed; evicting session"),
            }
            guard.take();
            session.close();
        }

        let session = Arc::new(self.connector.connect(host).await?);
        *guard = Some(Arc::clone(&session));
        info!(host, "opened remote session");
        Ok(session)
    }

    /// Closes and removes the cached session for `host`, if any.
    pub async fn evict(&self, host: &str) {
        let slot = self.slot(host);
        let mut guard = slot.lock().await;
        if let Some(session) = guard.take() {
            debug!(host, "evicting cached session");
            session.close();
        }
    }

    /// Closes every cached session. Intended for process shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Slot<C::Session>)> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (host, slot) in drained {
            if let Some(session) = slot.lock().await.take() {
                debug!(host, "closing session");
                session.close();
            }
        }
    }

    /// Number of hosts that currently hold a cached session.
    pub async fn session_count(&self) -> usize {
        let slots: Vec<Slot<C::Session>> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    fn slot(&self, host: &str) -> Slot<C::Session> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(host.to_owned()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::ScriptedConnector;

    #[tokio::test]
    async fn acquire_reuses_live_session() {
        let connector = ScriptedConnector::new();
        let cache = SessionCache::new(connector.clone());

        let first = cache.acquire("node-1").await.expect("first acquire");
        let second = cache.acquire("node-1").await.expect("second acquire");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn failed_probe_replaces_session_exactly_once() {
        let connector = ScriptedConnector::new();
        let cache = SessionCache::new(connector.clone());

        let stale = cache.acquire("node-1").await.expect("initial acquire");
        connector.fail_next_probe();

        let fresh = cache.acquire("node-1").await.expect("reacquire");
        let again = cache.acquire("node-1").await.expect("reuse fresh");

        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert!(Arc::ptr_eq(&fresh, &again));
        assert!(stale.is_closed(), "dead session should be closed");
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(cache.session_count().await, 1);
    }

    #[tokio::test]
    async fn dial_failure_is_returned_without_caching() {
        let connector = ScriptedConnector::new();
        connector.fail_next_connect(RemoteError::transport("node-1", "connection refused"));
        let cache = SessionCache::new(connector.clone());

        let err = cache.acquire("node-1").await.expect_err("dial should fail");
        assert_eq!(err.message, "connection refused");
        assert_eq!(cache.session_count().await, 0);

        cache.acquire("node-1").await.expect("second dial succeeds");
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquire_dials_once_per_host() {
        let connector = ScriptedConnector::new().with_connect_delay(Duration::from_millis(20));
        let cache = Arc::new(SessionCache::new(connector.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&cache);
                tokio::spawn(async move { shared.acquire("node-1").await })
            })
            .collect();

        let mut sessions = Vec::new();
        for handle in handles {
            let session = handle
                .await
                .expect("task should not panic")
                .expect("acquire should succeed");
            sessions.push(session);
        }

        assert_eq!(connector.connect_count(), 1);
        assert_eq!(cache.session_count().await, 1);
        assert!(sessions.windows(2).all(|pair| match pair {
            [lhs, rhs] => Arc::ptr_eq(lhs, rhs),
            _ => true,
        }));
    }

    #[tokio::test]
    async fn close_all_closes_and_forgets_sessions() {
        let connector = ScriptedConnector::new();
        let cache = SessionCache::new(connector.clone());
        let alpha = cache.acquire("alpha").await.expect("alpha");
        let beta = cache.acquire("beta").await.expect("beta");

        cache.close_all().await;

        assert!(alpha.is_closed());
        assert!(beta.is_closed());
        assert_eq!(cache.session_count().await, 0);
    }

    #[tokio::test]
    async fn evict_forces_redial() {
        let connector = ScriptedConnector::new();
        let cache = SessionCache::new(connector.clone());
        cache.acquire("node-1").await.expect("acquire");

        cache.evict("node-1").await;
        cache.acquire("node-1").await.expect("redial");

        assert_eq!(connector.connect_count(), 2);
    }
}
