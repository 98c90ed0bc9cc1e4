//! Bounded registry of remote sessions with sliding expiration.
//!
//! # Lifecycle
//! ```text
//! absent ──create──▶ active ──get──▶ active (last_accessed = now)
//!                      │
//!                      ├─ remove ──────────────┐
//!                      ├─ TTL lapse + sweep ───┼──▶ closed and dropped
//!                      └─ close_all (shutdown) ┘
//! ```
//!
//! Entries live in a sharded map; the live count is a separate atomic that
//! is reserved before insertion, so the `max_sessions` cap holds under
//! concurrent creates without a registry-wide lock. Close hooks always run
//! after the entry has left the map.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::clock::deadline_after;
use crate::config::SessionConfig;
use crate::observability::metrics;

/// Teardown hook for session payloads.
#[async_trait]
pub trait Closeable: Send + Sync {
    async fn close(&self);
}

struct SessionEntry<T> {
    payload: Arc<T>,
    last_accessed: Instant,
}

impl<T> SessionEntry<T> {
    fn new(payload: T) -> Self {
        Self {
            payload: Arc::new(payload),
            last_accessed: Instant::now(),
        }
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_accessed) > ttl
    }
}

struct Sweeper {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct SessionManager<T: Closeable + 'static> {
    sessions: DashMap<String, SessionEntry<T>>,
    live: AtomicUsize,
    config: SessionConfig,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<T: Closeable + 'static> SessionManager<T> {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            live: AtomicUsize::new(0),
            config,
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Register a session.
    ///
    /// Returns false without touching the registry when it is full of live
    /// sessions; expired ones are swept first to free their slots. An
    /// existing id is overwritten: the displaced payload is closed and the
    /// count is unchanged.
    pub async fn create(&self, id: impl Into<String>, payload: T) -> bool {
        let id = id.into();
        if self.count() >= self.config.max_sessions && !self.sessions.contains_key(&id) {
            self.cleanup_expired().await;
        }

        let displaced = match self.sessions.entry(id) {
            Entry::Occupied(mut occupied) => {
                let old = std::mem::replace(occupied.get_mut(), SessionEntry::new(payload));
                tracing::debug!(session_id = %occupied.key(), "Session replaced");
                Some(old.payload)
            }
            Entry::Vacant(vacant) => {
                if !self.reserve_slot() {
                    tracing::warn!(
                        max_sessions = self.config.max_sessions,
                        "Session limit reached, rejecting new session"
                    );
                    return false;
                }
                tracing::debug!(session_id = %vacant.key(), "Session created");
                vacant.insert(SessionEntry::new(payload));
                None
            }
        };

        metrics::record_active_sessions(self.count());
        if let Some(old) = displaced {
            old.close().await;
        }
        true
    }

    fn reserve_slot(&self) -> bool {
        let max = self.config.max_sessions;
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    fn release_slot(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        metrics::record_active_sessions(self.count());
    }

    /// Live payload for `id`; refreshes its expiry.
    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        let now = Instant::now();
        let mut entry = self.sessions.get_mut(id)?;
        if entry.is_expired(now, self.config.ttl()) {
            return None;
        }
        entry.last_accessed = now;
        Some(entry.payload.clone())
    }

    /// Whether a live session exists. Does not refresh expiry.
    pub fn exists(&self, id: &str) -> bool {
        let now = Instant::now();
        self.sessions
            .get(id)
            .is_some_and(|entry| !entry.is_expired(now, self.config.ttl()))
    }

    /// Remove a session, closing it before handing it back.
    pub async fn remove(&self, id: &str) -> Option<Arc<T>> {
        let (_, entry) = self.sessions.remove(id)?;
        self.release_slot();
        tracing::debug!(session_id = %id, "Session removed");

        entry.payload.close().await;
        Some(entry.payload)
    }

    /// Registered sessions, including expired ones not yet swept.
    pub fn count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Remove and close every expired session.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.ttl();

        let candidates: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_expired(now, ttl))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in candidates {
            // Re-checked under the shard lock: a concurrent get may have refreshed it.
            let Some((_, entry)) = self.sessions.remove_if(&id, |_, e| e.is_expired(now, ttl)) else {
                continue;
            };
            self.release_slot();
            entry.payload.close().await;
            removed += 1;
        }

        if removed > 0 {
            tracing::info!(removed, remaining = self.count(), "Expired sessions cleaned up");
            metrics::record_sessions_expired(removed);
        }
        removed
    }

    /// Remove and close every session regardless of age.
    pub async fn close_all(&self) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut closed = 0;
        for id in ids {
            if self.remove(&id).await.is_some() {
                closed += 1;
            }
        }
        closed
    }

    /// Start the background sweep. A second call while running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() {
            return;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(sweep_loop(
            Arc::downgrade(self),
            self.config.cleanup_interval(),
            stop_rx,
        ));
        *sweeper = Some(Sweeper { stop_tx, handle });

        tracing::info!(
            max_sessions = self.config.max_sessions,
            ttl_secs = self.config.session_ttl_seconds,
            interval_secs = self.config.cleanup_interval_seconds,
            "Session manager started"
        );
    }

    /// Stop the background sweep and wait for it to finish. Sessions stay registered.
    pub async fn stop(&self) {
        let Some(Sweeper { stop_tx, handle }) = self.sweeper.lock().await.take() else {
            return;
        };
        let _ = stop_tx.send(());
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Session sweep task failed");
        }
        tracing::info!(remaining = self.count(), "Session manager stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.sweeper.lock().await.is_some()
    }
}

async fn sweep_loop<T: Closeable + 'static>(
    manager: Weak<SessionManager<T>>,
    interval: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = time::interval_at(deadline_after(Instant::now(), interval), interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.cleanup_expired().await;
            }
            _ = &mut stop_rx => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockSession {
        data: &'static str,
        closed: Arc<AtomicUsize>,
    }

    impl MockSession {
        fn new(data: &'static str) -> Self {
            Self {
                data,
                ..Default::default()
            }
        }

        fn tracked(data: &'static str, closed: &Arc<AtomicUsize>) -> Self {
            Self {
                data,
                closed: closed.clone(),
            }
        }
    }

    #[async_trait]
    impl Closeable for MockSession {
        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager(max_sessions: usize, session_ttl_seconds: u64) -> SessionManager<MockSession> {
        SessionManager::new(SessionConfig {
            max_sessions,
            session_ttl_seconds,
            cleanup_interval_seconds: 1,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_and_get() {
        let manager = manager(10, 3600);
        assert!(manager.create("session1", MockSession::new("test")).await);
        assert_eq!(manager.count(), 1);

        let session = manager.get("session1").unwrap();
        assert_eq!(session.data, "test");
        assert!(manager.get("nonexistent").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_enforces_limit() {
        let manager = manager(2, 3600);
        assert!(manager.create("s1", MockSession::new("a")).await);
        assert!(manager.create("s2", MockSession::new("b")).await);

        assert!(!manager.create("s3", MockSession::new("c")).await);
        assert_eq!(manager.count(), 2);
        assert!(!manager.exists("s3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_reclaims_expired_slots() {
        let manager = manager(1, 1);
        let closed = Arc::new(AtomicUsize::new(0));
        assert!(manager.create("old", MockSession::tracked("old", &closed)).await);

        time::advance(Duration::from_millis(1500)).await;

        assert!(manager.create("new", MockSession::new("new")).await);
        assert_eq!(manager.count(), 1);
        assert!(!manager.exists("old"));
        assert!(manager.exists("new"));
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        assert!(!manager.create("third", MockSession::new("third")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_id_overwrites() {
        let closed = Arc::new(AtomicUsize::new(0));
        let manager = manager(1, 3600);
        assert!(manager.create("s1", MockSession::tracked("first", &closed)).await);

        // Full, but replacing an existing id needs no new slot.
        assert!(manager.create("s1", MockSession::new("second")).await);
        assert_eq!(manager.count(), 1);
        assert_eq!(manager.get("s1").unwrap().data, "second");
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_closes_session() {
        let closed = Arc::new(AtomicUsize::new(0));
        let manager = manager(10, 3600);
        manager.create("session1", MockSession::tracked("v", &closed)).await;

        let removed = manager.remove("session1").await.unwrap();
        assert_eq!(removed.data, "v");
        assert_eq!(manager.count(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(manager.remove("session1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_frees_slot() {
        let manager = manager(1, 3600);
        manager.create("s1", MockSession::new("a")).await;
        manager.remove("s1").await;
        assert!(manager.create("s2", MockSession::new("b")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exists() {
        let manager = manager(10, 3600);
        manager.create("session1", MockSession::new("a")).await;
        assert!(manager.exists("session1"));
        assert!(!manager.exists("nonexistent"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_not_returned() {
        let manager = manager(10, 1);
        manager.create("s1", MockSession::new("a")).await;
        time::sleep(Duration::from_millis(1500)).await;

        assert!(manager.get("s1").is_none());
        assert!(!manager.exists("s1"));
        // Still registered until swept.
        assert_eq!(manager.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired_sessions() {
        let closed = Arc::new(AtomicUsize::new(0));
        let manager = manager(10, 1);
        manager.create("session1", MockSession::tracked("a", &closed)).await;
        assert_eq!(manager.count(), 1);

        time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(manager.cleanup_expired().await, 1);
        assert_eq!(manager.count(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        assert_eq!(manager.cleanup_expired().await, 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_expiration() {
        let manager = manager(10, 2);
        manager.create("session1", MockSession::new("a")).await;

        time::sleep(Duration::from_secs(1)).await;
        assert!(manager.get("session1").is_some());

        time::sleep(Duration::from_millis(1200)).await;
        assert!(manager.exists("session1"));
        assert_eq!(manager.cleanup_expired().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop() {
        let manager = Arc::new(manager(10, 1));
        assert!(!manager.is_running().await);

        manager.start().await;
        manager.start().await;
        assert!(manager.is_running().await);

        manager.stop().await;
        assert!(!manager.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep() {
        let closed = Arc::new(AtomicUsize::new(0));
        let manager = Arc::new(manager(10, 1));
        manager.create("s1", MockSession::tracked("a", &closed)).await;
        manager.start().await;

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(manager.count(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_leaves_sessions() {
        let closed = Arc::new(AtomicUsize::new(0));
        let manager = Arc::new(manager(10, 1));
        manager.start().await;
        manager.create("s1", MockSession::tracked("a", &closed)).await;
        manager.stop().await;

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(manager.count(), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_all() {
        let closed = Arc::new(AtomicUsize::new(0));
        let manager = manager(10, 3600);
        manager.create("a", MockSession::tracked("a", &closed)).await;
        manager.create("b", MockSession::tracked("b", &closed)).await;

        assert_eq!(manager.close_all().await, 2);
        assert_eq!(manager.count(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_respect_limit() {
        let manager = Arc::new(manager(10, 3600));
        let mut tasks = Vec::new();
        for i in 0..50 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager.create(format!("s{i}"), MockSession::new("x")).await
            }));
        }

        let mut created = 0;
        for task in tasks {
            if task.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 10);
        assert_eq!(manager.count(), 10);
    }
}
