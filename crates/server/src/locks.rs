//! Per-session assembly locks.
//!
//! Only assembly of one session is serialized; unrelated sessions never
//! contend. Entries are dropped from the map once nobody holds or waits for
//! them, so the map stays proportional to in-flight assemblies.

use dashmap::DashMap;
use parcel_core::SessionId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<SessionId, Arc<Mutex<()>>>;

/// Registry of per-session async mutexes.
#[derive(Clone, Default)]
pub struct SessionLocks {
    inner: Arc<LockMap>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `id`, waiting behind any current holder.
    pub async fn lock(&self, id: SessionId) -> SessionGuard {
        let mutex = self
            .inner
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        SessionGuard {
            guard: Some(guard),
            id,
            map: self.inner.clone(),
        }
    }

    /// Number of sessions with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Held assembly lock for one session.
pub struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    id: SessionId,
    map: Arc<LockMap>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Release first so the strong count below only sees the map's Arc
        // and any waiters.
        self.guard.take();
        self.map
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = SessionLocks::new();
        let id = SessionId::new();

        let guard = locks.lock(id).await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_session_is_serialized() {
        let locks = SessionLocks::new();
        let id = SessionId::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(id).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_sessions_do_not_contend() {
        let locks = SessionLocks::new();
        let _a = locks.lock(SessionId::new()).await;
        let b = tokio::time::timeout(Duration::from_secs(1), locks.lock(SessionId::new())).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
