//! Bounded-concurrency gate for conversions and file access.
//!
//! The gate owns two fixed pools ([`ResourceKind::Conversion`] and
//! [`ResourceKind::FileAccess`]) plus any number of named sub-locks. A
//! sub-lock is created lazily the first time its key is seen, keeps the
//! concurrency limit it was created with, and is never removed.
//!
//! ```text
//!  acquire(kind, key, max, timeout)
//!     │
//!     ├─ 1. sub-lock "<kind>:<key>"   (only when a key is given, max slots)
//!     └─ 2. pool "<kind>"             (pool-wide limit)
//!           │
//!           └─▶ ResourceLock   (releases both on drop / release())
//! ```
//!
//! Both waits share one deadline, so `timeout` bounds the total wait.
//! The sub-lock is taken first: a task queued behind a busy key never sits on
//! a pool slot another key could use.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

/// Pre-defined pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Conversion,
    FileAccess,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Conversion => "conversion",
            ResourceKind::FileAccess => "file-access",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// `max_concurrency` (or a pool size) of zero can never admit anyone.
    #[error("concurrency limit must be at least 1, got {max}")]
    InvalidConcurrency { max: usize },

    #[error("timed out after {waited_ms}ms waiting for '{resource}'")]
    Timeout { resource: String, waited_ms: u64 },

    #[error("semaphore for '{resource}' was closed")]
    Closed { resource: String },
}

/// Snapshot of one pool or sub-lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub name: String,
    pub capacity: usize,
    pub available: usize,
    pub waiters: usize,
}

/// Diagnostics returned by [`ResourceGate::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStats {
    pub pools: Vec<PoolStats>,
    pub sub_locks: Vec<PoolStats>,
    /// Locks handed out since the gate was created.
    pub issued: u64,
    /// Locks released since the gate was created.
    pub released: u64,
}

struct Pool {
    name: String,
    sem: Arc<Semaphore>,
    capacity: usize,
    waiters: AtomicUsize,
}

impl Pool {
    fn new(name: String, capacity: usize) -> Self {
        Self {
            name,
            sem: Arc::new(Semaphore::new(capacity)),
            capacity,
            waiters: AtomicUsize::new(0),
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            name: self.name.clone(),
            capacity: self.capacity,
            available: self.sem.available_permits(),
            waiters: self.waiters.load(Ordering::SeqCst),
        }
    }

    async fn wait(
        &self,
        started: Instant,
        deadline: Option<Instant>,
    ) -> Result<OwnedSemaphorePermit, GateError> {
        let _waiting = WaiterGuard::enter(&self.waiters);
        let fut = Arc::clone(&self.sem).acquire_owned();
        let res = match deadline {
            Some(at) => tokio::time::timeout_at(at, fut).await.map_err(|_| GateError::Timeout {
                resource: self.name.clone(),
                waited_ms: started.elapsed().as_millis() as u64,
            })?,
            None => fut.await,
        };
        res.map_err(|_| GateError::Closed {
            resource: self.name.clone(),
        })
    }
}

struct WaiterGuard<'a>(&'a AtomicUsize);

impl<'a> WaiterGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Counters {
    issued: AtomicU64,
    released: AtomicU64,
}

/// Shared gate. Cheap to clone; clones share every pool and counter.
#[derive(Clone)]
pub struct ResourceGate {
    conversion: Arc<Pool>,
    file_access: Arc<Pool>,
    named: Arc<Mutex<HashMap<String, Arc<Pool>>>>,
    counters: Arc<Counters>,
}

impl fmt::Debug for ResourceGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGate")
            .field("conversion", &self.conversion.capacity)
            .field("file_access", &self.file_access.capacity)
            .finish()
    }
}

impl ResourceGate {
    pub fn new(conversion: usize, file_access: usize) -> Result<Self, GateError> {
        for max in [conversion, file_access] {
            if max == 0 {
                return Err(GateError::InvalidConcurrency { max });
            }
        }
        Ok(Self {
            conversion: Arc::new(Pool::new(ResourceKind::Conversion.to_string(), conversion)),
            file_access: Arc::new(Pool::new(ResourceKind::FileAccess.to_string(), file_access)),
            named: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
        })
    }

    fn pool(&self, kind: ResourceKind) -> &Arc<Pool> {
        match kind {
            ResourceKind::Conversion => &self.conversion,
            ResourceKind::FileAccess => &self.file_access,
        }
    }

    fn sub_lock(&self, kind: ResourceKind, key: &str, max: usize) -> Arc<Pool> {
        let name = format!("{kind}:{key}");
        let mut named = self.named.lock().unwrap_or_else(PoisonError::into_inner);
        let pool = named
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Pool::new(name, max)));
        if pool.capacity != max {
            debug!(
                sub_lock = %pool.name,
                existing = pool.capacity,
                requested = max,
                "sub-lock already configured; keeping existing limit"
            );
        }
        Arc::clone(pool)
    }

    /// Wait for a slot in `kind`'s pool (and in the `key` sub-lock if given).
    ///
    /// `max_concurrency` configures the sub-lock on first use and defaults to 1.
    /// Fails with [`GateError::Timeout`] once `timeout` has elapsed, and with
    /// [`GateError::InvalidConcurrency`] immediately when it is zero.
    pub async fn acquire(
        &self,
        kind: ResourceKind,
        key: Option<&str>,
        max_concurrency: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<ResourceLock, GateError> {
        let max = max_concurrency.unwrap_or(1);
        if max == 0 {
            return Err(GateError::InvalidConcurrency { max });
        }

        let started = Instant::now();
        // A timeout too large to represent is no timeout at all.
        let deadline = timeout.and_then(|t| started.checked_add(t));

        let (resource, sub_permit) = match key {
            Some(key) => {
                let sub = self.sub_lock(kind, key, max);
                let permit = sub.wait(started, deadline).await?;
                (sub.name.clone(), Some(permit))
            }
            None => (kind.to_string(), None),
        };
        let pool_permit = self.pool(kind).wait(started, deadline).await?;

        let wait_time = started.elapsed();
        self.counters.issued.fetch_add(1, Ordering::SeqCst);
        debug!(resource = %resource, wait_ms = wait_time.as_millis() as u64, "gate slot acquired");

        Ok(ResourceLock {
            resource,
            wait_time,
            permits: Some(Permits {
                _pool: pool_permit,
                _sub: sub_permit,
            }),
            counters: Arc::clone(&self.counters),
        })
    }

    /// Return `lock`'s slot. Idempotent; `true` only on the first call.
    pub fn release(&self, lock: &mut ResourceLock) -> bool {
        lock.release()
    }

    pub fn stats(&self) -> GateStats {
        let mut sub_locks: Vec<PoolStats> = self
            .named
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|p| p.stats())
            .collect();
        sub_locks.sort_by(|a, b| a.name.cmp(&b.name));
        GateStats {
            pools: vec![self.conversion.stats(), self.file_access.stats()],
            sub_locks,
            issued: self.counters.issued.load(Ordering::SeqCst),
            released: self.counters.released.load(Ordering::SeqCst),
        }
    }
}

struct Permits {
    _pool: OwnedSemaphorePermit,
    _sub: Option<OwnedSemaphorePermit>,
}

/// Scoped handle for an acquired slot.
///
/// Dropping the lock releases it, so early returns, `?` and panics all give
/// the slot back.
pub struct ResourceLock {
    resource: String,
    wait_time: Duration,
    permits: Option<Permits>,
    counters: Arc<Counters>,
}

impl ResourceLock {
    /// Name of the guarded resource (`"conversion"` or `"conversion:<key>"`).
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// How long acquisition waited.
    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    pub fn is_held(&self) -> bool {
        self.permits.is_some()
    }

    /// Release the slot. Returns `false` if it was already released.
    pub fn release(&mut self) -> bool {
        match self.permits.take() {
            Some(permits) => {
                drop(permits);
                self.counters.released.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ResourceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLock")
            .field("resource", &self.resource)
            .field("wait_time", &self.wait_time)
            .field("held", &self.is_held())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready};

    fn sub_stats(gate: &ResourceGate, name: &str) -> PoolStats {
        gate.stats()
            .sub_locks
            .into_iter()
            .find(|s| s.name == name)
            .unwrap()
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        assert_eq!(
            ResourceGate::new(0, 4).unwrap_err(),
            GateError::InvalidConcurrency { max: 0 }
        );
    }

    #[tokio::test]
    async fn zero_max_concurrency_is_rejected() {
        let gate = ResourceGate::new(2, 2).unwrap();
        let err = gate
            .acquire(ResourceKind::Conversion, Some("k"), Some(0), None)
            .await
            .unwrap_err();
        assert_eq!(err, GateError::InvalidConcurrency { max: 0 });
        assert_eq!(gate.stats().issued, 0);
    }

    #[tokio::test]
    async fn sub_lock_bounds_to_two() {
        let gate = ResourceGate::new(8, 8).unwrap();
        let a = gate
            .acquire(ResourceKind::Conversion, Some("out.pdf"), Some(2), None)
            .await
            .unwrap();
        let _b = gate
            .acquire(ResourceKind::Conversion, Some("out.pdf"), Some(2), None)
            .await
            .unwrap();

        let mut third = tokio_test::task::spawn(gate.acquire(
            ResourceKind::Conversion,
            Some("out.pdf"),
            Some(2),
            None,
        ));
        assert_pending!(third.poll());
        assert_eq!(sub_stats(&gate, "conversion:out.pdf").waiters, 1);
        assert_eq!(sub_stats(&gate, "conversion:out.pdf").available, 0);

        drop(a);
        assert!(third.is_woken());
        let c = assert_ready!(third.poll()).unwrap();
        assert_eq!(c.resource(), "conversion:out.pdf");
        assert_eq!(sub_stats(&gate, "conversion:out.pdf").waiters, 0);
    }

    #[tokio::test]
    async fn pool_limit_applies_across_keys() {
        let gate = ResourceGate::new(1, 1).unwrap();
        let first = gate
            .acquire(ResourceKind::Conversion, Some("a"), None, None)
            .await
            .unwrap();
        let mut other = tokio_test::task::spawn(gate.acquire(
            ResourceKind::Conversion,
            Some("b"),
            None,
            None,
        ));
        assert_pending!(other.poll());

        // file-access pool is independent
        let fa = gate
            .acquire(ResourceKind::FileAccess, None, None, None)
            .await
            .unwrap();
        assert_eq!(fa.resource(), "file-access");

        drop(first);
        assert_ready!(other.poll()).unwrap();
    }

    #[tokio::test]
    async fn timeout_is_distinguishable() {
        let gate = ResourceGate::new(1, 1).unwrap();
        let _held = gate
            .acquire(ResourceKind::Conversion, None, None, None)
            .await
            .unwrap();
        let err = gate
            .acquire(
                ResourceKind::Conversion,
                None,
                None,
                Some(Duration::from_millis(30)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Timeout { ref resource, .. } if resource == "conversion"));
        assert_eq!(gate.stats().pools[0].waiters, 0);
    }

    #[tokio::test]
    async fn unrepresentable_timeout_waits_without_deadline() {
        let gate = ResourceGate::new(1, 1).unwrap();
        let lock = gate
            .acquire(ResourceKind::Conversion, Some("k"), None, Some(Duration::MAX))
            .await
            .unwrap();
        assert_eq!(lock.resource(), "conversion:k");
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let gate = ResourceGate::new(1, 1).unwrap();
        let mut lock = gate
            .acquire(ResourceKind::Conversion, None, None, None)
            .await
            .unwrap();
        assert!(gate.release(&mut lock));
        assert!(!gate.release(&mut lock));
        assert!(!lock.is_held());
        drop(lock);

        let stats = gate.stats();
        assert_eq!(stats.issued, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.pools[0].available, 1);
    }

    #[tokio::test]
    async fn failing_operation_still_releases_once() {
        async fn guarded(gate: &ResourceGate) -> Result<(), String> {
            let _lock = gate
                .acquire(ResourceKind::Conversion, Some("job"), Some(2), None)
                .await
                .map_err(|e| e.to_string())?;
            Err("engine exploded".into())
        }

        let gate = ResourceGate::new(2, 2).unwrap();
        for _ in 0..3 {
            assert!(guarded(&gate).await.is_err());
        }
        let stats = gate.stats();
        assert_eq!(stats.issued, 3);
        assert_eq!(stats.released, 3);
        assert_eq!(stats.pools[0].available, 2);
        assert_eq!(sub_stats(&gate, "conversion:job").available, 2);
    }

    #[tokio::test]
    async fn sub_lock_keeps_first_configuration() {
        let gate = ResourceGate::new(4, 4).unwrap();
        drop(
            gate.acquire(ResourceKind::FileAccess, Some("x"), Some(3), None)
                .await
                .unwrap(),
        );
        drop(
            gate.acquire(ResourceKind::FileAccess, Some("x"), Some(1), None)
                .await
                .unwrap(),
        );
        assert_eq!(sub_stats(&gate, "file-access:x").capacity, 3);
    }
}
