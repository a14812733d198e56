//! Lock registry and RAII guards

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::error::LockError;

tokio::task_local! {
    /// Locks whose critical section encloses the running future
    static HELD: Vec<HeldLock>;
}

#[derive(Clone)]
struct HeldLock {
    registry: usize,
    key: String,
    token: u64,
}

/// Registry of named locks
///
/// One lock exists per distinct key. It is created on first use and lives as
/// long as the locker. Waiters on a key are granted strictly in arrival order.
/// Cloning is cheap and every clone shares the same registry.
#[derive(Clone, Default)]
pub struct ResourceLocker {
    inner: Arc<Registry>,
}

#[derive(Default)]
struct Registry {
    locks: Mutex<HashMap<String, LockState>>,
    next_token: AtomicU64,
}

/// Invariant: `holder.is_none()` implies `waiters.is_empty()`
#[derive(Default)]
struct LockState {
    holder: Option<Holder>,
    waiters: VecDeque<Waiter>,
}

struct Holder {
    token: u64,
    acquired_at: Instant,
}

struct Waiter {
    token: u64,
    grant: oneshot::Sender<()>,
}

impl ResourceLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting at most `timeout`
    ///
    /// The timeout is measured from the moment this method is called. A
    /// caller that times out, or whose future is dropped while queued, is
    /// removed from the queue and never receives the lock.
    ///
    /// Independent callers always queue, even when they are futures joined
    /// inside one task. Acquiring a key from inside that key's own
    /// [`LockGuard::scope`] fails at once with [`LockError::Reentrant`]
    /// instead of waiting on itself.
    pub async fn acquire(&self, key: &str, timeout: Duration) -> Result<LockGuard, LockError> {
        let registry_id = self.registry_id();
        let enclosing = HELD
            .try_with(|held| {
                held.iter()
                    .find(|lock| lock.registry == registry_id && lock.key == key)
                    .map(|lock| lock.token)
            })
            .ok()
            .flatten();
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);

        let mut grant = {
            let mut locks = self.inner.lock_registry();
            let state = locks.entry(key.to_string()).or_default();

            if let (Some(enclosing), Some(holder)) = (enclosing, &state.holder) {
                if holder.token == enclosing {
                    tracing::error!(key = %key, "re-entrant lock acquisition");
                    return Err(LockError::Reentrant {
                        key: key.to_string(),
                    });
                }
            }

            if state.holder.is_none() {
                state.holder = Some(Holder {
                    token,
                    acquired_at: Instant::now(),
                });
                tracing::debug!(key = %key, "lock granted");
                return Ok(self.guard(key, token));
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(Waiter { token, grant: tx });
            tracing::debug!(key = %key, position = state.waiters.len(), "waiting for lock");
            rx
        };

        let pending = PendingAcquire {
            registry: &*self.inner,
            key,
            token,
            armed: true,
        };

        match tokio::time::timeout(timeout, &mut grant).await {
            Ok(Ok(())) => {
                pending.disarm();
                tracing::debug!(key = %key, "lock granted after wait");
                Ok(self.guard(key, token))
            }
            // The sender is only dropped when the waiter is removed, which
            // `PendingAcquire` handles on the way out.
            Ok(Err(_)) | Err(_) => {
                drop(pending);
                tracing::warn!(
                    key = %key,
                    timeout_ms = timeout.as_millis() as u64,
                    "timed out waiting for lock"
                );
                Err(LockError::Timeout {
                    key: key.to_string(),
                    waited: timeout,
                })
            }
        }
    }

    /// Release a lock through a detached handle
    ///
    /// Returns [`LockError::NotHolder`] if the handle does not currently hold
    /// its lock, for example when it has already been released.
    pub fn release(&self, handle: &LockHandle) -> Result<(), LockError> {
        self.inner.release(&handle.key, handle.token)
    }

    /// Whether the lock for `key` is currently held
    pub fn is_locked(&self, key: &str) -> bool {
        self.inner
            .lock_registry()
            .get(key)
            .is_some_and(|state| state.holder.is_some())
    }

    /// Number of callers queued behind the current holder of `key`
    pub fn queue_len(&self, key: &str) -> usize {
        self.inner
            .lock_registry()
            .get(key)
            .map_or(0, |state| state.waiters.len())
    }

    /// How long the current holder of `key` has held it
    pub fn held_for(&self, key: &str) -> Option<Duration> {
        self.inner
            .lock_registry()
            .get(key)
            .and_then(|state| state.holder.as_ref())
            .map(|holder| holder.acquired_at.elapsed())
    }

    /// All keys that have ever been locked, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock_registry().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn registry_id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn guard(&self, key: &str, token: u64) -> LockGuard {
        LockGuard {
            locker: self.clone(),
            handle: LockHandle {
                key: key.to_string(),
                token,
            },
            armed: true,
        }
    }
}

impl fmt::Debug for ResourceLocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLocker")
            .field("keys", &self.keys())
            .finish()
    }
}

impl Registry {
    fn lock_registry(&self) -> MutexGuard<'_, HashMap<String, LockState>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, key: &str, token: u64) -> Result<(), LockError> {
        let mut locks = self.lock_registry();
        let state = locks.get_mut(key);

        match state {
            Some(state) if state.holder.as_ref().is_some_and(|h| h.token == token) => {
                state.holder = None;
                Self::grant_next(state);
                tracing::debug!(key = %key, "lock released");
                Ok(())
            }
            _ => {
                tracing::error!(key = %key, "lock released by a non-holder");
                Err(LockError::NotHolder {
                    key: key.to_string(),
                })
            }
        }
    }

    /// Hand the lock to the oldest waiter that is still listening
    fn grant_next(state: &mut LockState) {
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.grant.send(()).is_ok() {
                state.holder = Some(Holder {
                    token: waiter.token,
                    acquired_at: Instant::now(),
                });
                return;
            }
        }
    }
}

/// Removes a queued waiter unless the acquisition completed
///
/// If the waiter was granted the lock in the same instant it gave up, the
/// lock is passed straight on to the next waiter.
struct PendingAcquire<'a> {
    registry: &'a Registry,
    key: &'a str,
    token: u64,
    armed: bool,
}

impl PendingAcquire<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut locks = self.registry.lock_registry();
        let Some(state) = locks.get_mut(self.key) else {
            return;
        };

        if state.holder.as_ref().is_some_and(|h| h.token == self.token) {
            state.holder = None;
            Registry::grant_next(state);
            tracing::debug!(key = %self.key, "abandoned lock grant passed on");
        } else {
            state.waiters.retain(|waiter| waiter.token != self.token);
        }
    }
}

/// Proof of ownership of a lock, detached from any guard
///
/// Obtained from [`LockGuard::into_handle`] and released with
/// [`ResourceLocker::release`]. A handle is valid for exactly one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    key: String,
    token: u64,
}

impl LockHandle {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Scoped ownership of a lock; the lock is released when the guard drops
pub struct LockGuard {
    locker: ResourceLocker,
    handle: LockHandle,
    armed: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.handle.key
    }

    /// The handle identifying this acquisition
    pub fn handle(&self) -> &LockHandle {
        &self.handle
    }

    /// Detach the handle; the caller becomes responsible for releasing it
    pub fn into_handle(mut self) -> LockHandle {
        self.armed = false;
        self.handle.clone()
    }

    /// Run `fut` as this guard's critical section
    ///
    /// Inside `fut`, acquiring the same key from the same locker is rejected
    /// with [`LockError::Reentrant`]. Tasks spawned from `fut` are not part
    /// of the section.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        let mut held = HELD.try_with(Vec::clone).unwrap_or_default();
        held.push(HeldLock {
            registry: self.locker.registry_id(),
            key: self.handle.key.clone(),
            token: self.handle.token,
        });
        HELD.scope(held, fut).await
    }

    /// Release the lock now
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.handle.key)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.armed {
            // NotHolder is already logged by the registry
            let _ = self.locker.inner.release(&self.handle.key, self.handle.token);
        }
    }
}
