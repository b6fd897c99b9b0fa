//! Forest root write lock coordination primitives.
//!
//! A Provider's forest root can only be mutated by one extrinsic at a time: the proof sent
//! along with a mutation is generated against the current root, so a second mutation built
//! before the first one lands on chain would carry a stale proof.
//!
//! Each forest gets a [`ForestRootWriteGate`], a single-permit semaphore plus a broadcast
//! channel notifying every release. [`ForestRootWriteLocks`] hands out one gate per forest
//! (Provider or bucket), so writes to different forests never wait on each other.
//!
//! ## Acquisition pattern
//!
//! ```text
//! let Some(guard) = gate.try_acquire() else { return; };  // lock first
//! let batch = queue.drain(..);                             // then mutate state
//! submit(batch, guard);                                    // the guard moves with the work
//! ```
//!
//! If `try_acquire()` fails nothing was taken from the queue, so nothing is lost. The
//! service waits for the release notification and tries again.

use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};

const LOG_TARGET: &str = "forest-root-write-lock";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForestRootWriteError {
    #[error("forest root write gate of {0} was closed")]
    GateClosed(String),
}

/// RAII guard for the forest root write lock.
///
/// When dropped, the semaphore permit is released and a notification is sent to all
/// subscribers of the gate.
pub struct ForestRootWriteGuard {
    _permit: OwnedSemaphorePermit,
    forest: String,
    release_tx: broadcast::Sender<()>,
}

impl ForestRootWriteGuard {
    /// Name of the forest this guard locks.
    pub fn forest(&self) -> &str {
        &self.forest
    }
}

impl Drop for ForestRootWriteGuard {
    fn drop(&mut self) {
        log::debug!(target: LOG_TARGET, "🔓 Releasing forest root write lock of {}", self.forest);
        // Nobody listening is fine.
        let _ = self.release_tx.send(());
    }
}

impl Debug for ForestRootWriteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForestRootWriteGuard")
            .field("forest", &self.forest)
            .finish()
    }
}

/// Mutual exclusion over the writes to a single forest root.
pub struct ForestRootWriteGate {
    forest: String,
    semaphore: Arc<Semaphore>,
    release_tx: broadcast::Sender<()>,
}

impl ForestRootWriteGate {
    pub fn new(forest: impl Into<String>) -> Self {
        // Release notifications are transient signals, a small buffer is enough.
        let (release_tx, _) = broadcast::channel(16);
        Self {
            forest: forest.into(),
            semaphore: Arc::new(Semaphore::new(1)),
            release_tx,
        }
    }

    fn guard(&self, permit: OwnedSemaphorePermit) -> ForestRootWriteGuard {
        log::debug!(target: LOG_TARGET, "🔒 Acquired forest root write lock of {}", self.forest);
        ForestRootWriteGuard {
            _permit: permit,
            forest: self.forest.clone(),
            release_tx: self.release_tx.clone(),
        }
    }

    /// Tries to acquire the lock without waiting.
    ///
    /// Returns `None` if it is already held (or the gate was closed).
    pub fn try_acquire(&self) -> Option<ForestRootWriteGuard> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| self.guard(permit))
    }

    /// Waits until the lock is free and acquires it. Waiters are served in FIFO order.
    pub async fn acquire(&self) -> Result<ForestRootWriteGuard, ForestRootWriteError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ForestRootWriteError::GateClosed(self.forest.clone()))?;

        Ok(self.guard(permit))
    }

    pub fn is_locked(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    /// Subscribers receive `()` whenever a guard of this gate is dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.release_tx.subscribe()
    }

    /// Stops handing out guards. Pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

impl Debug for ForestRootWriteGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForestRootWriteGate")
            .field("forest", &self.forest)
            .field("available_permits", &self.semaphore.available_permits())
            .finish()
    }
}

/// One [`ForestRootWriteGate`] per forest, created on first use.
pub struct ForestRootWriteLocks<K> {
    gates: Mutex<BTreeMap<K, Arc<ForestRootWriteGate>>>,
}

impl<K: Ord + Clone + Debug> ForestRootWriteLocks<K> {
    pub fn new() -> Self {
        Self {
            gates: Mutex::new(BTreeMap::new()),
        }
    }

    /// The gate of the forest identified by `key`.
    pub fn gate(&self, key: &K) -> Arc<ForestRootWriteGate> {
        self.gates
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ForestRootWriteGate::new(format!("{:?}", key))))
            .clone()
    }

    pub fn try_acquire(&self, key: &K) -> Option<ForestRootWriteGuard> {
        self.gate(key).try_acquire()
    }

    pub async fn acquire(&self, key: &K) -> Result<ForestRootWriteGuard, ForestRootWriteError> {
        // The gate is cloned out so the map is not locked while waiting.
        let gate = self.gate(key);
        gate.acquire().await
    }
}

impl<K: Ord + Clone + Debug> Default for ForestRootWriteLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
