//! Listener table shared by mirror implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::{Query, RawRecord, Snapshot};

type SnapshotSender = watch::Sender<Option<Arc<Snapshot>>>;
type SnapshotReceiver = watch::Receiver<Option<Arc<Snapshot>>>;

struct Listener {
    query: Query,
    sender: SnapshotSender,
}

/// Fan-out of full snapshots to registered queries.
///
/// Each listener holds only the latest snapshot; a slow consumer skips
/// intermediate states instead of queueing them.
#[derive(Default)]
pub struct SnapshotHub {
    next_listener: AtomicU64,
    revision: AtomicU64,
    listeners: Mutex<HashMap<u64, Listener>>,
}

impl std::fmt::Debug for SnapshotHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotHub")
            .field("listeners", &self.listener_count())
            .field("revision", &self.revision.load(Ordering::Relaxed))
            .finish()
    }
}

impl SnapshotHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a query. The caller is expected to publish its first snapshot.
    pub fn register(self: &Arc<Self>, query: Query) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = watch::channel(None);
        self.lock().insert(
            id,
            Listener {
                query: query.clone(),
                sender,
            },
        );
        tracing::debug!(listener = id, collection = %query.collection, "Registered listener");

        Subscription {
            id,
            query,
            hub: Arc::clone(self),
            receiver,
            cancelled: false,
        }
    }

    /// Push a snapshot to one listener.
    ///
    /// Returns the assigned revision, or `None` when the listener is gone or
    /// its current snapshot already has identical records.
    pub fn publish(&self, listener: u64, records: Vec<RawRecord>) -> Option<u64> {
        let listeners = self.lock();
        let entry = listeners.get(&listener)?;

        let mut assigned = None;
        entry.sender.send_if_modified(|current| {
            if current
                .as_ref()
                .is_some_and(|snapshot| snapshot.records == records)
            {
                return false;
            }
            let revision = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
            *current = Some(Arc::new(Snapshot { revision, records }));
            assigned = Some(revision);
            true
        });
        assigned
    }

    /// Listeners whose result may change after a write to `scope/collection`.
    pub fn watchers(&self, scope: &str, collection: &str) -> Vec<(u64, Query)> {
        self.lock()
            .iter()
            .filter(|(_, listener)| listener.query.watches(scope, collection))
            .map(|(id, listener)| (*id, listener.query.clone()))
            .collect()
    }

    /// Every live listener.
    pub fn all(&self) -> Vec<(u64, Query)> {
        self.lock()
            .iter()
            .map(|(id, listener)| (*id, listener.query.clone()))
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn remove(&self, listener: u64) -> bool {
        let removed = self.lock().remove(&listener).is_some();
        if removed {
            tracing::debug!(listener, "Released listener");
        }
        removed
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle on a live query. Dropping it releases the listener.
pub struct Subscription {
    id: u64,
    query: Query,
    hub: Arc<SnapshotHub>,
    receiver: SnapshotReceiver,
    cancelled: bool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub const fn id(&self) -> u64 {
        self.id
    }

    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// Wait for the next snapshot this subscription has not yet seen.
    ///
    /// Returns `None` once the subscription is cancelled.
    pub async fn next(&mut self) -> Option<Arc<Snapshot>> {
        loop {
            if self.cancelled {
                return None;
            }
            self.receiver.changed().await.ok()?;
            if let Some(snapshot) = self.receiver.borrow_and_update().clone() {
                return Some(snapshot);
            }
        }
    }

    /// Most recent snapshot, without waiting.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        if self.cancelled {
            return None;
        }
        self.receiver.borrow().clone()
    }

    /// Stop delivery. Idempotent.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            self.hub.remove(self.id);
        }
    }

    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
